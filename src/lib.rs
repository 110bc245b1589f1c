use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// The request gatekeeper (route classifier, session resolver, decision engine).
pub mod gatekeeper;
// External collaborators and the edge services built on them.
pub mod identity;
pub mod proxy;
pub mod handlers;
pub mod models;
pub mod config;

pub mod routes;
use routes::{api, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use gatekeeper::{Gatekeeper, GatekeeperState, PatternError};
pub use identity::{IdentityState, MockIdentityProvider, RemoteIdentityProvider};
pub use proxy::BackendProxy;

/// ApiDoc
///
/// Auto-generated OpenAPI document for the routes this service answers itself or
/// relays. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_session, handlers::list_ip_assets, handlers::get_ip_asset,
        handlers::get_portfolio, handlers::list_news, handlers::proxy_passthrough,
    ),
    components(schemas(models::ErrorEnvelope, gatekeeper::SessionState)),
    tags(
        (name = "ip-market-gateway", description = "IP marketplace edge gateway")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container shared by every request. Nothing in here is
/// mutated after startup; per-request trust state lives in request extensions.
#[derive(Clone)]
pub struct AppState {
    /// Classifier, resolver and decision engine, wired to the injected identity provider.
    pub gatekeeper: GatekeeperState,
    /// Relay to the backend REST API.
    pub proxy: BackendProxy,
    /// The loaded environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// new
    ///
    /// Wires the gatekeeper around `identity` and the proxy around `http`. Fails if
    /// the route configuration is ambiguous.
    pub fn new(
        config: AppConfig,
        identity: IdentityState,
        http: reqwest::Client,
    ) -> Result<Self, PatternError> {
        let gatekeeper = Arc::new(Gatekeeper::from_config(&config, identity)?);
        let proxy = BackendProxy::new(http, &config.backend_api_url);

        Ok(Self {
            gatekeeper,
            proxy,
            config,
        })
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for GatekeeperState {
    fn from_ref(app_state: &AppState) -> GatekeeperState {
        app_state.gatekeeper.clone()
    }
}

impl FromRef<AppState> for BackendProxy {
    fn from_ref(app_state: &AppState) -> BackendProxy {
        app_state.proxy.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles all routes, wraps them (fallback included) in the gatekeeper, and adds
/// the observability layers outermost.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 1. Routes. The fallback must be registered before the gatekeeper layer so that
    //    unknown paths are gated too.
    let gated = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(api::api_routes())
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.gatekeeper.clone(),
            gatekeeper::gatekeeper_middleware,
        ))
        .with_state(state);

    // 2. Observability and correlation layers.
    gated
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span per request carrying method, URI and the `x-request-id` set above, so every
/// gatekeeper and proxy log line is correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
