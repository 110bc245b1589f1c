use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use ip_market_gateway::{
    AppConfig, AppState, Gatekeeper, create_router,
    config::Env,
    gatekeeper::{Decision, RouteClass, SessionState, WalletStatusSource},
    identity::{IdentityState, MockIdentityProvider},
    models::ErrorEnvelope,
};
use std::sync::Arc;
use tower::util::ServiceExt;

// --- Helpers ---

const PROVISIONED_TOKEN: &str = "sess_provisioned";
const NEW_USER_TOKEN: &str = "sess_new_user";
const FLAKY_TOKEN: &str = "sess_flaky";

fn default_provider() -> MockIdentityProvider {
    MockIdentityProvider::new()
        .with_session(PROVISIONED_TOKEN, "user_provisioned", Some(true))
        .with_session(NEW_USER_TOKEN, "user_new", Some(false))
        .with_user("user_new", Some(false))
}

fn create_app(env: Env, provider: MockIdentityProvider) -> axum::Router {
    let mut config = AppConfig::default();
    config.env = env;
    config.wallet_source = WalletStatusSource::Hybrid;

    let state = AppState::new(
        config,
        Arc::new(provider) as IdentityState,
        reqwest::Client::new(),
    )
    .expect("default configuration is valid");
    create_router(state)
}

async fn send(app: axum::Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// --- Scenarios ---

#[tokio::test]
async fn test_unauthenticated_onboarding_is_allowed() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get("/onboarding")).await;

    // Allowed through the gatekeeper; no page is served here, so the fallback answers.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_unauthenticated_protected_page_redirects_to_sign_in() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get("/portfolio")).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/sign-in?redirect_url=%2Fportfolio");
}

#[tokio::test]
async fn test_sign_in_return_url_keeps_query_string() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get("/portfolio?tab=royalties&page=2")).await;

    assert_eq!(
        location(&response),
        "/sign-in?redirect_url=%2Fportfolio%3Ftab%3Droyalties%26page%3D2"
    );
}

#[tokio::test]
async fn test_unprovisioned_user_on_home_redirects_to_onboarding() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get_with_token("/", NEW_USER_TOKEN)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/onboarding");
}

#[tokio::test]
async fn test_unprovisioned_user_may_open_transfer_continuation() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get_with_token("/transfer/confirm", NEW_USER_TOKEN)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_provisioned_user_on_onboarding_redirects_home() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get_with_token("/onboarding", PROVISIONED_TOKEN)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_static_asset_loads_with_unreachable_provider() {
    let provider = default_provider().unreachable();
    let app = create_app(Env::Production, provider);

    let response = send(app, get_with_token("/styles/app.css", PROVISIONED_TOKEN)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_unreachable_provider_never_exposes_protected_route() {
    let provider = default_provider().unreachable();
    let app = create_app(Env::Production, provider);

    let response = send(app, get_with_token("/portfolio", PROVISIONED_TOKEN)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert!(location(&response).starts_with("/sign-in"));
}

#[tokio::test]
async fn test_health_is_public() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get("/health")).await;
    assert!(response.headers().contains_key("x-request-id"));
}

// --- API paths get JSON instead of redirects ---

#[tokio::test]
async fn test_api_without_session_is_401_envelope() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get("/api/session")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let envelope: ErrorEnvelope = json_body(response).await;
    assert!(!envelope.success);
    assert_eq!(envelope.message, "Unauthorized");
}

#[tokio::test]
async fn test_api_before_onboarding_is_403_envelope() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get_with_token("/api/session", NEW_USER_TOKEN)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let envelope: ErrorEnvelope = json_body(response).await;
    assert!(!envelope.success);
}

#[tokio::test]
async fn test_session_endpoint_returns_resolved_session() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get_with_token("/api/session", PROVISIONED_TOKEN)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let session: SessionState = json_body(response).await;
    assert_eq!(session, SessionState::authenticated("user_provisioned", true));
}

#[tokio::test]
async fn test_lookup_failure_fails_open_end_to_end() {
    let provider = default_provider()
        .with_session(FLAKY_TOKEN, "user_flaky", None)
        .failing_lookup();
    let app = create_app(Env::Production, provider);

    let response = send(app, get_with_token("/api/session", FLAKY_TOKEN)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let session: SessionState = json_body(response).await;
    assert!(session.metadata_fetch_failed);
    assert_eq!(session.wallet_provisioned, None);
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let app = create_app(Env::Production, default_provider());
    let request = Request::builder()
        .uri("/api/session")
        .header(header::COOKIE, format!("theme=dark; __session={PROVISIONED_TOKEN}"))
        .body(Body::empty())
        .unwrap();

    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// --- Local development bypass ---

#[tokio::test]
async fn test_local_bypass_header_authenticates() {
    let provider = default_provider().with_user("user_dev", Some(true));
    let app = create_app(Env::Local, provider);

    let request = Request::builder()
        .uri("/api/session")
        .header("x-user-id", "user_dev")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let session: SessionState = json_body(response).await;
    assert_eq!(session.user_id.as_deref(), Some("user_dev"));
    assert_eq!(session.wallet_provisioned, Some(true));
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let provider = default_provider().with_user("user_dev", Some(true));
    let app = create_app(Env::Production, provider);

    let request = Request::builder()
        .uri("/api/session")
        .header("x-user-id", "user_dev")
        .body(Body::empty())
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// --- Verdicts ---

#[tokio::test]
async fn test_static_verdict_skips_session_resolution() {
    let provider = Arc::new(default_provider().unreachable()) as IdentityState;
    let gatekeeper = Gatekeeper::from_config(&AppConfig::default(), provider).unwrap();

    let request = get_with_token("/_next/static/chunks/main.js", PROVISIONED_TOKEN);
    let verdict = gatekeeper.evaluate(request.headers(), request.uri()).await;

    assert_eq!(verdict.route, RouteClass::Static);
    assert_eq!(verdict.session, None);
    assert_eq!(verdict.decision, Decision::Allow);
}

#[tokio::test]
async fn test_verdict_carries_resolved_session() {
    let provider = Arc::new(default_provider()) as IdentityState;
    let gatekeeper = Gatekeeper::from_config(&AppConfig::default(), provider).unwrap();

    let request = get_with_token("/portfolio?tab=nfts", NEW_USER_TOKEN);
    let verdict = gatekeeper.evaluate(request.headers(), request.uri()).await;

    assert_eq!(verdict.route, RouteClass::Protected);
    assert_eq!(verdict.session, Some(SessionState::authenticated("user_new", false)));
    assert_eq!(verdict.decision, Decision::RedirectToOnboarding);
}

#[test]
fn test_sign_in_url_with_query_gets_ampersand() {
    let mut config = AppConfig::default();
    config.routes.sign_in_url = "https://accounts.example.com/sign-in?theme=dark".to_string();
    let provider = Arc::new(default_provider()) as IdentityState;
    let gatekeeper = Gatekeeper::from_config(&config, provider).unwrap();

    let decision = Decision::RedirectToSignIn {
        return_url: "/portfolio".to_string(),
    };
    let response = gatekeeper.reject(&decision, "/portfolio").unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "https://accounts.example.com/sign-in?theme=dark&redirect_url=%2Fportfolio"
    );
    assert!(gatekeeper.reject(&Decision::AllowDespiteError, "/portfolio").is_none());
}

#[test]
fn test_duplicate_public_routes_are_rejected() {
    let mut config = AppConfig::default();
    config.routes.public.push("/onboarding/".parse().unwrap());
    let provider = Arc::new(default_provider()) as IdentityState;

    assert!(Gatekeeper::from_config(&config, provider).is_err());
}

// --- Static assets vs protected routes ---

#[tokio::test]
async fn test_static_looking_api_path_without_session_is_401() {
    let app = create_app(Env::Production, default_provider());
    for uri in ["/api/session.js", "/api/proxy/x.csv", "/api/ip-assets/7.PNG"] {
        let response = send(app.clone(), get(uri)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_static_looking_api_path_before_onboarding_is_403() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get_with_token("/api/proxy/x.csv", NEW_USER_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_asset_under_protected_page_is_served_without_session() {
    // Page-level assets short-circuit as Static; the page itself stays gated.
    let app = create_app(Env::Production, default_provider());

    let asset = send(app.clone(), get("/portfolio/chart.png")).await;
    assert_eq!(asset.status(), StatusCode::NOT_FOUND);
    assert!(asset.headers().get(header::LOCATION).is_none());

    let page = send(app, get("/portfolio/chart")).await;
    assert_eq!(page.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&page), "/sign-in?redirect_url=%2Fportfolio%2Fchart");
}

#[tokio::test]
async fn test_json_under_protected_page_is_gated() {
    let app = create_app(Env::Production, default_provider());
    let response = send(app, get("/portfolio/data.json")).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
}

#[test]
fn test_overlapping_public_routes_are_rejected() {
    let mut config = AppConfig::default();
    config.routes.public.push("/asset/featured/*".parse().unwrap());
    let provider = Arc::new(default_provider()) as IdentityState;

    assert!(Gatekeeper::from_config(&config, provider).is_err());
}
