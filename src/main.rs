use ip_market_gateway::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    identity::{IdentityState, RemoteIdentityProvider},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, wires the identity provider and the
/// backend proxy into the shared state, and serves the gated router.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing Production secrets or bad route patterns).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging. RUST_LOG wins; otherwise gatekeeper decisions are visible at debug.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ip_market_gateway=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!(
        env = ?config.env,
        wallet_source = %config.wallet_source,
        "Gateway starting"
    );

    // 3. Identity provider. The resolver bounds each lookup with its own timeout;
    //    the client timeout is a backstop for connections left hanging.
    let identity_client = reqwest::Client::builder()
        .timeout(config.lookup_timeout)
        .build()
        .expect("FATAL: Failed to build the identity provider HTTP client.");
    let identity = Arc::new(RemoteIdentityProvider::new(
        identity_client,
        &config.jwt_secret,
        &config.identity_api_url,
        &config.identity_api_key,
    )) as IdentityState;

    // 4. Backend proxy client.
    let backend_client = reqwest::Client::builder()
        .timeout(config.proxy_timeout)
        .build()
        .expect("FATAL: Failed to build the backend HTTP client.");

    // 5. Shared state and router.
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::new(config, identity, backend_client)
        .expect("FATAL: Invalid gatekeeper route configuration.");
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
