use crate::{AppState, handlers};
use axum::{Router, routing::{any, get}};

/// API Router Module
///
/// Everything under `/api`. These paths classify as Protected by default, so the
/// gatekeeper answers unauthenticated callers with a 401 envelope and callers who
/// have not finished wallet onboarding with a 403 envelope before any handler runs.
pub fn api_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/session
        // The SessionState the gatekeeper resolved for this request.
        .route("/api/session", get(handlers::get_session))
        // --- Backend Reverse Proxy ---
        // GET /api/ip-assets
        // Lists tokenized IP assets; query string forwarded verbatim.
        .route("/api/ip-assets", get(handlers::list_ip_assets))
        // GET /api/ip-assets/{id}
        .route("/api/ip-assets/{id}", get(handlers::get_ip_asset))
        // GET /api/users/{address}/portfolio
        .route(
            "/api/users/{address}/portfolio",
            get(handlers::get_portfolio),
        )
        // GET /api/news
        .route("/api/news", get(handlers::list_news))
        // ANY /api/proxy/{*path}
        // Generic relay for backend endpoints without a dedicated handler.
        .route("/api/proxy/{*path}", any(handlers::proxy_passthrough))
}
