use crate::AppState;
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints that must answer without a session. `/health` is listed in the
/// default public route patterns so load balancers never get redirected.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Returns "ok" immediately to verify the service is running and responsive.
        .route("/health", get(|| async { "ok" }))
}
