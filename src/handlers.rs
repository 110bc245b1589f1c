use crate::{AppState, gatekeeper::SessionState, models::ErrorEnvelope, proxy::{ProxyError, encode_path, encode_segment, require_param}};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};

// --- Handlers ---

/// get_session
///
/// [Protected Route] Returns the caller's session as resolved by the gatekeeper for
/// this very request. The front-end uses it to decide which onboarding step to show.
#[utoipa::path(
    get,
    path = "/api/session",
    responses(
        (status = 200, description = "Resolved session", body = SessionState),
        (status = 401, description = "No session", body = ErrorEnvelope)
    )
)]
pub async fn get_session(Extension(session): Extension<SessionState>) -> Json<SessionState> {
    Json(session)
}

/// list_ip_assets
///
/// [Protected Route] Relays `GET /ip-assets` to the backend. Filters and pagination
/// travel in the query string, which is forwarded verbatim.
#[utoipa::path(
    get,
    path = "/api/ip-assets",
    responses(
        (status = 200, description = "IP asset listing (backend payload)"),
        (status = 500, description = "Upstream unreachable", body = ErrorEnvelope)
    )
)]
pub async fn list_ip_assets(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    state
        .proxy
        .forward(Method::GET, "/ip-assets", query.as_deref(), &headers, Bytes::new())
        .await
}

/// get_ip_asset
///
/// [Protected Route] Relays `GET /ip-assets/{id}`. A blank id is rejected with 400
/// before the backend is contacted.
#[utoipa::path(
    get,
    path = "/api/ip-assets/{id}",
    params(("id" = String, Path, description = "IP asset ID")),
    responses(
        (status = 200, description = "IP asset (backend payload)"),
        (status = 400, description = "Missing id", body = ErrorEnvelope),
        (status = 404, description = "Not Found upstream", body = ErrorEnvelope)
    )
)]
pub async fn get_ip_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let id = encode_segment("id", require_param("id", &id)?)?;
    let path = format!("/ip-assets/{id}");
    state
        .proxy
        .forward(Method::GET, &path, query.as_deref(), &headers, Bytes::new())
        .await
}

/// get_portfolio
///
/// [Protected Route] Relays `GET /users/{address}/portfolio`.
#[utoipa::path(
    get,
    path = "/api/users/{address}/portfolio",
    params(("address" = String, Path, description = "Wallet address")),
    responses(
        (status = 200, description = "Portfolio (backend payload)"),
        (status = 400, description = "Missing address", body = ErrorEnvelope)
    )
)]
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(address): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let address = encode_segment("address", require_param("address", &address)?)?;
    let path = format!("/users/{address}/portfolio");
    state
        .proxy
        .forward(Method::GET, &path, query.as_deref(), &headers, Bytes::new())
        .await
}

/// list_news
///
/// [Protected Route] Relays `GET /news`.
#[utoipa::path(
    get,
    path = "/api/news",
    responses((status = 200, description = "News feed (backend payload)"))
)]
pub async fn list_news(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    state
        .proxy
        .forward(Method::GET, "/news", query.as_deref(), &headers, Bytes::new())
        .await
}

/// proxy_passthrough
///
/// [Protected Route] Generic relay: `{METHOD} /api/proxy/{*path}` becomes
/// `{METHOD} {backend}/{path}`, body included. Each segment is re-encoded; dot
/// segments are rejected with 400.
#[utoipa::path(
    post,
    path = "/api/proxy/{path}",
    params(("path" = String, Path, description = "Backend path")),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Backend payload"),
        (status = 400, description = "Missing path or dot segment", body = ErrorEnvelope)
    )
)]
pub async fn proxy_passthrough(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let path = encode_path("path", &path)?;
    state
        .proxy
        .forward(method, &path, query.as_deref(), &headers, body)
        .await
}

/// not_found
///
/// Fallback for any path the gatekeeper allowed but no route serves.
pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorEnvelope::new("Not Found", "no route matches this path")),
    )
        .into_response()
}
