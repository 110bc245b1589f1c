/// Router Module Index
///
/// Organizes the service's routes. Access control is NOT applied here: the
/// gatekeeper middleware wraps the whole router, so every route below is classified
/// (Static, Public, Protected) by path, not by which module registers it.

/// Unauthenticated infrastructure routes (liveness).
pub mod public;

/// `/api/...` routes: the session summary and the backend reverse proxy.
pub mod api;
