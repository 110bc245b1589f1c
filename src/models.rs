use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

// --- Response Envelopes ---

/// ErrorEnvelope
///
/// The JSON body of every error this service produces itself, and of every
/// upstream non-2xx response relayed by the reverse proxy:
/// `{ "success": false, "message": ..., "error": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorEnvelope {
    /// Always `false`.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Upstream error body (JSON when the upstream sent JSON, otherwise its text).
    #[ts(type = "unknown")]
    #[schema(value_type = Object)]
    pub error: serde_json::Value,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, error: impl Into<serde_json::Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: error.into(),
        }
    }
}
