use axum::{
    Json,
    body::{Body, Bytes},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;

use crate::models::ErrorEnvelope;

/// Session/connection-specific headers that must never reach the backend.
pub const STRIPPED_HEADERS: [header::HeaderName; 7] = [
    header::COOKIE,
    header::AUTHORIZATION,
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::ACCEPT_ENCODING,
];

/// ProxyError
///
/// Every way a proxied call can fail. All variants render as an `ErrorEnvelope`.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Rejected before any upstream call is attempted.
    #[error("missing required path parameter `{0}`")]
    MissingParam(&'static str),
    /// A `.` or `..` segment, which would walk out of the backend base path.
    #[error("invalid path parameter `{0}`")]
    InvalidParam(&'static str),
    /// The backend answered with a non-2xx status; the status is preserved.
    #[error("upstream responded with {status}: {message}")]
    Upstream {
        status: StatusCode,
        message: String,
        error: Value,
    },
    /// Connection failure, timeout, or an unreadable upstream body.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, envelope) = match self {
            ProxyError::MissingParam(name) => (
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::new(
                    format!("Missing required path parameter: {name}"),
                    "bad_request",
                ),
            ),
            ProxyError::InvalidParam(name) => (
                StatusCode::BAD_REQUEST,
                ErrorEnvelope::new(format!("Invalid path parameter: {name}"), "bad_request"),
            ),
            ProxyError::Upstream {
                status,
                message,
                error,
            } => (status, ErrorEnvelope::new(message, error)),
            ProxyError::Transport(e) => {
                tracing::error!(error = %e, "upstream request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorEnvelope::new("Internal server error", e.to_string()),
                )
            }
        };

        let mut response = (status, Json(envelope)).into_response();
        no_store(response.headers_mut());
        response
    }
}

/// require_param
///
/// Blank path segments (e.g. `/api/ip-assets/%20`) count as missing.
pub fn require_param<'a>(name: &'static str, value: &'a str) -> Result<&'a str, ProxyError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ProxyError::MissingParam(name))
    } else {
        Ok(value)
    }
}

/// encode_segment
///
/// Percent-encodes one decoded path segment for the upstream URL, so `/`, `?` and
/// `#` inside it stay data. Dot segments are refused because the URL parser
/// resolves them against the backend base path.
pub fn encode_segment(name: &'static str, segment: &str) -> Result<String, ProxyError> {
    if segment == "." || segment == ".." {
        return Err(ProxyError::InvalidParam(name));
    }
    Ok(urlencoding::encode(segment).into_owned())
}

/// encode_path
///
/// `encode_segment` applied to every segment of a decoded multi-segment path.
pub fn encode_path(name: &'static str, path: &str) -> Result<String, ProxyError> {
    let path = require_param(name, path)?;
    let segments = path
        .trim_matches('/')
        .split('/')
        .map(|segment| encode_segment(name, segment))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(segments.join("/"))
}

/// BackendProxy
///
/// Thin relay to the backend REST API. Holds no per-request state; the reqwest
/// client's timeout bounds every upstream call.
#[derive(Clone)]
pub struct BackendProxy {
    client: reqwest::Client,
    base_url: String,
}

impl BackendProxy {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// upstream_url
    ///
    /// Joins the backend base URL and `path`, appending the raw query string verbatim.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// forward
    ///
    /// Relays one request upstream:
    /// 1. Strips session/connection headers.
    /// 2. Forwards method, query string and body.
    /// 3. Passes 2xx responses through; maps everything else to `ProxyError`.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, ProxyError> {
        let url = self.upstream_url(path, query);
        tracing::debug!(%method, %url, "forwarding request upstream");

        let mut request = self
            .client
            .request(method, &url)
            .headers(forwardable_headers(headers));
        if !body.is_empty() {
            request = request.body(body);
        }

        let upstream = request.send().await?;
        let status = upstream.status();
        let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
        let bytes = upstream.bytes().await?;

        if !status.is_success() {
            tracing::warn!(%url, %status, "upstream returned an error status");
            return Err(upstream_error(status, &bytes));
        }

        let mut response = Response::builder()
            .status(status)
            .body(Body::from(bytes))
            .unwrap_or_default();
        if let Some(content_type) = content_type {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        no_store(response.headers_mut());
        Ok(response)
    }
}

/// forwardable_headers
///
/// Copy of the inbound headers minus `STRIPPED_HEADERS`.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in &STRIPPED_HEADERS {
        forwarded.remove(name);
    }
    forwarded
}

fn upstream_error(status: StatusCode, body: &[u8]) -> ProxyError {
    let error = serde_json::from_slice::<Value>(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Upstream request failed")
                .to_string()
        });

    ProxyError::Upstream {
        status,
        message,
        error,
    }
}

fn no_store(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
}
