//! Error types for the proxy pipeline.

use axum::http::StatusCode;

/// Message returned for non-GET requests.
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Only GET requests are allowed.";

/// Message returned for a missing or unusable `url` parameter.
pub const INVALID_URL_MESSAGE: &str = "Invalid URL.";

/// Message returned for any failure while rendering or processing.
pub const PROXY_FAILURE_MESSAGE: &str = "Failed to load page through proxy";

/// All errors that can terminate a proxied request.
///
/// Per-asset download failures are not represented here: they are
/// recovered inside the mirror and never abort a request.
#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("invalid target URL: {0}")]
    InvalidUrl(String),

    /// Navigation, readiness, engine or network failure for one request.
    #[error("{0}")]
    Render(String),

    /// The shared rendering engine could not be started. Process-level
    /// outage rather than a request-level failure.
    #[error("rendering engine unavailable: {0}")]
    SessionStartup(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::Render(_)
            | ProxyError::SessionStartup(_)
            | ProxyError::Cancelled
            | ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body returned to the caller.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ProxyError::MethodNotAllowed(_) => serde_json::json!({
                "status": "error",
                "message": METHOD_NOT_ALLOWED_MESSAGE,
            }),
            ProxyError::InvalidUrl(_) => serde_json::json!({
                "status": "error",
                "message": INVALID_URL_MESSAGE,
            }),
            _ => serde_json::json!({
                "status": "error",
                "message": PROXY_FAILURE_MESSAGE,
                "details": self.to_string(),
            }),
        }
    }

    /// Whether this error indicates the whole process cannot serve pages.
    pub fn is_outage(&self) -> bool {
        matches!(self, ProxyError::SessionStartup(_))
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
