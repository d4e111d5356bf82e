use http::StatusCode;
use thiserror::Error;

/// Request-fatal failures surfaced to the HTTP layer.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The request shape itself is unusable (e.g. no messages at all).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Every message was filtered out during translation; the backend is
    /// never invoked with zero turns.
    #[error("no usable conversation turns after filtering")]
    EmptyConversation,

    /// A non-user role attempted to carry image content under the strict
    /// role policy.
    #[error("role `{0}` cannot carry image content")]
    InvalidRoleContent(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_)
            | ProxyError::EmptyConversation
            | ProxyError::InvalidRoleContent(_) => StatusCode::BAD_REQUEST,
            ProxyError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// A failed backend invocation, carrying the upstream failure text verbatim.
/// Never retried here.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Per-item content-resolution failures.
///
/// These are recoverable: the offending part is dropped with a logged
/// warning and sibling parts in the same message are unaffected. A request
/// only fails if no usable turn remains afterwards.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("unresolvable content source: {0}")]
    Unresolved(String),

    #[error("malformed data URI: {0}")]
    InvalidDataUri(String),

    #[error("image fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
}
