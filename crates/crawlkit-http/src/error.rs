use thiserror::Error;

/// Every failure a dispatch client or cookie jar can return.
///
/// No variant is retried inside this layer. [`HttpError::is_retriable`] only
/// classifies, so callers can decide on their own retry policy.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Bad constructor input: missing dependency, unparsable method or URL.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading a local body stream failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The RPC or gateway call did not complete (connect, TLS, reset, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The RPC endpoint itself answered with a non-2xx HTTP status.
    #[error("transport returned HTTP {status} from {url}")]
    TransportStatus { status: u16, url: String },

    /// The remote side completed but reported a non-success status.
    #[error("remote status {code}: {status}")]
    RemoteStatus { code: i32, status: String },

    /// The request deadline passed before the remote call returned.
    #[error("deadline exceeded after {after_ms}ms")]
    DeadlineExceeded { after_ms: u64 },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The remote reply was well-formed JSON but semantically unusable.
    #[error("invalid reply: {0}")]
    InvalidReply(String),

    /// The cookie store did not reach the requested state.
    #[error("cookie jar: {0}")]
    Jar(String),
}

impl HttpError {
    /// Returns `true` for failures that may succeed on a later attempt.
    ///
    /// Transient: connect failures and timeouts, HTTP 429/5xx from the
    /// transport or the remote side, and deadline expiry. Everything else
    /// (bad input, malformed replies, local I/O) is permanent.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            HttpError::Transport(e) => e.is_timeout() || e.is_connect(),
            HttpError::TransportStatus { status, .. } => *status == 429 || *status >= 500,
            HttpError::RemoteStatus { code, .. } => *code == 429 || *code >= 500,
            HttpError::DeadlineExceeded { .. } => true,
            HttpError::InvalidArgument(_)
            | HttpError::Io { .. }
            | HttpError::Deserialize { .. }
            | HttpError::InvalidReply(_)
            | HttpError::Jar(_) => false,
        }
    }

    /// The numeric status carried by the error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<i32> {
        match self {
            HttpError::RemoteStatus { code, .. } => Some(*code),
            HttpError::TransportStatus { status, .. } => Some(i32::from(*status)),
            HttpError::Transport(e) => e.status().map(|s| i32::from(s.as_u16())),
            _ => None,
        }
    }
}
