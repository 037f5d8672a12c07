use std::fmt;
use std::time::Duration;

/// What made a transient failure transient. Drives backoff choice and log
/// labels, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    Timeout,
    Connect,
    RateLimited,
    Server,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientKind::Timeout => "timeout",
            TransientKind::Connect => "connect",
            TransientKind::RateLimited => "rate_limited",
            TransientKind::Server => "server",
        }
    }
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure taxonomy for the execution layer. Transient errors are
/// retried inside the router; everything else surfaces immediately.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transient backend failure ({kind}): {message}")]
    Transient {
        kind: TransientKind,
        /// Provider-supplied retry hint, honored over computed backoff.
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("backend rejected credentials: {0}")]
    Auth(String),

    #[error("backend quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("backend rejected query: {0}")]
    Rejected(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution deadline of {0:?} exceeded")]
    Deadline(Duration),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BackendError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Map an HTTP status + body excerpt to the taxonomy. A 403 whose body
    /// mentions quota is permanent exhaustion, not an auth problem.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        match status {
            429 => BackendError::Transient {
                kind: TransientKind::RateLimited,
                retry_after,
                message: truncate(body),
            },
            401 => BackendError::Auth(truncate(body)),
            403 => {
                let lower = body.to_lowercase();
                if lower.contains("quota") || lower.contains("resource_exhausted") {
                    BackendError::QuotaExhausted(truncate(body))
                } else {
                    BackendError::Auth(truncate(body))
                }
            }
            400 | 422 => BackendError::Rejected(truncate(body)),
            500..=599 => BackendError::Transient {
                kind: TransientKind::Server,
                retry_after,
                message: format!("status {status}: {}", truncate(body)),
            },
            _ => BackendError::Rejected(format!("status {status}: {}", truncate(body))),
        }
    }

    /// Classify reqwest transport failures: timeouts and refused
    /// connections are retryable, anything else is a rejected request.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Transient {
                kind: TransientKind::Timeout,
                retry_after: None,
                message: err.to_string(),
            }
        } else if err.is_connect() {
            BackendError::Transient {
                kind: TransientKind::Connect,
                retry_after: None,
                message: err.to_string(),
            }
        } else {
            BackendError::Rejected(err.to_string())
        }
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
