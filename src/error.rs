//! Error taxonomy for the recommendation pipeline.
//!
//! Every stage of the pipeline (rate gate, model call, extraction, catalog
//! reconciliation) reports failures through [`AssistError`]. The
//! [`assistant`](crate::assistant) module decides per variant whether to
//! retry, degrade to a fallback, or surface a client error; only
//! [`AssistError::InvalidRequest`] ever reaches an HTTP caller.
//!
//! Plumbing outside the pipeline (config loading, migrations, CLI) keeps
//! using `anyhow::Result`.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AssistError {
    /// The token bucket denied admission. Not retried.
    #[error("rate limit exceeded, try again later")]
    RateLimited,

    #[error("model request timed out")]
    UpstreamTimeout,

    /// HTTP 429 or 5xx from the model service.
    #[error("model service error {status}: {body}")]
    UpstreamServerError { status: u16, body: String },

    /// HTTP 4xx other than 429. Terminal.
    #[error("model service rejected request {status}: {body}")]
    UpstreamClientError { status: u16, body: String },

    /// Connection-level failure before any HTTP status was received.
    #[error("model service unreachable: {0}")]
    Transport(String),

    #[error("malformed model response: {0}")]
    MalformedUpstreamResponse(String),

    #[error("tagged block only partially parsed: {0}")]
    ExtractionDegraded(String),

    #[error("no catalog product matched the proposed names")]
    NoCatalogMatch,

    #[error("catalog store error: {0}")]
    CatalogStore(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("model provider is disabled")]
    Disabled,
}

impl AssistError {
    /// Whether another attempt at the same model call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistError::UpstreamTimeout
                | AssistError::UpstreamServerError { .. }
                | AssistError::Transport(_)
        )
    }

    /// Classify a non-success HTTP status from the model service.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 || status >= 500 {
            AssistError::UpstreamServerError { status, body }
        } else {
            AssistError::UpstreamClientError { status, body }
        }
    }
}

impl From<sqlx::Error> for AssistError {
    fn from(err: sqlx::Error) -> Self {
        AssistError::CatalogStore(err.to_string())
    }
}

impl From<reqwest::Error> for AssistError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AssistError::UpstreamTimeout
        } else if let Some(status) = err.status() {
            AssistError::from_status(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            AssistError::MalformedUpstreamResponse(err.to_string())
        } else {
            AssistError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(AssistError::from_status(429, String::new()).is_retryable());
        assert!(AssistError::from_status(500, String::new()).is_retryable());
        assert!(AssistError::from_status(503, String::new()).is_retryable());
        assert!(!AssistError::from_status(400, String::new()).is_retryable());
        assert!(!AssistError::from_status(404, String::new()).is_retryable());
    }

    #[test]
    fn test_terminal_variants() {
        assert!(!AssistError::RateLimited.is_retryable());
        assert!(!AssistError::MalformedUpstreamResponse("x".into()).is_retryable());
        assert!(!AssistError::Disabled.is_retryable());
        assert!(AssistError::UpstreamTimeout.is_retryable());
    }
}
