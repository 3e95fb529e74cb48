use reqwest::StatusCode;
use std::time::Duration;

use crate::record::CommunityId;
use crate::retry::Transient;

/// A record whose token count could not be computed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to count tokens for model {model}: {reason}")]
pub struct TokenizationError {
    pub model: String,
    pub reason: String,
}

/// A record the chunker left out because it could not be tokenized.
#[derive(Debug, Clone, thiserror::Error)]
#[error("record {index} ({entity}) skipped: {source}")]
pub struct SkippedRecord {
    pub index: usize,
    pub entity: String,
    pub source: TokenizationError,
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("community has no records left to summarize")]
    EmptyCommunity,

    #[error("report generation failed for chunk {chunk}: {error:#}")]
    Generation { chunk: usize, error: anyhow::Error },

    #[error("report combination failed: {0:#}")]
    Combination(anyhow::Error),

    #[error("request limiter closed")]
    LimiterClosed(#[from] tokio::sync::AcquireError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// A community whose pipeline failed; it is left out of the report map.
#[derive(Debug, thiserror::Error)]
#[error("community {community_id} failed: {error}")]
pub struct CommunityFailure {
    pub community_id: CommunityId,
    #[source]
    pub error: SummarizeError,
}

/// A failed call to the LLM service.
#[derive(Debug, thiserror::Error)]
pub enum LlmRequestError {
    #[error("could not reach LLM service: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("LLM service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unreadable LLM service response: {0}")]
    InvalidResponse(#[source] reqwest::Error),
}

impl Transient for LlmRequestError {
    fn is_transient(&self) -> bool {
        match self {
            LlmRequestError::Transport(_) => true,
            LlmRequestError::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            LlmRequestError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("model name is empty")]
    MissingModel,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: StatusCode) -> LlmRequestError {
        LlmRequestError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_only_overload_and_server_errors_are_transient() {
        assert!(status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(status(StatusCode::INTERNAL_SERVER_ERROR).is_transient());
        assert!(!status(StatusCode::NOT_FOUND).is_transient());
        assert!(!status(StatusCode::BAD_REQUEST).is_transient());
        assert!(!status(StatusCode::UNAUTHORIZED).is_transient());
    }
}
