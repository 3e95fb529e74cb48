use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub model: String,
    /// Ceiling on the summed token count of one chunk
    pub token_limit: usize,
    /// Chunks of one community summarized concurrently
    pub inner_batch_size: usize,
    /// Communities summarized concurrently
    pub outer_batch_size: usize,
    pub inter_batch_cooldown_ms: u64,
    pub outer_cooldown_ms: u64,
    /// Delays drawn from before each community starts
    pub jitter_ms: Vec<u64>,
    pub request_timeout_secs: u64,
    pub max_concurrent_llm_calls: usize,
    pub min_request_interval_ms: u64,
    pub token_failure_policy: TokenFailurePolicy,
    /// Backoff for transient LLM request failures
    pub retry: RetryPolicy,
}

/// What the chunker does with a record it cannot tokenize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenFailurePolicy {
    #[default]
    Skip,
    CountAsZero,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            token_limit: 30_000,
            inner_batch_size: 2,
            outer_batch_size: 5,
            inter_batch_cooldown_ms: 20_000,
            outer_cooldown_ms: 30_000,
            jitter_ms: vec![200, 400, 500, 800, 900, 1100],
            request_timeout_secs: 120,
            max_concurrent_llm_calls: 4,
            min_request_interval_ms: 0,
            token_failure_policy: TokenFailurePolicy::Skip,
            retry: RetryPolicy::default(),
        }
    }
}

impl SummarizerConfig {
    /// No cooldowns or jitter, for a local service that is not rate limited
    pub fn fast_mode() -> Self {
        Self::default().unthrottled()
    }

    /// Keep model and sizing but drop cooldowns and jitter and allow more
    /// requests in flight
    pub fn unthrottled(self) -> Self {
        Self {
            inter_batch_cooldown_ms: 0,
            outer_cooldown_ms: 0,
            jitter_ms: Vec::new(),
            max_concurrent_llm_calls: self.max_concurrent_llm_calls.max(10),
            ..self
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        let sizes = [
            ("token_limit", self.token_limit),
            ("inner_batch_size", self.inner_batch_size),
            ("outer_batch_size", self.outer_batch_size),
            ("max_concurrent_llm_calls", self.max_concurrent_llm_calls),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Zero("request_timeout_secs"));
        }
        Ok(())
    }

    pub fn inter_batch_cooldown(&self) -> Duration {
        Duration::from_millis(self.inter_batch_cooldown_ms)
    }

    pub fn outer_cooldown(&self) -> Duration {
        Duration::from_millis(self.outer_cooldown_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}
