pub mod chunker;
pub mod config;
pub mod error;
pub mod graph_export;
pub mod limiter;
pub mod llm;
pub mod progress;
pub mod prompt;
pub mod record;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod summarizer;
pub mod tokenizer;
pub mod usage;

#[cfg(test)]
mod testing;

pub use chunker::{ChunkPlan, RecordChunker};
pub use config::{SummarizerConfig, TokenFailurePolicy};
pub use error::{CommunityFailure, ConfigError, LlmRequestError, SkippedRecord, SummarizeError, TokenizationError};
pub use graph_export::{EdgeRecord, EntityGraph, group_by_community};
pub use limiter::RequestLimiter;
pub use llm::{OllamaReportClient, ReportCombiner, ReportGenerator};
pub use progress::{ProgressSnapshot, SummaryProgress};
pub use record::{Chunk, CommunityId, EdgeAttributes, EntityRecord, flatten};
pub use report::{CommunityReport, CommunityResult, Finding};
pub use retry::{RetryPolicy, Transient};
pub use scheduler::{CommunityScheduler, SummaryRun};
pub use summarizer::CommunitySummarizer;
pub use tokenizer::{TiktokenCounter, TokenCounter, WordEstimateCounter};
pub use usage::Usage;
