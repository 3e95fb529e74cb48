use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{SummarizerConfig, TokenFailurePolicy};
use crate::error::SkippedRecord;
use crate::record::{Chunk, EntityRecord};
use crate::tokenizer::TokenCounter;

/// Chunks of one community plus the records that could not be tokenized.
#[derive(Debug, Default)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SkippedRecord>,
}

/// Splits community records into request-sized chunks.
#[derive(Clone)]
pub struct RecordChunker {
    counter: Arc<dyn TokenCounter>,
    model: String,
    token_limit: usize,
    policy: TokenFailurePolicy,
}

impl RecordChunker {
    pub fn new(counter: Arc<dyn TokenCounter>, config: &SummarizerConfig) -> Self {
        Self {
            counter,
            model: config.model.clone(),
            token_limit: config.token_limit,
            policy: config.token_failure_policy,
        }
    }

    pub fn with_token_limit(mut self, token_limit: usize) -> Self {
        self.token_limit = token_limit;
        self
    }

    pub fn chunk(&self, records: &[EntityRecord]) -> Vec<Chunk> {
        self.chunk_with_diagnostics(records).chunks
    }

    /// Greedy scan: a record joins the open chunk while the running total
    /// stays within the limit. A record that alone exceeds the limit gets a
    /// chunk of its own.
    pub fn chunk_with_diagnostics(&self, records: &[EntityRecord]) -> ChunkPlan {
        let mut plan = ChunkPlan::default();
        let mut current = Chunk::new();

        for (index, record) in records.iter().enumerate() {
            let tokens = match self.counter.count(&record.to_text(), &self.model) {
                Ok(tokens) => tokens,
                Err(source) => match self.policy {
                    TokenFailurePolicy::Skip => {
                        warn!(index, entity = %record.entity, error = %source, "Skipping record that could not be tokenized");
                        plan.skipped.push(SkippedRecord {
                            index,
                            entity: record.entity.clone(),
                            source,
                        });
                        continue;
                    }
                    TokenFailurePolicy::CountAsZero => {
                        warn!(index, entity = %record.entity, error = %source, "Counting untokenizable record as empty");
                        0
                    }
                },
            };

            if current.token_count + tokens > self.token_limit && !current.is_empty() {
                debug!(records = current.len(), tokens = current.token_count, "Closing chunk");
                plan.chunks.push(std::mem::replace(&mut current, Chunk::new()));
            }

            if current.is_empty() && tokens > self.token_limit {
                warn!(
                    index,
                    entity = %record.entity,
                    tokens,
                    limit = self.token_limit,
                    "Record exceeds token limit, placing it in its own chunk"
                );
                let mut oversized = Chunk::new();
                oversized.push(record.clone(), tokens);
                plan.chunks.push(oversized);
                continue;
            }

            current.push(record.clone(), tokens);
        }

        if !current.is_empty() {
            plan.chunks.push(current);
        }

        debug!(
            records = records.len(),
            chunks = plan.chunks.len(),
            skipped = plan.skipped.len(),
            "Community divided"
        );

        plan
    }
}
