use futures::future::join_all;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

use crate::chunker::RecordChunker;
use crate::config::SummarizerConfig;
use crate::error::{CommunityFailure, ConfigError, SkippedRecord};
use crate::llm::{ReportCombiner, ReportGenerator};
use crate::progress::SummaryProgress;
use crate::record::{Chunk, CommunityId, EntityRecord, flatten};
use crate::report::CommunityResult;
use crate::summarizer::CommunitySummarizer;
use crate::tokenizer::TokenCounter;
use crate::usage::Usage;

/// Outcome of a full run. Failed communities are absent from `reports`.
#[derive(Debug, Default)]
pub struct SummaryRun {
    pub reports: BTreeMap<CommunityId, CommunityResult>,
    pub usage: Usage,
    pub failures: Vec<CommunityFailure>,
    pub skipped: BTreeMap<CommunityId, Vec<SkippedRecord>>,
}

type CommunityOutcome = Result<(CommunityResult, Usage), CommunityFailure>;

/// Runs the summarizer over every community in bounded concurrent batches.
pub struct CommunityScheduler {
    chunker: RecordChunker,
    summarizer: CommunitySummarizer,
    progress: Arc<SummaryProgress>,
    outer_batch_size: usize,
    outer_cooldown: Duration,
    jitter: Vec<Duration>,
}

impl CommunityScheduler {
    pub fn new(chunker: RecordChunker, summarizer: CommunitySummarizer, config: &SummarizerConfig) -> Self {
        let progress = summarizer.progress();
        Self {
            chunker,
            summarizer,
            progress,
            outer_batch_size: config.outer_batch_size.max(1),
            outer_cooldown: config.outer_cooldown(),
            jitter: config.jitter_ms.iter().copied().map(Duration::from_millis).collect(),
        }
    }

    pub fn from_config(
        counter: Arc<dyn TokenCounter>,
        generator: Arc<dyn ReportGenerator>,
        combiner: Arc<dyn ReportCombiner>,
        config: &SummarizerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let chunker = RecordChunker::new(counter, config);
        let summarizer = CommunitySummarizer::new(generator, combiner, config);
        Ok(Self::new(chunker, summarizer, config))
    }

    pub fn progress(&self) -> Arc<SummaryProgress> {
        Arc::clone(&self.progress)
    }

    /// Summarize every community. Communities are processed in id order;
    /// a failing community is logged and left out without affecting others.
    pub async fn summarize_all(&self, communities: &BTreeMap<CommunityId, Vec<EntityRecord>>) -> SummaryRun {
        let mut run = SummaryRun::default();

        // Chunking is local work, do it all up front
        let mut batched: Vec<(&CommunityId, Vec<Chunk>)> = Vec::with_capacity(communities.len());
        for (community_id, records) in communities {
            let plan = self.chunker.chunk_with_diagnostics(records);
            info!(
                community_id = %community_id,
                records = records.len(),
                chunks = plan.chunks.len(),
                "Community batched"
            );
            if !plan.skipped.is_empty() {
                run.skipped.insert(community_id.clone(), plan.skipped);
            }
            batched.push((community_id, plan.chunks));
        }

        self.progress.start_run(batched.len());
        let total_batches = batched.len().div_ceil(self.outer_batch_size);

        for (batch, batch_communities) in batched.chunks(self.outer_batch_size).enumerate() {
            info!(batch = batch + 1, total_batches, communities = batch_communities.len(), "Batch summarization");

            let outcomes = join_all(
                batch_communities
                    .iter()
                    .map(|(community_id, chunks)| self.execute_community_summary(community_id, chunks)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    Ok((result, usage)) => {
                        run.usage += usage;
                        run.reports.insert(result.community_id.clone(), result);
                    }
                    Err(failure) => run.failures.push(failure),
                }
            }

            // Applies whatever the batch outcome
            if batch + 1 < total_batches && !self.outer_cooldown.is_zero() {
                info!(cooldown_ms = self.outer_cooldown.as_millis(), "Cooldown");
                sleep(self.outer_cooldown).await;
            }
        }

        info!(
            succeeded = run.reports.len(),
            failed = run.failures.len(),
            total_tokens = run.usage.total_tokens,
            llm_calls = run.usage.llm_calls,
            "Summarized communities"
        );

        run
    }

    async fn execute_community_summary(&self, community_id: &CommunityId, chunks: &[Chunk]) -> CommunityOutcome {
        if let Some(delay) = self.pick_jitter() {
            sleep(delay).await;
        }

        info!(community_id = %community_id, chunks = chunks.len(), "Processing community");
        let outcome = self.summarizer.summarize_community(community_id, chunks).await;
        let completed = self.progress.record_community(outcome.is_ok());

        match outcome {
            Ok((report, usage)) => {
                info!(community_id = %community_id, completed, tokens = usage.total_tokens, "Community summarized");
                let result = CommunityResult {
                    community_id: community_id.clone(),
                    data: flatten(chunks),
                    report,
                };
                Ok((result, usage))
            }
            Err(error) => {
                error!(community_id = %community_id, completed, error = %error, "Community summarization failed");
                Err(CommunityFailure {
                    community_id: community_id.clone(),
                    error,
                })
            }
        }
    }

    fn pick_jitter(&self) -> Option<Duration> {
        self.jitter.choose(&mut rand::thread_rng()).copied()
    }
}
