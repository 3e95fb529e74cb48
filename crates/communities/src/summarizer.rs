use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::config::SummarizerConfig;
use crate::error::SummarizeError;
use crate::limiter::RequestLimiter;
use crate::llm::{ReportCombiner, ReportGenerator};
use crate::progress::SummaryProgress;
use crate::record::{Chunk, CommunityId};
use crate::report::CommunityReport;
use crate::usage::Usage;

/// Summarizes one community from its chunks: one report per chunk, then a
/// combined report when there was more than one chunk.
#[derive(Clone)]
pub struct CommunitySummarizer {
    generator: Arc<dyn ReportGenerator>,
    combiner: Arc<dyn ReportCombiner>,
    limiter: Arc<RequestLimiter>,
    progress: Arc<SummaryProgress>,
    model: String,
    inner_batch_size: usize,
    inter_batch_cooldown: Duration,
    request_timeout: Duration,
}

impl CommunitySummarizer {
    pub fn new(
        generator: Arc<dyn ReportGenerator>,
        combiner: Arc<dyn ReportCombiner>,
        config: &SummarizerConfig,
    ) -> Self {
        Self {
            generator,
            combiner,
            limiter: Arc::new(RequestLimiter::from_config(config)),
            progress: SummaryProgress::new(),
            model: config.model.clone(),
            inner_batch_size: config.inner_batch_size.max(1),
            inter_batch_cooldown: config.inter_batch_cooldown(),
            request_timeout: config.request_timeout(),
        }
    }

    pub fn progress(&self) -> Arc<SummaryProgress> {
        Arc::clone(&self.progress)
    }

    /// Generate the report for a community
    pub async fn summarize_community(
        &self,
        community_id: &CommunityId,
        chunks: &[Chunk],
    ) -> Result<(CommunityReport, Usage), SummarizeError> {
        match chunks {
            [] => Err(SummarizeError::EmptyCommunity),
            [chunk] => {
                let (mut report, usage) = self.generate(0, chunk).await?;
                report.stamp(community_id);
                Ok((report, usage))
            }
            _ => self.summarize_in_batches(community_id, chunks).await,
        }
    }

    async fn summarize_in_batches(
        &self,
        community_id: &CommunityId,
        chunks: &[Chunk],
    ) -> Result<(CommunityReport, Usage), SummarizeError> {
        let total_batches = chunks.len().div_ceil(self.inner_batch_size);
        let mut reports = Vec::with_capacity(chunks.len());
        let mut usage = Usage::default();

        for (batch, batch_chunks) in chunks.chunks(self.inner_batch_size).enumerate() {
            let offset = batch * self.inner_batch_size;
            let results = join_all(
                batch_chunks
                    .iter()
                    .enumerate()
                    .map(|(i, chunk)| self.generate(offset + i, chunk)),
            )
            .await;

            // join_all keeps input order, so reports stay in chunk order
            for result in results {
                let (report, call_usage) = result?;
                reports.push(report);
                usage += call_usage;
            }

            info!(
                community_id = %community_id,
                batch = batch + 1,
                total_batches,
                "Community chunk batch done"
            );

            if !self.inter_batch_cooldown.is_zero() {
                debug!(community_id = %community_id, cooldown_ms = self.inter_batch_cooldown.as_millis(), "Community cooldown");
                sleep(self.inter_batch_cooldown).await;
            }
        }

        let (mut report, combine_usage) = self.combine(&reports).await?;
        usage += combine_usage;
        report.stamp(community_id);

        Ok((report, usage))
    }

    async fn generate(&self, index: usize, chunk: &Chunk) -> Result<(CommunityReport, Usage), SummarizeError> {
        let _permit = self.limiter.acquire().await?;
        self.progress.record_generator_call();
        debug!(chunk = index, records = chunk.len(), tokens = chunk.token_count, "Generating chunk report");

        match timeout(self.request_timeout, self.generator.generate(&self.model, chunk)).await {
            Ok(Ok(generated)) => Ok(generated),
            Ok(Err(error)) => Err(SummarizeError::Generation { chunk: index, error }),
            Err(_) => Err(SummarizeError::Timeout {
                operation: "report generation",
                after: self.request_timeout,
            }),
        }
    }

    async fn combine(&self, reports: &[CommunityReport]) -> Result<(CommunityReport, Usage), SummarizeError> {
        let _permit = self.limiter.acquire().await?;
        self.progress.record_combiner_call();
        debug!(reports = reports.len(), "Combining partial reports");

        match timeout(self.request_timeout, self.combiner.combine(&self.model, reports)).await {
            Ok(Ok(combined)) => Ok(combined),
            Ok(Err(error)) => Err(SummarizeError::Combination(error)),
            Err(_) => Err(SummarizeError::Timeout {
                operation: "report combination",
                after: self.request_timeout,
            }),
        }
    }
}
