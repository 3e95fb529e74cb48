//! Deterministic collaborators shared by the unit tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::TokenizationError;
use crate::llm::{ReportCombiner, ReportGenerator};
use crate::record::{Chunk, EntityRecord};
use crate::report::CommunityReport;
use crate::tokenizer::TokenCounter;
use crate::usage::Usage;

pub fn record(entity: &str) -> EntityRecord {
    EntityRecord::new(entity)
}

/// Chunk of the named records with a preset token total
pub fn chunk(entities: &[&str], token_count: usize) -> Chunk {
    Chunk {
        records: entities.iter().map(|name| record(name)).collect(),
        token_count,
    }
}

pub fn report(title: &str) -> CommunityReport {
    CommunityReport {
        community_id: None,
        title: title.to_string(),
        summary: format!("summary of {title}"),
        rating: 5.0,
        rating_explanation: String::new(),
        findings: Vec::new(),
    }
}

/// Token counts looked up by entity name; unknown entities count as 1.
pub struct FixedCounter {
    counts: HashMap<String, usize>,
    failing: HashSet<String>,
}

impl FixedCounter {
    pub fn new(entries: &[(&str, usize)]) -> Self {
        Self {
            counts: entries.iter().map(|(name, count)| (name.to_string(), *count)).collect(),
            failing: HashSet::new(),
        }
    }

    pub fn failing_on(mut self, entity: &str) -> Self {
        self.failing.insert(entity.to_string());
        self
    }
}

impl TokenCounter for FixedCounter {
    fn count(&self, text: &str, model: &str) -> Result<usize, TokenizationError> {
        let record: EntityRecord = serde_json::from_str(text).map_err(|e| TokenizationError {
            model: model.to_string(),
            reason: e.to_string(),
        })?;
        if self.failing.contains(&record.entity) {
            return Err(TokenizationError {
                model: model.to_string(),
                reason: format!("cannot encode {}", record.entity),
            });
        }
        Ok(self.counts.get(&record.entity).copied().unwrap_or(1))
    }
}

fn entity_names(chunk: &Chunk) -> Vec<String> {
    chunk.records.iter().map(|r| r.entity.clone()).collect()
}

/// Generator whose report title lists the chunk's entities.
#[derive(Default)]
pub struct StubGenerator {
    pub calls: Mutex<Vec<Vec<String>>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, entity: &str) -> Self {
        self.failing.insert(entity.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportGenerator for StubGenerator {
    async fn generate(&self, _model: &str, chunk: &Chunk) -> Result<(CommunityReport, Usage)> {
        let names = entity_names(chunk);
        self.calls.lock().unwrap().push(names.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(bad) = names.iter().find(|name| self.failing.contains(*name)) {
            anyhow::bail!("service rejected chunk containing {bad}");
        }

        let usage = Usage::for_call(chunk.token_count as u64, 10);
        Ok((report(&names.join("+")), usage))
    }
}

/// Combiner whose report title joins the partial titles in order.
#[derive(Default)]
pub struct StubCombiner {
    pub calls: Mutex<Vec<Vec<String>>>,
    fail: bool,
}

impl StubCombiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportCombiner for StubCombiner {
    async fn combine(&self, _model: &str, reports: &[CommunityReport]) -> Result<(CommunityReport, Usage)> {
        let titles: Vec<String> = reports.iter().map(|r| r.title.clone()).collect();
        self.calls.lock().unwrap().push(titles.clone());

        if self.fail {
            anyhow::bail!("combiner unavailable");
        }

        Ok((report(&titles.join(" | ")), Usage::for_call(100, 5)))
    }
}
