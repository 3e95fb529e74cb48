use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Live counters of a summarization run, shared with whoever wants to watch.
pub struct SummaryProgress {
    total_communities: AtomicUsize,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,

    generator_calls: AtomicUsize,
    combiner_calls: AtomicUsize,
}

impl SummaryProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_communities: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            generator_calls: AtomicUsize::new(0),
            combiner_calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn start_run(&self, communities: usize) {
        self.total_communities.fetch_add(communities, Ordering::Relaxed);
    }

    /// Called exactly once per attempted community; returns the completed count
    pub(crate) fn record_community(&self, success: bool) -> usize {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_generator_call(&self) {
        self.generator_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_combiner_call(&self) {
        self.combiner_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_communities: self.total_communities.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            generator_calls: self.generator_calls.load(Ordering::Relaxed),
            combiner_calls: self.combiner_calls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_communities: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub generator_calls: usize,
    pub combiner_calls: usize,
}

impl ProgressSnapshot {
    pub fn fraction_done(&self) -> f64 {
        if self.total_communities > 0 {
            self.completed as f64 / self.total_communities as f64
        } else {
            0.0
        }
    }
}
