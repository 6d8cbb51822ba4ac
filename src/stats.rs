//! # Statistics
//!
//! Run statistics shared between the orchestrator and its workers. The
//! `execs` and `results` counters are the only values touched concurrently;
//! they live in [`ExecCounters`] and are merged into a [`Statistics`]
//! snapshot on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runtime statistics for a single run, optionally continued from a prior session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Time the run started.
    pub start: Option<DateTime<Utc>>,
    /// Time the run finished.
    pub stop: Option<DateTime<Utc>>,
    /// Total duration of the run, `stop - start`.
    pub total: Duration,
    /// Number of lines in the wordlist.
    pub inputs: u64,
    /// Executions per second over `total`.
    pub eps: f64,
    /// Number of executions so far.
    pub execs: u64,
    /// Number of executions that produced a result.
    pub results: u64,
    /// Completion percentage, `execs / inputs * 100`.
    pub progress: f64,
}

impl Statistics {
    /// True when this snapshot should trigger a resume skip.
    pub fn is_resumable(&self) -> bool {
        self.execs > 0
    }

    /// Compute stop time and the derived fields.
    pub fn finalize(&mut self, stop: DateTime<Utc>) {
        let start = *self.start.get_or_insert(stop);
        self.stop = Some(stop);
        self.total = (stop - start).to_std().unwrap_or(Duration::ZERO);

        let secs = self.total.as_secs_f64();
        self.eps = if secs > 0.0 {
            self.execs as f64 / secs
        } else {
            0.0
        };
        self.progress = completion_pct(self.execs, self.inputs);
    }
}

/// `done / total * 100`, or 0 when there is nothing to do.
pub fn completion_pct(done: u64, total: u64) -> f64 {
    if total > 0 {
        (done as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// Lock-free execution and result counters shared by all workers.
#[derive(Debug, Default)]
pub struct ExecCounters {
    execs: AtomicU64,
    results: AtomicU64,
}

impl ExecCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters continuing from a prior snapshot.
    pub fn seeded(execs: u64, results: u64) -> Self {
        Self {
            execs: AtomicU64::new(execs),
            results: AtomicU64::new(results),
        }
    }

    #[inline]
    pub fn record_execution(&self) {
        self.execs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_result(&self) {
        self.results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn execs(&self) -> u64 {
        self.execs.load(Ordering::Relaxed)
    }

    pub fn results(&self) -> u64 {
        self.results.load(Ordering::Relaxed)
    }

    /// Copy the live counters into `stats`.
    pub fn apply_to(&self, stats: &mut Statistics) {
        stats.execs = self.execs();
        stats.results = self.results();
    }
}
