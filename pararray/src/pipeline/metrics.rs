use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::pipeline::AdmissionOrder;

/// Lock-free counters for one stage, written by its coordination task.
#[derive(Debug)]
pub(crate) struct StageMetricsStorage {
    index: usize,
    items: usize,
    capacity: usize,
    admission: AdmissionOrder,
    min_start_interval: Duration,
    dispatched: AtomicU64,
    invoked: AtomicU64,
    passed_through: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    peak_occupancy: AtomicU64,
    duration_ms: OnceLock<u128>,
}

impl StageMetricsStorage {
    pub(crate) fn new(
        index: usize,
        items: usize,
        capacity: usize,
        admission: AdmissionOrder,
        min_start_interval: Duration,
    ) -> Self {
        Self {
            index,
            items,
            capacity,
            admission,
            min_start_interval,
            dispatched: AtomicU64::new(0),
            invoked: AtomicU64::new(0),
            passed_through: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            peak_occupancy: AtomicU64::new(0),
            duration_ms: OnceLock::new(),
        }
    }

    pub(crate) fn record_dispatch(&self, occupancy: usize) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.peak_occupancy
            .fetch_max(occupancy as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_invoked(&self) {
        self.invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_passed_through(&self) {
        self.passed_through.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drained(&self, duration: Duration) {
        let _ = self.duration_ms.set(duration.as_millis());
    }

    pub(crate) fn snapshot(&self) -> StageMetrics {
        StageMetrics {
            index: self.index,
            items: self.items,
            capacity: self.capacity,
            admission: self.admission,
            min_start_interval: self.min_start_interval,
            dispatched: self.dispatched.load(Ordering::Relaxed),
            invoked: self.invoked.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            peak_occupancy: self.peak_occupancy.load(Ordering::Relaxed),
            duration_ms: self.duration_ms.get().copied(),
        }
    }
}

/// Point-in-time view of one stage's counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMetrics {
    /// Position of the stage in its pipeline (0 = first `async_map`).
    pub index: usize,
    pub items: usize,
    /// Effective concurrency limit.
    pub capacity: usize,
    pub admission: AdmissionOrder,
    pub min_start_interval: Duration,
    pub dispatched: u64,
    /// Items the worker was actually called for.
    pub invoked: u64,
    /// Upstream failures forwarded without calling the worker.
    pub passed_through: u64,
    pub succeeded: u64,
    /// Worker failures, panics included.
    pub failed: u64,
    pub panicked: u64,
    pub peak_occupancy: u64,
    /// Wall time from stage start until every item settled.
    pub duration_ms: Option<u128>,
}

impl StageMetrics {
    pub fn is_drained(&self) -> bool {
        self.duration_ms.is_some()
    }

    /// Items whose output slot has been settled.
    pub fn settled(&self) -> u64 {
        self.succeeded + self.failed + self.passed_through
    }
}

/// Metrics for every stage that led to a container, oldest first.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub fn stage(&self, index: usize) -> Option<&StageMetrics> {
        self.stages.iter().find(|stage| stage.index == index)
    }

    pub fn total_failed(&self) -> u64 {
        self.stages.iter().map(|stage| stage.failed).sum()
    }

    /// Sum of stage durations; `None` until every stage has drained.
    pub fn total_duration_ms(&self) -> Option<u128> {
        self.stages.iter().map(|stage| stage.duration_ms).sum()
    }
}
