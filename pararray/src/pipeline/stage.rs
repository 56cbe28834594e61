//! Stage configuration.

use std::time::Duration;

use pararray_shared::errors::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

use super::admission::AdmissionOrder;

/// Options for one `async_map` stage.
///
/// Concurrency and launch spacing are independent knobs: `max_concurrency`
/// bounds how many workers are in flight at once, `min_start_interval`
/// bounds how often a new worker may start across the whole stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOptions {
    /// Maximum simultaneously running workers. `None` means unbounded.
    pub max_concurrency: Option<usize>,
    /// Order in which upstream items are admitted.
    pub admission: AdmissionOrder,
    /// Minimum spacing between successive worker start times.
    #[serde(rename = "min_start_interval_ms", with = "duration_ms")]
    pub min_start_interval: Duration,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            admission: AdmissionOrder::Completion,
            min_start_interval: Duration::ZERO,
        }
    }
}

impl StageOptions {
    /// Unbounded concurrency, completion-order admission, no throttle.
    pub fn parallel() -> Self {
        Self::default()
    }

    /// One worker at a time.
    pub fn sequential() -> Self {
        Self::default().max_concurrency(1)
    }

    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn admission(mut self, order: AdmissionOrder) -> Self {
        self.admission = order;
        self
    }

    pub fn in_index_order(self) -> Self {
        self.admission(AdmissionOrder::Index)
    }

    pub fn min_start_interval(mut self, interval: Duration) -> Self {
        self.min_start_interval = interval;
        self
    }

    pub fn min_start_interval_ms(self, ms: u64) -> Self {
        self.min_start_interval(Duration::from_millis(ms))
    }

    /// Reject options that can never describe a runnable stage.
    pub fn sanitize(&self) -> PipelineResult<()> {
        if self.max_concurrency == Some(0) {
            return Err(PipelineError::Config("max_concurrency must be at least 1".into()));
        }
        Ok(())
    }

    /// Effective number of occupancy slots for a stage over `len` items:
    /// the limit clamped to `1..=len`, and never below 1.
    pub fn capacity_for(&self, len: usize) -> usize {
        self.max_concurrency.unwrap_or(usize::MAX).min(len).max(1)
    }

    /// Parse a JSON array of stage options, e.g. a stage plan file.
    pub fn plan_from_json(json: &str) -> PipelineResult<Vec<StageOptions>> {
        let plan: Vec<StageOptions> = serde_json::from_str(json)
            .map_err(|e| PipelineError::Config(format!("invalid stage plan: {}", e)))?;
        for (index, options) in plan.iter().enumerate() {
            if let Err(e) = options.sanitize() {
                return Err(PipelineError::Config(format!("stage {}: {}", index, e)));
            }
        }
        Ok(plan)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
