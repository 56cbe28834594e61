//! Deterministic pseudo-random numbers for reproducible workloads.

use std::sync::Arc;
use std::time::Duration;

use pararray_shared::errors::{PipelineError, PipelineResult};

/// Generator shared between concurrently running workers.
pub type SharedRandom = Arc<parking_lot::Mutex<SeedableRandom>>;

/// Seedable xorshift128 generator.
///
/// The same seed always yields the same sequence, which makes randomized
/// delays in tests and demos reproducible.
#[derive(Debug, Clone)]
pub struct SeedableRandom {
    x: u32,
    y: u32,
    z: u32,
    w: u32,
}

impl SeedableRandom {
    pub const DEFAULT_SEED: u32 = 88_675_123;

    pub fn new(seed: u32) -> Self {
        Self {
            x: 123_456_789,
            y: 362_436_069,
            z: 521_288_629,
            w: seed,
        }
    }

    pub fn shared(self) -> SharedRandom {
        Arc::new(parking_lot::Mutex::new(self))
    }

    pub fn next_u32(&mut self) -> u32 {
        let t = self.x ^ (self.x << 11);
        self.x = self.y;
        self.y = self.z;
        self.z = self.w;
        self.w = (self.w ^ (self.w >> 19)) ^ (t ^ (t >> 8));
        self.w
    }

    /// Integer in `[lower, upper)`.
    ///
    /// # Errors
    ///
    /// `InvalidRange` if `upper <= lower`.
    pub fn int(&mut self, lower: i64, upper: i64) -> PipelineResult<i64> {
        if upper <= lower {
            return Err(PipelineError::InvalidRange { lower, upper });
        }
        let span = (i128::from(upper) - i128::from(lower)) as u128;
        let offset = u128::from(self.next_u32()) % span;
        Ok((i128::from(lower) + offset as i128) as i64)
    }

    /// Duration of `[lower_ms, upper_ms)` milliseconds.
    pub fn millis(&mut self, lower_ms: u64, upper_ms: u64) -> PipelineResult<Duration> {
        let lower = i64::try_from(lower_ms).unwrap_or(i64::MAX);
        let upper = i64::try_from(upper_ms).unwrap_or(i64::MAX);
        let ms = self.int(lower, upper)?;
        Ok(Duration::from_millis(ms as u64))
    }
}

impl Default for SeedableRandom {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}
