//! Ordered, concurrency-limited async task pipelines.
//!
//! Start from a fixed set of items, chain `async_map` stages that each run a
//! worker over every item with bounded concurrency, then collect:
//!
//! ```no_run
//! use pararray::{BoxError, ParArray, StageOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let totals = ParArray::from_items(0..100u64)
//!     .async_map(
//!         |_idx, n: u64| async move { Ok::<_, BoxError>(n * n) },
//!         StageOptions::default().max_concurrency(8),
//!     )?
//!     .async_map(
//!         |idx, n: u64| async move { Ok::<_, BoxError>(n + idx as u64) },
//!         StageOptions::default().max_concurrency(4).in_index_order(),
//!     )?
//!     .all()
//!     .await?;
//! assert_eq!(totals.len(), 100);
//! # Ok(())
//! # }
//! ```
//!
//! Failures are data inside a pipeline: a failed item keeps its index and
//! reason through every later stage, and only `all()` turns the first one
//! (by index) into an error. `all_settled()` reports every item.

mod logging;
pub mod pipeline;
pub mod util;

pub use logging::{LogOptions, LoggingGuard, init_logging};
pub use pararray_shared::errors::{PipelineError, PipelineResult};
pub use pipeline::{
    Admission, AdmissionOrder, BoxError, ParArray, PipelineItem, PipelineMetrics, Reason, Settled,
    SettledFuture, StageMetrics, StageOptions, Tagged, Worker,
};
