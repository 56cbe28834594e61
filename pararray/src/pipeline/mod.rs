//! Ordered, concurrency-limited async pipelines.
//!
//! This module provides:
//! - A fixed-length container of result futures ([`ParArray`])
//! - Stages that map a worker over a container with bounded concurrency,
//!   a choice of admission order and optional launch throttling
//! - Fail-fast (`all`) and fully settled (`all_settled`) collection
//!
//! ## Architecture
//!
//! ```text
//! ParArray → async_map → ParArray → async_map → … → all / all_settled
//!
//! - ParArray: N futures, slot i settles to the result for input i
//! - Stage:    Admission (completion | index) → StageScheduler (≤ K in flight)
//! - Worker:   per-item async work; errors travel on as data
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use pararray::{BoxError, ParArray, StageOptions};
//! use std::time::Duration;
//!
//! let results = ParArray::from_items(urls)
//!     .async_map(fetch, StageOptions::default().max_concurrency(8))?
//!     .async_map(
//!         parse,
//!         StageOptions::default()
//!             .in_index_order()
//!             .min_start_interval(Duration::from_millis(50)),
//!     )?
//!     .all_settled()
//!     .await;
//! ```

mod admission;
mod array;
mod metrics;
mod scheduler;
mod slot;
mod stage;
mod tagged;
mod task;

pub use admission::{Admission, AdmissionOrder};
pub use array::ParArray;
pub use metrics::{PipelineMetrics, StageMetrics};
pub use slot::SettledFuture;
pub use stage::StageOptions;
pub use tagged::{BoxError, PipelineItem, Reason, Settled, Tagged};
pub use task::Worker;
