//! Types shared across the pararray workspace.

pub mod errors;

pub use errors::{PipelineError, PipelineResult};
