//! Error taxonomy for pararray.
//!
//! Worker failures are not listed here: they travel through a pipeline as
//! data (a failed item's reason) and only surface when a container is
//! collected. This enum covers misuse of the library and the coordination
//! faults that get folded into an item's reason.

use thiserror::Error;

/// Result type for pararray operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Stage options rejected before any work was scheduled.
    #[error("invalid stage configuration: {0}")]
    Config(String),

    /// No async runtime available to drive a stage.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A worker panicked while processing the item at `idx`.
    #[error("worker panicked at index {idx}: {message}")]
    WorkerPanicked { idx: usize, message: String },

    /// The resolver for result slot `idx` was dropped before settling it.
    #[error("result slot {0} was dropped before it settled")]
    SlotDropped(usize),

    /// Empty or inverted range passed to the random helper.
    #[error("l({lower}) should be smaller than u({upper})")]
    InvalidRange { lower: i64, upper: i64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether this error describes a fault inside a running stage, as
    /// opposed to misuse detected up front.
    pub fn is_stage_fault(&self) -> bool {
        matches!(
            self,
            PipelineError::WorkerPanicked { .. } | PipelineError::SlotDropped(_)
        )
    }
}
