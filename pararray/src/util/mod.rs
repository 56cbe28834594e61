//! Small helpers used by workloads, tests and the demo binary.

mod delay;
mod random;

pub use delay::{delay, delay_for};
pub use random::{SeedableRandom, SharedRandom};
