//! Input side: edge counting and the fan tachometer built on it.

pub mod edge_counter;
pub mod tachometer;

pub use edge_counter::{EdgeCounter, PulseCount};
pub use tachometer::{RpmEstimator, rpm_from_pulses};
