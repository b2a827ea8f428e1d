//! Accelerometer access for the uplink engine.
//!
//! The engine only depends on the [`SampleSource`] trait; the simulated
//! accelerometer lets the whole pipeline run on a development host.

pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use simulated::{MotionProfile, SimulatedAccelerometer};
pub use types::{RawReading, Sample, SampleSource, SensorError};
