//! Motion Uplink - accelerometer classification with a deduplicated,
//! duty-cycle aware radio uplink.
//!
//! Each cycle captures a fixed window of accelerometer samples, classifies
//! overlapping sub-windows, reduces the votes to one decision and transmits it
//! only when it is confident and different from the last one sent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Motion Uplink                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Sensor    │──▶│  Windowing  │──▶│ Sub-window  │       │
//! │  │ (3-axis)    │   │ (4s buffer) │   │ aggregation │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                              │              │
//! │                                              ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │   Driver    │◀──│    Radio    │◀──│  Decision   │       │
//! │  │  (retries)  │   │ (duty cycle)│   │ (threshold) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use motion_uplink::{
//!     core::{MotionEnergyClassifier, SystemClock},
//!     radio::{RadioConfig, SimulatedRadio},
//!     sensor::{MotionProfile, SimulatedAccelerometer},
//!     Config, Engine,
//! };
//!
//! let config = Config::default();
//! let clock = SystemClock::new();
//! let classifier = MotionEnergyClassifier::for_labels(&config.labels, config.window_samples);
//! let mut radio = SimulatedRadio::new(RadioConfig::default(), clock);
//! radio.join();
//!
//! let mut engine = Engine::new(
//!     &config,
//!     SimulatedAccelerometer::new(MotionProfile::Walk),
//!     classifier,
//!     radio,
//!     clock,
//! )
//! .expect("valid configuration");
//!
//! let report = engine.run_cycle();
//! println!("{:?} -> {:?}", report.outcome, report.next);
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod radio;
pub mod scheduler;
pub mod sensor;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    Classifier, ClassifierError, ClassifierOutput, Decision, DecisionEngine, SubWindowAggregator,
    Tally, WindowBuffer,
};
pub use engine::{CycleOutcome, CycleReport, CycleState, Engine, NextAction};
pub use radio::{Downlink, MessageFlags, RadioEvent, Transmitter, TxError};
pub use scheduler::{CycleToken, Driver, EventQueue, Scheduler};
pub use sensor::{RawReading, Sample, SampleSource, SensorError};
pub use stats::{SharedUplinkLog, UplinkLog, UplinkStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
