//! Core decision pipeline.
//!
//! This module contains:
//! - Timing primitives and the capture buffer
//! - The classifier boundary and a reference classifier
//! - Sub-window aggregation into a vote tally
//! - The threshold and change-detection decision

pub mod aggregate;
pub mod classifier;
pub mod decision;
pub mod timing;
pub mod windowing;

// Re-export commonly used types
pub use aggregate::{Aggregation, AggregationError, SubWindowAggregator, Tally, Vote, VoteRules};
pub use classifier::{
    signal_from_buffer, Classifier, ClassifierError, ClassifierOutput, MotionEnergyClassifier,
    Signal, SignalError,
};
pub use decision::{confidence_threshold, top_slot, Decision, DecisionEngine, Evaluation};
pub use timing::{plan_wait, wait_until, Clock, ManualClock, SystemClock, WaitPlan};
pub use windowing::{fill_buffer, sample_count, CaptureTiming, WindowBuffer};
