//! The capture, classify, decide and transmit cycle.
//!
//! [`Engine::run_cycle`] runs one complete cycle and tells the caller what to
//! do next. It never schedules itself; the [`Driver`](crate::scheduler::Driver)
//! turns the returned [`NextAction`] into a timer.

use crate::config::{Config, ConfigError};
use crate::core::aggregate::{AggregationError, SubWindowAggregator, Tally};
use crate::core::classifier::Classifier;
use crate::core::decision::{Decision, DecisionEngine, Evaluation};
use crate::core::timing::Clock;
use crate::core::windowing::{fill_buffer, CaptureTiming, WindowBuffer};
use crate::radio::{encode_payload, MessageFlags, Transmitter, TxError};
use crate::sensor::{SampleSource, SensorError};
use crate::stats::{create_shared_log, SharedUplinkLog};
use std::time::Duration;

/// Where the engine is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Sampling,
    Evaluating,
    Sending,
    RetryPending(Duration),
}

/// What the driver should do after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Start the next cycle right away
    Continue,
    /// Start the next cycle after the delay
    RetryAfter(Duration),
    /// Wait for an external trigger
    Idle,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Frame queued by the radio
    Transmitted { slot: usize, bytes: usize },
    /// No slot met the confidence threshold
    BelowThreshold,
    /// Top slot equals the last transmitted slot
    Unchanged,
    /// Radio refused because of duty-cycle limits
    DutyCycleRestricted,
    /// Sensor could not be initialized
    SensorFailed(SensorError),
    /// Signal conversion or classifier failure
    ClassifierFailed(AggregationError),
    /// Radio refused for any other reason
    TransmitFailed(TxError),
}

impl CycleOutcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CycleOutcome::SensorFailed(_)
                | CycleOutcome::ClassifierFailed(_)
                | CycleOutcome::TransmitFailed(_)
        )
    }
}

/// Result of one [`Engine::run_cycle`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub next: NextAction,
    /// Vote tally, when classification completed
    pub tally: Option<Tally>,
    /// Decision statistics, when classification completed
    pub evaluation: Option<Evaluation>,
}

/// Timing and policy values the engine needs from [`Config`].
#[derive(Debug, Clone)]
struct EnginePolicy {
    timing: CaptureTiming,
    axis_divisor: f32,
    poll_interval: Duration,
    failure_retry: Duration,
    duty_cycle_retry: Duration,
    tx_port: u8,
}

/// Owns the capture buffer, the decision state and the collaborators.
#[derive(Debug)]
pub struct Engine<S, C, T, K> {
    policy: EnginePolicy,
    source: S,
    classifier: C,
    transmitter: T,
    clock: K,
    buffer: WindowBuffer,
    aggregator: SubWindowAggregator,
    decision: DecisionEngine,
    sensor_ready: bool,
    state: CycleState,
    log: SharedUplinkLog,
}

impl<S, C, T, K> Engine<S, C, T, K>
where
    S: SampleSource,
    C: Classifier,
    T: Transmitter,
    K: Clock,
{
    /// Build an engine from a validated configuration.
    pub fn new(
        config: &Config,
        source: S,
        classifier: C,
        transmitter: T,
        clock: K,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let expected = config.window_samples * crate::sensor::Sample::AXES;
        if classifier.input_len() != expected {
            tracing::warn!(
                "Classifier expects {} values but windows hold {}; every cycle will fail",
                classifier.input_len(),
                expected
            );
        }

        Ok(Self {
            policy: EnginePolicy {
                timing: config.capture_timing(),
                axis_divisor: config.axis_divisor,
                poll_interval: config.poll_interval,
                failure_retry: config.failure_retry,
                duty_cycle_retry: config.duty_cycle_retry,
                tx_port: config.tx_port,
            },
            source,
            classifier,
            transmitter,
            clock,
            buffer: WindowBuffer::with_capacity(config.capture_samples()),
            aggregator: SubWindowAggregator::new(
                config.window_samples,
                config.stride_samples,
                config.vote_rules(),
            ),
            decision: DecisionEngine::new(config.min_confidence),
            sensor_ready: false,
            state: CycleState::Idle,
            log: create_shared_log(),
        })
    }

    /// Record activity in `log` instead of a private one.
    pub fn with_log(mut self, log: SharedUplinkLog) -> Self {
        self.log = log;
        self
    }

    /// Run one full cycle.
    pub fn run_cycle(&mut self) -> CycleReport {
        self.log.record_cycle();
        self.state = CycleState::Sampling;

        if !self.sensor_ready {
            if let Err(e) = self.source.init() {
                tracing::error!(stage = "sensor_init", "{}", e);
                self.log.record_failure();
                return self.finish(CycleOutcome::SensorFailed(e), None, None);
            }
            self.sensor_ready = true;
        }

        tracing::info!(
            "Sampling data for {} ms...",
            self.policy.timing.duration.as_millis()
        );
        let captured = fill_buffer(
            &mut self.source,
            &self.clock,
            &mut self.buffer,
            &self.policy.timing,
            self.policy.axis_divisor,
        );
        tracing::debug!("Sampling data OK ({} samples)", captured);

        self.state = CycleState::Evaluating;
        let aggregation = match self.aggregator.aggregate(&self.buffer, &mut self.classifier) {
            Ok(aggregation) => aggregation,
            Err(e) => {
                tracing::warn!(stage = "classify", code = e.code(), offset = e.offset(), "{}", e);
                self.log.record_failure();
                return self.retry(
                    CycleOutcome::ClassifierFailed(e),
                    self.policy.failure_retry,
                    None,
                    None,
                );
            }
        };
        self.log.record_sub_windows(aggregation.evaluated as u64);

        let tally = aggregation.tally;
        tracing::info!("{}", tally.describe(self.classifier.labels()));

        let evaluation = match self.decision.decide(&tally, aggregation.evaluated) {
            Decision::BelowThreshold(evaluation) => {
                tracing::info!(
                    "Result didn't meet confidence threshold ({} votes, need more than {}), doing nothing",
                    evaluation.top_count,
                    evaluation.confidence_threshold
                );
                self.log.record_below_threshold();
                return self.retry(
                    CycleOutcome::BelowThreshold,
                    self.policy.poll_interval,
                    Some(tally),
                    Some(evaluation),
                );
            }
            Decision::Unchanged(evaluation) => {
                tracing::info!("Result was unchanged, doing nothing");
                self.log.record_unchanged();
                return self.retry(
                    CycleOutcome::Unchanged,
                    self.policy.poll_interval,
                    Some(tally),
                    Some(evaluation),
                );
            }
            Decision::Transmit(evaluation) => evaluation,
        };

        self.state = CycleState::Sending;
        let payload = encode_payload(&tally);
        match self
            .transmitter
            .send(self.policy.tx_port, &payload, MessageFlags::Unconfirmed)
        {
            Ok(bytes) => {
                self.decision.commit(evaluation.top_slot);
                self.log.record_transmission();
                tracing::info!(
                    slot = evaluation.top_slot,
                    "{} bytes scheduled for transmission",
                    bytes
                );
                self.finish(
                    CycleOutcome::Transmitted {
                        slot: evaluation.top_slot,
                        bytes,
                    },
                    Some(tally),
                    Some(evaluation),
                )
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(stage = "send", code = e.code(), "{}", e);
                self.log.record_duty_cycle_rejection();
                self.retry(
                    CycleOutcome::DutyCycleRestricted,
                    self.policy.duty_cycle_retry,
                    Some(tally),
                    Some(evaluation),
                )
            }
            Err(e) => {
                tracing::error!(stage = "send", code = e.code(), "{}", e);
                self.log.record_failure();
                self.finish(CycleOutcome::TransmitFailed(e), Some(tally), Some(evaluation))
            }
        }
    }

    fn retry(
        &mut self,
        outcome: CycleOutcome,
        delay: Duration,
        tally: Option<Tally>,
        evaluation: Option<Evaluation>,
    ) -> CycleReport {
        self.state = CycleState::RetryPending(delay);
        let next = if delay.is_zero() {
            NextAction::Continue
        } else {
            NextAction::RetryAfter(delay)
        };
        CycleReport {
            outcome,
            next,
            tally,
            evaluation,
        }
    }

    fn finish(
        &mut self,
        outcome: CycleOutcome,
        tally: Option<Tally>,
        evaluation: Option<Evaluation>,
    ) -> CycleReport {
        self.state = CycleState::Idle;
        CycleReport {
            outcome,
            next: NextAction::Idle,
            tally,
            evaluation,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Slot of the last accepted transmission.
    pub fn last_top_slot(&self) -> Option<usize> {
        self.decision.last_top_slot()
    }

    pub fn labels(&self) -> &[String] {
        self.classifier.labels()
    }

    pub fn buffer(&self) -> &WindowBuffer {
        &self.buffer
    }

    pub fn log(&self) -> &SharedUplinkLog {
        &self.log
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }

    pub fn transmitter(&self) -> &T {
        &self.transmitter
    }

    pub fn transmitter_mut(&mut self) -> &mut T {
        &mut self.transmitter
    }
}
