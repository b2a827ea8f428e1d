//! Cycle scheduling and the radio-event driver.
//!
//! At most one cycle is ever pending. Scheduling a new one replaces the old
//! one, and a cycle triggered directly by a radio event supersedes any
//! pending retry, so two cycles never overlap.

use crate::config::Config;
use crate::core::classifier::Classifier;
use crate::core::timing::Clock;
use crate::engine::{CycleReport, Engine, NextAction};
use crate::radio::{to_hex, Downlink, RadioEvent, Transmitter};
use crate::sensor::SampleSource;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How long the driver blocks on the event channel when nothing is pending.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Identifies one scheduled cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CycleToken(u64);

impl CycleToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Accepts requests to run a cycle later.
pub trait Scheduler {
    /// Run the cycle identified by `token` after `delay`.
    fn schedule(&mut self, delay: Duration, token: CycleToken);

    /// Drop any pending cycle.
    fn cancel(&mut self);
}

/// Single-slot timer queue with an optional periodic trigger.
#[derive(Debug)]
pub struct EventQueue<K: Clock> {
    clock: K,
    pending: Option<(Duration, CycleToken)>,
    periodic: Option<(Duration, Duration)>,
    next_id: u64,
}

impl<K: Clock> EventQueue<K> {
    pub fn new(clock: K) -> Self {
        Self {
            clock,
            pending: None,
            periodic: None,
            next_id: 0,
        }
    }

    /// Issue a fresh token.
    pub fn next_token(&mut self) -> CycleToken {
        self.next_id += 1;
        CycleToken(self.next_id)
    }

    /// Fire a cycle every `period`, starting one period from now.
    pub fn call_every(&mut self, period: Duration) {
        self.periodic = Some((period, self.clock.now() + period));
    }

    pub fn is_periodic(&self) -> bool {
        self.periodic.is_some()
    }

    /// Token of the pending one-shot cycle.
    pub fn pending(&self) -> Option<CycleToken> {
        self.pending.map(|(_, token)| token)
    }

    /// Delay of the pending one-shot cycle, measured from now.
    pub fn pending_delay(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.pending
            .map(|(deadline, _)| deadline.saturating_sub(now))
    }

    /// Time until the earliest due trigger, if any.
    pub fn time_until_due(&self) -> Option<Duration> {
        let now = self.clock.now();
        let one_shot = self.pending.map(|(deadline, _)| deadline);
        let periodic = self.periodic.map(|(_, due)| due);
        let earliest = match (one_shot, periodic) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        earliest.map(|due| due.saturating_sub(now))
    }

    /// Take the trigger that is due now, if any.
    pub fn take_due(&mut self) -> Option<CycleToken> {
        let now = self.clock.now();

        if let Some((deadline, token)) = self.pending {
            if deadline <= now {
                self.pending = None;
                return Some(token);
            }
        }

        if let Some((period, due)) = self.periodic {
            if due <= now {
                // Missed periods collapse into this one trigger
                let next = if due + period <= now { now + period } else { due + period };
                self.periodic = Some((period, next));
                return Some(self.next_token());
            }
        }

        None
    }
}

impl<K: Clock> Scheduler for EventQueue<K> {
    fn schedule(&mut self, delay: Duration, token: CycleToken) {
        if let Some((_, previous)) = self.pending {
            tracing::debug!("Cycle {} superseded by {}", previous.id(), token.id());
        }
        self.pending = Some((self.clock.now() + delay, token));
    }

    fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Whether the driver keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Runs engine cycles in response to radio events and timers.
#[derive(Debug)]
pub struct Driver<S, C, T, K: Clock> {
    engine: Engine<S, C, T, K>,
    queue: EventQueue<K>,
    duty_cycle_on: bool,
    tx_timer: Duration,
    cycles_run: usize,
    cycle_limit: Option<usize>,
    last_report: Option<CycleReport>,
    last_downlink: Option<Downlink>,
}

impl<S, C, T, K> Driver<S, C, T, K>
where
    S: SampleSource,
    C: Classifier,
    T: Transmitter,
    K: Clock,
{
    pub fn new(engine: Engine<S, C, T, K>, queue: EventQueue<K>, config: &Config) -> Self {
        Self {
            engine,
            queue,
            duty_cycle_on: config.duty_cycle_on,
            tx_timer: config.tx_timer,
            cycles_run: 0,
            cycle_limit: None,
            last_report: None,
            last_downlink: None,
        }
    }

    /// Stop after `limit` cycles.
    pub fn with_cycle_limit(mut self, limit: Option<usize>) -> Self {
        self.cycle_limit = limit;
        self
    }

    pub fn engine(&self) -> &Engine<S, C, T, K> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<S, C, T, K> {
        &mut self.engine
    }

    pub fn queue(&self) -> &EventQueue<K> {
        &self.queue
    }

    pub fn cycles_run(&self) -> usize {
        self.cycles_run
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    /// Most recent frame received from the network.
    pub fn last_downlink(&self) -> Option<&Downlink> {
        self.last_downlink.as_ref()
    }

    pub fn limit_reached(&self) -> bool {
        self.cycle_limit
            .map_or(false, |limit| self.cycles_run >= limit)
    }

    /// React to a radio stack event.
    pub fn handle_event(&mut self, event: RadioEvent) -> Control {
        match event {
            RadioEvent::Connected => {
                tracing::info!("Connection - Successful");
                if !self.duty_cycle_on {
                    self.queue.call_every(self.tx_timer);
                }
            }
            RadioEvent::Disconnected => {
                tracing::info!("Disconnected Successfully");
                self.queue.cancel();
                return Control::Stop;
            }
            RadioEvent::TxDone => {
                tracing::info!("Message Sent to Network Server");
            }
            RadioEvent::TxTimeout
            | RadioEvent::TxError
            | RadioEvent::TxCryptoError
            | RadioEvent::TxSchedulingError => {
                tracing::warn!("Transmission Error - Event = {:?}", event);
            }
            RadioEvent::RxDone => {
                tracing::info!("Received message from Network Server");
                self.receive_downlink();
            }
            RadioEvent::RxTimeout | RadioEvent::RxError => {
                tracing::warn!("Error in reception - Event = {:?}", event);
            }
            RadioEvent::JoinFailure => {
                tracing::error!("OTAA Failed - Check Keys");
            }
            RadioEvent::UplinkRequired => {
                tracing::info!("Uplink required by NS");
            }
        }

        if self.duty_cycle_on && triggers_cycle(event) {
            self.trigger();
        }
        Control::Continue
    }

    /// Read the pending downlink from the radio.
    ///
    /// Returns whether a frame was read; receive errors are reported and
    /// otherwise ignored.
    pub fn receive_downlink(&mut self) -> bool {
        match self.engine.transmitter_mut().receive() {
            Ok(downlink) => {
                tracing::info!(
                    "RX Data on port {} ({} bytes): {}",
                    downlink.port,
                    downlink.payload.len(),
                    to_hex(&downlink.payload)
                );
                self.last_downlink = Some(downlink);
                true
            }
            Err(e) => {
                tracing::error!(stage = "receive", code = e.code(), "receive() - Error code {}", e.code());
                false
            }
        }
    }

    /// Run a cycle now, superseding any pending one.
    pub fn trigger(&mut self) {
        if self.limit_reached() {
            return;
        }
        self.queue.cancel();
        self.run_one();
    }

    /// Run the cycle that is due, if any. Returns whether one ran.
    pub fn poll(&mut self) -> bool {
        if self.limit_reached() {
            return false;
        }
        match self.queue.take_due() {
            Some(token) => {
                tracing::debug!("Running scheduled cycle {}", token.id());
                self.run_one();
                true
            }
            None => false,
        }
    }

    fn run_one(&mut self) {
        let report = self.engine.run_cycle();
        self.cycles_run += 1;

        if report.outcome.is_error() {
            tracing::warn!(
                "Cycle {} ended with {:?}, next action {:?}",
                self.cycles_run,
                report.outcome,
                report.next
            );
        }

        match report.next {
            NextAction::Continue => {
                let token = self.queue.next_token();
                self.queue.schedule(Duration::ZERO, token);
            }
            NextAction::RetryAfter(delay) => {
                let token = self.queue.next_token();
                self.queue.schedule(delay, token);
            }
            NextAction::Idle => {}
        }

        self.last_report = Some(report);
    }

    /// Process events and timers until stopped, disconnected or out of cycles.
    pub fn run(&mut self, events: &Receiver<RadioEvent>, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) && !self.limit_reached() {
            let timeout = self.queue.time_until_due().unwrap_or(IDLE_WAIT).min(IDLE_WAIT);

            match events.recv_timeout(timeout) {
                Ok(event) => {
                    if self.handle_event(event) == Control::Stop {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Radio event channel closed");
                    break;
                }
            }

            self.poll();
        }
    }
}

/// Events that start a cycle when duty cycling drives the uplink.
fn triggers_cycle(event: RadioEvent) -> bool {
    matches!(
        event,
        RadioEvent::Connected | RadioEvent::TxDone | RadioEvent::UplinkRequired
    ) || event.is_tx_failure()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timing::ManualClock;

    #[test]
    fn test_schedule_replaces_pending() {
        let clock = ManualClock::with_read_step(Duration::ZERO);
        let mut queue = EventQueue::new(clock.clone());

        let first = queue.next_token();
        queue.schedule(Duration::from_secs(3), first);
        let second = queue.next_token();
        queue.schedule(Duration::from_millis(1), second);

        assert_eq!(queue.pending(), Some(second));
        assert_eq!(queue.take_due(), None);

        clock.advance(Duration::from_millis(1));
        assert_eq!(queue.take_due(), Some(second));
        assert_eq!(queue.take_due(), None);
    }

    #[test]
    fn test_cancel_clears_pending() {
        let clock = ManualClock::with_read_step(Duration::ZERO);
        let mut queue = EventQueue::new(clock.clone());
        let token = queue.next_token();
        queue.schedule(Duration::ZERO, token);
        queue.cancel();
        assert_eq!(queue.take_due(), None);
        assert_eq!(queue.time_until_due(), None);
    }

    #[test]
    fn test_periodic_trigger() {
        let clock = ManualClock::with_read_step(Duration::ZERO);
        let mut queue = EventQueue::new(clock.clone());
        queue.call_every(Duration::from_secs(10));

        assert_eq!(queue.time_until_due(), Some(Duration::from_secs(10)));
        assert!(queue.take_due().is_none());

        clock.advance(Duration::from_secs(10));
        assert!(queue.take_due().is_some());
        assert_eq!(queue.time_until_due(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_cycle_triggering_events() {
        assert!(triggers_cycle(RadioEvent::Connected));
        assert!(triggers_cycle(RadioEvent::TxDone));
        assert!(triggers_cycle(RadioEvent::TxSchedulingError));
        assert!(triggers_cycle(RadioEvent::UplinkRequired));
        assert!(!triggers_cycle(RadioEvent::RxDone));
        assert!(!triggers_cycle(RadioEvent::JoinFailure));
        assert!(!triggers_cycle(RadioEvent::Disconnected));
    }

    #[test]
    fn test_periodic_trigger_skips_missed_periods() {
        let clock = ManualClock::with_read_step(Duration::ZERO);
        let mut queue = EventQueue::new(clock.clone());
        queue.call_every(Duration::from_secs(10));

        // A cycle overran three whole periods
        clock.advance(Duration::from_secs(35));
        assert!(queue.take_due().is_some());
        assert!(queue.take_due().is_none());
        assert_eq!(queue.time_until_due(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_time_until_due_prefers_earliest() {
        let clock = ManualClock::with_read_step(Duration::ZERO);
        let mut queue = EventQueue::new(clock);
        queue.call_every(Duration::from_secs(10));
        let token = queue.next_token();
        queue.schedule(Duration::from_secs(3), token);
        assert_eq!(queue.time_until_due(), Some(Duration::from_secs(3)));
        assert_eq!(queue.pending_delay(), Some(Duration::from_secs(3)));
    }
}
