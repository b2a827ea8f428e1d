//! Simulated LoRa-style radio with duty-cycle enforcement.
//!
//! After every uplink the channel stays closed for `airtime / duty_cycle`,
//! during which `send` fails with [`TxError::WouldBlock`]. Completion is
//! posted as [`RadioEvent::TxDone`] on the event channel, mirroring how a
//! real stack reports delivery after `send` has returned.

use crate::core::timing::Clock;
use crate::radio::types::{Downlink, MessageFlags, RadioEvent, TxError, Transmitter};
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::time::Duration;

/// Highest application port usable for uplinks.
const MAX_APP_PORT: u8 = 223;

/// Timing and size limits of the simulated link.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    /// Fraction of time the radio may transmit (0.01 = 1%)
    pub duty_cycle: f64,
    /// Largest accepted payload in bytes
    pub max_payload: usize,
    /// Fixed airtime per frame (preamble and header)
    pub frame_airtime: Duration,
    /// Additional airtime per payload byte
    pub byte_airtime: Duration,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            duty_cycle: 0.01,
            max_payload: 51,
            frame_airtime: Duration::from_millis(40),
            byte_airtime: Duration::from_millis(2),
        }
    }
}

impl RadioConfig {
    /// Airtime of a frame carrying `len` payload bytes.
    pub fn airtime(&self, len: usize) -> Duration {
        self.frame_airtime + self.byte_airtime * len as u32
    }

    /// Time the channel stays closed after a frame of `len` bytes.
    pub fn off_time(&self, len: usize) -> Duration {
        if self.duty_cycle <= 0.0 || self.duty_cycle >= 1.0 {
            return Duration::ZERO;
        }
        self.airtime(len).div_f64(self.duty_cycle)
    }
}

/// A frame accepted by the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uplink {
    pub port: u8,
    pub payload: Vec<u8>,
    pub flags: MessageFlags,
    /// Clock time at which the frame was queued
    pub queued_at: Duration,
}

/// In-process radio for development and tests.
#[derive(Debug)]
pub struct SimulatedRadio<C: Clock> {
    config: RadioConfig,
    clock: C,
    connected: bool,
    blocked_until: Duration,
    injected: VecDeque<TxError>,
    events: Option<Sender<RadioEvent>>,
    uplinks: Vec<Uplink>,
    downlinks: VecDeque<Downlink>,
    attempts: usize,
}

impl<C: Clock> SimulatedRadio<C> {
    pub fn new(config: RadioConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            connected: false,
            blocked_until: Duration::ZERO,
            injected: VecDeque::new(),
            events: None,
            uplinks: Vec::new(),
            downlinks: VecDeque::new(),
            attempts: 0,
        }
    }

    /// Post stack events to `sender`.
    pub fn with_events(mut self, sender: Sender<RadioEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Join the network and announce it with [`RadioEvent::Connected`].
    pub fn join(&mut self) {
        self.connected = true;
        self.post(RadioEvent::Connected);
    }

    /// Leave the network and announce it with [`RadioEvent::Disconnected`].
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.post(RadioEvent::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Fail the next `send` calls with these errors, in order.
    pub fn inject_errors(&mut self, errors: impl IntoIterator<Item = TxError>) {
        self.injected.extend(errors);
    }

    /// Close the channel for `duration` from now.
    pub fn block_for(&mut self, duration: Duration) {
        self.blocked_until = self.clock.now() + duration;
    }

    /// Frames accepted so far.
    pub fn uplinks(&self) -> &[Uplink] {
        &self.uplinks
    }

    /// Deliver a frame from the network and announce it with
    /// [`RadioEvent::RxDone`].
    pub fn queue_downlink(&mut self, port: u8, payload: &[u8], flags: MessageFlags) {
        self.downlinks.push_back(Downlink {
            port,
            payload: payload.to_vec(),
            flags,
        });
        self.post(RadioEvent::RxDone);
    }

    /// Number of `send` calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    fn post(&self, event: RadioEvent) {
        if let Some(ref sender) = self.events {
            if sender.try_send(event).is_err() {
                tracing::warn!("Radio event {:?} dropped", event);
            }
        }
    }
}

impl<C: Clock> Transmitter for SimulatedRadio<C> {
    fn send(&mut self, port: u8, payload: &[u8], flags: MessageFlags) -> Result<usize, TxError> {
        self.attempts += 1;

        if let Some(err) = self.injected.pop_front() {
            return Err(err);
        }
        if !self.connected {
            return Err(TxError::NotConnected);
        }
        if port == 0 || port > MAX_APP_PORT {
            return Err(TxError::PortInvalid(port));
        }
        if payload.len() > self.config.max_payload {
            return Err(TxError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload,
            });
        }

        let now = self.clock.now();
        if now < self.blocked_until {
            return Err(TxError::WouldBlock);
        }

        self.blocked_until = now + self.config.off_time(payload.len());
        self.uplinks.push(Uplink {
            port,
            payload: payload.to_vec(),
            flags,
            queued_at: now,
        });
        self.post(RadioEvent::TxDone);

        Ok(payload.len())
    }

    fn receive(&mut self) -> Result<Downlink, TxError> {
        if !self.connected {
            return Err(TxError::NotConnected);
        }
        self.downlinks.pop_front().ok_or(TxError::WouldBlock)
    }
}
