//! Simulated accelerometer.
//!
//! Produces a deterministic motion pattern so the engine can run on a host
//! without the board's accelerometer attached.

use crate::sensor::types::{RawReading, SampleSource, SensorError};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Raw units for 1 g at the default divisor of 100.
const ONE_G_RAW: f32 = 981.0;

/// Motion pattern produced by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionProfile {
    /// Device at rest, gravity on z only.
    Still,
    /// Slow periodic swing, roughly a walking cadence.
    Walk,
    /// Fast, large amplitude oscillation on all axes.
    Shake,
}

impl MotionProfile {
    /// Parse a profile name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "still" | "idle" => Some(Self::Still),
            "walk" => Some(Self::Walk),
            "shake" => Some(Self::Shake),
            _ => None,
        }
    }

    /// Amplitude in raw units and period in samples.
    fn shape(self) -> (f32, f32) {
        match self {
            MotionProfile::Still => (0.0, 1.0),
            MotionProfile::Walk => (250.0, 32.0),
            MotionProfile::Shake => (1400.0, 5.0),
        }
    }
}

impl std::fmt::Display for MotionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MotionProfile::Still => "still",
            MotionProfile::Walk => "walk",
            MotionProfile::Shake => "shake",
        };
        write!(f, "{name}")
    }
}

/// Deterministic accelerometer driven by a [`MotionProfile`].
#[derive(Debug)]
pub struct SimulatedAccelerometer {
    profile: MotionProfile,
    tick: u64,
    fail_init: Option<i32>,
}

impl SimulatedAccelerometer {
    pub fn new(profile: MotionProfile) -> Self {
        Self {
            profile,
            tick: 0,
            fail_init: None,
        }
    }

    /// Make every `init` call fail with the given driver code.
    pub fn failing_init(mut self, code: i32) -> Self {
        self.fail_init = Some(code);
        self
    }

    /// Switch the motion pattern; takes effect on the next read.
    pub fn set_profile(&mut self, profile: MotionProfile) {
        self.profile = profile;
    }
}

impl SampleSource for SimulatedAccelerometer {
    fn init(&mut self) -> Result<(), SensorError> {
        if let Some(code) = self.fail_init {
            return Err(SensorError::InitFailed(code));
        }
        Ok(())
    }

    fn read(&mut self) -> RawReading {
        let (amplitude, period) = self.profile.shape();
        let phase = (self.tick as f32 / period) * TAU;
        self.tick = self.tick.wrapping_add(1);

        let x = amplitude * phase.sin();
        let y = amplitude * 0.6 * (phase * 0.5).cos();
        let z = ONE_G_RAW + amplitude * 0.8 * (phase + 1.0).sin();

        RawReading::new(clamp_raw(x), clamp_raw(y), clamp_raw(z))
    }
}

fn clamp_raw(value: f32) -> i16 {
    value.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_still_profile_reads_gravity() {
        let mut sensor = SimulatedAccelerometer::new(MotionProfile::Still);
        sensor.init().unwrap();
        for _ in 0..10 {
            assert_eq!(sensor.read(), RawReading::new(0, 0, 981));
        }
    }

    #[test]
    fn test_failing_init() {
        let mut sensor = SimulatedAccelerometer::new(MotionProfile::Walk).failing_init(-3);
        assert_eq!(sensor.init(), Err(SensorError::InitFailed(-3)));
    }

    #[test]
    fn test_shake_moves_more_than_walk() {
        let spread = |profile| {
            let mut sensor = SimulatedAccelerometer::new(profile);
            let xs: Vec<i16> = (0..64).map(|_| sensor.read().x).collect();
            xs.iter().max().unwrap() - xs.iter().min().unwrap()
        };
        assert!(spread(MotionProfile::Shake) > spread(MotionProfile::Walk));
        assert!(spread(MotionProfile::Walk) > spread(MotionProfile::Still));
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!(MotionProfile::parse("Walk"), Some(MotionProfile::Walk));
        assert_eq!(MotionProfile::parse("idle"), Some(MotionProfile::Still));
        assert_eq!(MotionProfile::parse("run"), None);
    }
}
