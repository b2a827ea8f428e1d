//! Accelerometer sample types.
//!
//! Readings arrive as raw `i16` sensor units and are scaled into physical
//! units by a fixed divisor before they enter the window buffer.

use serde::{Deserialize, Serialize};

/// One raw 3-axis reading as delivered by the accelerometer driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawReading {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawReading {
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Convert to physical units by dividing each axis by `divisor`.
    pub fn scale(self, divisor: f32) -> Sample {
        Sample {
            x: f32::from(self.x) / divisor,
            y: f32::from(self.y) / divisor,
            z: f32::from(self.z) / divisor,
        }
    }
}

impl From<(i16, i16, i16)> for RawReading {
    fn from((x, y, z): (i16, i16, i16)) -> Self {
        Self { x, y, z }
    }
}

/// A scaled 3-axis sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Sample {
    /// Number of axes per sample.
    pub const AXES: usize = 3;

    pub fn as_array(&self) -> [f32; Self::AXES] {
        [self.x, self.y, self.z]
    }
}

/// Errors raised by a sample source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The driver refused to initialize; carries the driver status code.
    InitFailed(i32),
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorError::InitFailed(code) => {
                write!(f, "Failed to initialize accelerometer (code {code})")
            }
        }
    }
}

impl std::error::Error for SensorError {}

/// Source of accelerometer readings.
///
/// `init` is called once before the first read. `read` is expected to return
/// immediately with the most recent reading.
pub trait SampleSource {
    fn init(&mut self) -> Result<(), SensorError>;

    fn read(&mut self) -> RawReading;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn init(&mut self) -> Result<(), SensorError> {
        (**self).init()
    }

    fn read(&mut self) -> RawReading {
        (**self).read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_reading_scaling() {
        let sample = RawReading::new(981, -250, 0).scale(100.0);
        assert!((sample.x - 9.81).abs() < 1e-4);
        assert!((sample.y + 2.5).abs() < 1e-4);
        assert_eq!(sample.z, 0.0);
    }

    #[test]
    fn test_sample_axes() {
        let sample = Sample {
            x: 3.0,
            y: 4.0,
            z: 0.0,
        };
        assert_eq!(sample.as_array(), [3.0, 4.0, 0.0]);
    }

    #[test]
    fn test_reading_from_tuple() {
        let reading: RawReading = (1, 2, 3).into();
        assert_eq!(reading, RawReading::new(1, 2, 3));
    }
}
