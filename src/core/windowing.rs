//! Fixed-capacity capture buffer and the timed sampling loop.
//!
//! A cycle captures one full buffer at a fixed sample interval, processes it,
//! and then resets the buffer in place for the next cycle. Samples are stored
//! interleaved (`x, y, z, x, y, z, ...`) so any run of consecutive samples is
//! a contiguous `f32` slice that can be handed to the classifier directly.

use crate::core::timing::{wait_until, Clock};
use crate::sensor::{RawReading, Sample, SampleSource};
use std::time::Duration;

/// Error returned when pushing into a full buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

impl std::fmt::Display for BufferFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Window buffer is full")
    }
}

impl std::error::Error for BufferFull {}

/// Capture buffer holding at most `capacity` samples.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    data: Vec<f32>,
    capacity: usize,
}

impl WindowBuffer {
    /// Allocate a buffer for `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity * Sample::AXES),
            capacity,
        }
    }

    /// Capacity in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.data.len() / Sample::AXES
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Append a sample. Fails once the buffer holds `capacity` samples.
    pub fn push(&mut self, sample: Sample) -> Result<(), BufferFull> {
        if self.is_full() {
            return Err(BufferFull);
        }
        self.data.extend_from_slice(&sample.as_array());
        Ok(())
    }

    /// Drop all samples, keeping the allocation.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Get the sample at `index`.
    pub fn sample(&self, index: usize) -> Option<Sample> {
        let start = index.checked_mul(Sample::AXES)?;
        let axes = self.data.get(start..start + Sample::AXES)?;
        Some(Sample {
            x: axes[0],
            y: axes[1],
            z: axes[2],
        })
    }

    /// Interleaved view of `len` samples starting at sample `start`.
    pub fn slice(&self, start: usize, len: usize) -> Option<&[f32]> {
        let from = start.checked_mul(Sample::AXES)?;
        let to = start.checked_add(len)?.checked_mul(Sample::AXES)?;
        self.data.get(from..to)
    }
}

/// Timing parameters for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTiming {
    /// Total capture duration
    pub duration: Duration,
    /// Time between consecutive samples
    pub sample_interval: Duration,
    /// Resolution of the coarse sleep
    pub sleep_granularity: Duration,
}

impl CaptureTiming {
    /// Number of samples a full capture takes.
    pub fn sample_count(&self) -> usize {
        sample_count(self.duration, self.sample_interval)
    }
}

/// Number of whole sample intervals in `duration`.
pub fn sample_count(duration: Duration, sample_interval: Duration) -> usize {
    let interval = sample_interval.as_nanos();
    if interval == 0 {
        return 0;
    }
    (duration.as_nanos() / interval) as usize
}

/// Fill `buffer` from `source`, one sample per interval.
///
/// The buffer is reset first. Each iteration fixes its deadline before the
/// read so the time spent reading counts against the interval. No wait
/// follows the final sample. Returns the number of samples captured.
pub fn fill_buffer<S, C>(
    source: &mut S,
    clock: &C,
    buffer: &mut WindowBuffer,
    timing: &CaptureTiming,
    axis_divisor: f32,
) -> usize
where
    S: SampleSource + ?Sized,
    C: Clock + ?Sized,
{
    buffer.reset();
    let target = timing.sample_count().min(buffer.capacity());

    while buffer.len() < target {
        let deadline = clock.now() + timing.sample_interval;

        let reading: RawReading = source.read();
        if buffer.push(reading.scale(axis_divisor)).is_err() || buffer.len() == target {
            break;
        }

        wait_until(clock, deadline, timing.sleep_granularity);
    }

    buffer.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timing::ManualClock;
    use crate::sensor::SensorError;

    struct Counter(i16);

    impl SampleSource for Counter {
        fn init(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn read(&mut self) -> RawReading {
            self.0 += 1;
            RawReading::new(self.0 * 100, 0, -self.0 * 100)
        }
    }

    fn sample(x: f32) -> Sample {
        Sample { x, y: 0.0, z: 0.0 }
    }

    #[test]
    fn test_buffer_capacity_enforced() {
        let mut buffer = WindowBuffer::with_capacity(2);
        assert!(buffer.push(sample(1.0)).is_ok());
        assert!(buffer.push(sample(2.0)).is_ok());
        assert!(buffer.is_full());
        assert_eq!(buffer.push(sample(3.0)), Err(BufferFull));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_buffer_reset_keeps_capacity() {
        let mut buffer = WindowBuffer::with_capacity(4);
        buffer.push(sample(1.0)).unwrap();
        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 4);
    }

    #[test]
    fn test_buffer_slices_are_interleaved() {
        let mut buffer = WindowBuffer::with_capacity(3);
        for i in 0..3 {
            buffer.push(sample(i as f32)).unwrap();
        }
        assert_eq!(buffer.slice(1, 2), Some(&[1.0, 0.0, 0.0, 2.0, 0.0, 0.0][..]));
        assert_eq!(buffer.slice(2, 2), None);
        assert_eq!(buffer.sample(2), Some(sample(2.0)));
        assert_eq!(buffer.sample(3), None);
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(
            sample_count(Duration::from_millis(4000), Duration::from_millis(16)),
            250
        );
        assert_eq!(sample_count(Duration::from_millis(10), Duration::ZERO), 0);
    }

    #[test]
    fn test_fill_buffer_paces_samples() {
        let clock = ManualClock::with_read_step(Duration::from_micros(20));
        let timing = CaptureTiming {
            duration: Duration::from_millis(160),
            sample_interval: Duration::from_millis(16),
            sleep_granularity: Duration::from_millis(1),
        };
        let mut buffer = WindowBuffer::with_capacity(timing.sample_count());
        let mut source = Counter(0);

        let captured = fill_buffer(&mut source, &clock, &mut buffer, &timing, 100.0);

        assert_eq!(captured, 10);
        assert!(buffer.is_full());
        assert_eq!(buffer.sample(0), Some(Sample { x: 1.0, y: 0.0, z: -1.0 }));
        assert_eq!(buffer.sample(9), Some(Sample { x: 10.0, y: 0.0, z: -10.0 }));

        // Nine waits between ten samples
        let elapsed = clock.peek();
        assert!(elapsed >= Duration::from_millis(16 * 9));
        assert!(elapsed < Duration::from_millis(16 * 10));
    }

    #[test]
    fn test_fill_buffer_resets_previous_cycle() {
        let clock = ManualClock::new();
        let timing = CaptureTiming {
            duration: Duration::from_millis(48),
            sample_interval: Duration::from_millis(16),
            sleep_granularity: Duration::from_millis(1),
        };
        let mut buffer = WindowBuffer::with_capacity(3);
        let mut source = Counter(0);

        fill_buffer(&mut source, &clock, &mut buffer, &timing, 100.0);
        fill_buffer(&mut source, &clock, &mut buffer, &timing, 100.0);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.sample(0).map(|s| s.x), Some(4.0));
    }
}
