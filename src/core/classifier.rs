//! Classifier boundary.
//!
//! The engine treats the model as an opaque scoring function over a fixed
//! length slice of interleaved samples. [`MotionEnergyClassifier`] is a small
//! reference model used by the CLI and the tests.

use crate::sensor::Sample;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Read-only classifier input over a slice of the capture buffer.
#[derive(Debug, Clone, Copy)]
pub struct Signal<'a> {
    data: &'a [f32],
}

impl<'a> Signal<'a> {
    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Values of one axis (0 = x, 1 = y, 2 = z).
    pub fn axis(&self, axis: usize) -> impl Iterator<Item = f32> + 'a {
        self.data.iter().skip(axis).step_by(Sample::AXES).copied()
    }
}

/// The buffer slice does not have the length the classifier expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalError {
    pub expected: usize,
    pub actual: usize,
}

impl SignalError {
    /// Numeric code used in error reports.
    pub fn code(&self) -> i32 {
        -1
    }
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to convert buffer into signal: expected {} values, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for SignalError {}

/// Wrap `data` as classifier input, checking its length.
pub fn signal_from_buffer(data: &[f32], expected_len: usize) -> Result<Signal<'_>, SignalError> {
    if data.len() != expected_len {
        return Err(SignalError {
            expected: expected_len,
            actual: data.len(),
        });
    }
    Ok(Signal { data })
}

/// Scores produced for one sub-window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    /// One score per category, in label order
    pub scores: Vec<f32>,
    /// Anomaly score, present only when the model has anomaly detection
    pub anomaly: Option<f32>,
}

impl ClassifierOutput {
    /// Human-readable score trace: anomaly first when present, then categories.
    pub fn trace(&self) -> String {
        let mut out = String::from("[");
        if let Some(anomaly) = self.anomaly {
            out.push_str(&format!("{anomaly:.3}, "));
        }
        let scores: Vec<String> = self.scores.iter().map(|s| format!("{s:.5}")).collect();
        out.push_str(&scores.join(", "));
        out.push(']');
        out
    }
}

/// Errors raised by a classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    /// Input shape does not match the model
    InvalidInput { expected: usize, actual: usize },
    /// The model's output does not match its label count
    InvalidOutput { expected: usize, actual: usize },
    /// Inference failed inside the model
    Inference(i32),
}

impl ClassifierError {
    /// Numeric code used in error reports.
    pub fn code(&self) -> i32 {
        match self {
            ClassifierError::InvalidInput { .. } => -2,
            ClassifierError::InvalidOutput { .. } => -3,
            ClassifierError::Inference(code) => *code,
        }
    }
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::InvalidInput { expected, actual } => {
                write!(f, "Invalid classifier input: expected {expected} values, got {actual}")
            }
            ClassifierError::InvalidOutput { expected, actual } => {
                write!(f, "Invalid classifier output: expected {expected} scores, got {actual}")
            }
            ClassifierError::Inference(code) => write!(f, "Failed to run classifier ({code})"),
        }
    }
}

impl std::error::Error for ClassifierError {}

/// Opaque scoring model.
pub trait Classifier {
    /// Category names; their count is K.
    fn labels(&self) -> &[String];

    /// Number of interleaved values one invocation expects.
    fn input_len(&self) -> usize;

    fn classify(&mut self, signal: &Signal<'_>) -> Result<ClassifierOutput, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn labels(&self) -> &[String] {
        (**self).labels()
    }

    fn input_len(&self) -> usize {
        (**self).input_len()
    }

    fn classify(&mut self, signal: &Signal<'_>) -> Result<ClassifierOutput, ClassifierError> {
        (**self).classify(signal)
    }
}

/// Reference classifier scoring motion intensity.
///
/// The window's energy is the mean per-axis standard deviation. Each label
/// has an energy centre; scores are normalized Gaussian memberships around
/// those centres. With anomaly detection on, energy far from every centre
/// yields a high anomaly score.
#[derive(Debug, Clone)]
pub struct MotionEnergyClassifier {
    labels: Vec<String>,
    centres: Vec<f64>,
    width: f64,
    window_samples: usize,
    anomaly: bool,
}

impl MotionEnergyClassifier {
    /// Default energy centres for `idle`, `walk`, `shake`.
    pub const DEFAULT_CENTRES: [f64; 3] = [0.0, 1.5, 8.0];

    pub fn new(labels: Vec<String>, centres: Vec<f64>, window_samples: usize) -> Self {
        Self {
            labels,
            centres,
            width: 1.0,
            window_samples,
            anomaly: false,
        }
    }

    /// Classifier over `labels` with evenly spread default centres.
    pub fn for_labels(labels: &[String], window_samples: usize) -> Self {
        let centres = if labels.len() == Self::DEFAULT_CENTRES.len() {
            Self::DEFAULT_CENTRES.to_vec()
        } else {
            (0..labels.len()).map(|i| i as f64 * 2.0).collect()
        };
        Self::new(labels.to_vec(), centres, window_samples)
    }

    pub fn with_anomaly(mut self, enabled: bool) -> Self {
        self.anomaly = enabled;
        self
    }

    /// Mean per-axis standard deviation of the signal.
    pub fn energy(signal: &Signal<'_>) -> f64 {
        let deviations: Vec<f64> = (0..Sample::AXES)
            .map(|axis| {
                let values: Vec<f64> = signal.axis(axis).map(f64::from).collect();
                let sd = values.std_dev();
                if sd.is_nan() {
                    0.0
                } else {
                    sd
                }
            })
            .collect();
        deviations.mean()
    }
}

impl Classifier for MotionEnergyClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn input_len(&self) -> usize {
        self.window_samples * Sample::AXES
    }

    fn classify(&mut self, signal: &Signal<'_>) -> Result<ClassifierOutput, ClassifierError> {
        if signal.len() != self.input_len() {
            return Err(ClassifierError::InvalidInput {
                expected: self.input_len(),
                actual: signal.len(),
            });
        }

        let energy = Self::energy(signal);
        let memberships: Vec<f64> = self
            .centres
            .iter()
            .map(|c| (-((energy - c) / self.width).powi(2)).exp())
            .collect();
        let total: f64 = memberships.iter().sum();

        let scores: Vec<f32> = memberships
            .iter()
            .map(|m| if total > 0.0 { (m / total) as f32 } else { 0.0 })
            .collect();

        let anomaly = self.anomaly.then(|| {
            let nearest = self
                .centres
                .iter()
                .map(|c| (energy - c).abs())
                .fold(f64::INFINITY, f64::min);
            (1.0 - (-(nearest / (2.0 * self.width)).powi(2)).exp()) as f32
        });

        tracing::trace!(energy, "Motion energy computed");

        Ok(ClassifierOutput { scores, anomaly })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["idle", "walk", "shake"].iter().map(|s| s.to_string()).collect()
    }

    fn oscillating(samples: usize, amplitude: f32, period: f32) -> Vec<f32> {
        (0..samples)
            .flat_map(|i| {
                let v = amplitude * (i as f32 / period * std::f32::consts::TAU).sin();
                [v, v, 9.81 + v]
            })
            .collect()
    }

    #[test]
    fn test_signal_length_checked() {
        let data = vec![0.0; 9];
        assert!(signal_from_buffer(&data, 9).is_ok());
        assert_eq!(
            signal_from_buffer(&data, 12).unwrap_err(),
            SignalError {
                expected: 12,
                actual: 9
            }
        );
    }

    #[test]
    fn test_signal_axis_iteration() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let signal = signal_from_buffer(&data, 6).unwrap();
        assert_eq!(signal.axis(0).collect::<Vec<_>>(), vec![1.0, 4.0]);
        assert_eq!(signal.axis(2).collect::<Vec<_>>(), vec![3.0, 6.0]);
    }

    #[test]
    fn test_trace_format() {
        let output = ClassifierOutput {
            scores: vec![0.1, 0.75],
            anomaly: Some(0.25),
        };
        assert_eq!(output.trace(), "[0.250, 0.10000, 0.75000]");

        let output = ClassifierOutput {
            scores: vec![1.0],
            anomaly: None,
        };
        assert_eq!(output.trace(), "[1.00000]");
    }

    #[test]
    fn test_still_window_scores_idle() {
        let mut classifier = MotionEnergyClassifier::for_labels(&labels(), 50);
        let data = oscillating(50, 0.0, 10.0);
        let signal = signal_from_buffer(&data, 150).unwrap();
        let output = classifier.classify(&signal).unwrap();

        assert_eq!(output.scores.len(), 3);
        assert!(output.scores[0] >= 0.7);
        assert!(output.anomaly.is_none());
    }

    #[test]
    fn test_shaking_window_scores_shake() {
        let mut classifier = MotionEnergyClassifier::for_labels(&labels(), 100);
        let data = oscillating(100, 11.0, 5.0);
        let signal = signal_from_buffer(&data, 300).unwrap();
        let output = classifier.classify(&signal).unwrap();

        assert!(output.scores[2] >= 0.7);
        let sum: f32 = output.scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_extreme_energy_is_anomalous() {
        let mut classifier = MotionEnergyClassifier::for_labels(&labels(), 100).with_anomaly(true);
        let data = oscillating(100, 40.0, 5.0);
        let signal = signal_from_buffer(&data, 300).unwrap();
        let output = classifier.classify(&signal).unwrap();

        assert!(output.anomaly.unwrap() >= 0.5);
    }

    #[test]
    fn test_wrong_input_length_rejected() {
        let mut classifier = MotionEnergyClassifier::for_labels(&labels(), 10);
        let data = vec![0.0; 9];
        let signal = signal_from_buffer(&data, 9).unwrap();
        let err = classifier.classify(&signal).unwrap_err();
        assert_eq!(
            err,
            ClassifierError::InvalidInput {
                expected: 30,
                actual: 9
            }
        );
        assert_eq!(err.code(), -2);
    }
}
