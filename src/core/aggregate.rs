//! Sliding sub-window classification and vote tallying.
//!
//! A full capture is cut into overlapping sub-windows of the classifier's
//! input length. Each sub-window casts exactly one vote: for the anomaly slot,
//! for the first confident category, or for the uncertain slot.

use crate::core::classifier::{
    signal_from_buffer, Classifier, ClassifierError, ClassifierOutput, SignalError,
};
use crate::core::windowing::WindowBuffer;
use serde::{Deserialize, Serialize};

/// Per-slot vote counts for one cycle.
///
/// Slots `0..K` are categories, slot `K` is anomaly and slot `K + 1` is
/// uncertain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    counts: Vec<u8>,
}

impl Tally {
    /// Empty tally for `label_count` categories.
    pub fn new(label_count: usize) -> Self {
        Self {
            counts: vec![0; label_count + 2],
        }
    }

    /// Rebuild a tally from raw slot counts. Needs at least the two extra slots.
    pub fn from_counts(counts: Vec<u8>) -> Option<Self> {
        if counts.len() < 2 {
            return None;
        }
        Some(Self { counts })
    }

    /// Number of categories (K).
    pub fn label_count(&self) -> usize {
        self.counts.len() - 2
    }

    pub fn anomaly_slot(&self) -> usize {
        self.label_count()
    }

    pub fn uncertain_slot(&self) -> usize {
        self.label_count() + 1
    }

    pub fn counts(&self) -> &[u8] {
        &self.counts
    }

    pub fn get(&self, slot: usize) -> u8 {
        self.counts.get(slot).copied().unwrap_or(0)
    }

    /// Sum of all slots; equals the number of votes cast.
    pub fn total(&self) -> u32 {
        self.counts.iter().map(|&c| u32::from(c)).sum()
    }

    /// Record one vote.
    pub fn record(&mut self, vote: Vote) {
        let slot = match vote {
            Vote::Category(ix) => ix,
            Vote::Anomaly => self.anomaly_slot(),
            Vote::Uncertain => self.uncertain_slot(),
        };
        if let Some(count) = self.counts.get_mut(slot) {
            *count = count.saturating_add(1);
        }
    }

    /// Display name of a slot.
    pub fn slot_name<'a>(&self, slot: usize, labels: &'a [String]) -> &'a str {
        if slot == self.anomaly_slot() {
            "anomaly"
        } else if slot == self.uncertain_slot() {
            "uncertain"
        } else {
            labels.get(slot).map(String::as_str).unwrap_or("?")
        }
    }

    /// Summary line such as `idle: 0, walk: 4, anomaly: 0, uncertain: 1`.
    pub fn describe(&self, labels: &[String]) -> String {
        self.counts
            .iter()
            .enumerate()
            .map(|(slot, count)| format!("{}: {}", self.slot_name(slot, labels), count))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The vote a single sub-window casts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Category(usize),
    Anomaly,
    Uncertain,
}

/// Thresholds for turning classifier scores into a vote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteRules {
    /// Minimum category score to win the sub-window
    pub min_confidence: f32,
    /// Minimum anomaly score to win the sub-window
    pub anomaly_threshold: f32,
}

impl Default for VoteRules {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            anomaly_threshold: 0.5,
        }
    }
}

impl VoteRules {
    /// Decide the vote for one sub-window.
    ///
    /// Anomaly beats everything. Otherwise the first category in index order
    /// at or above `min_confidence` wins, even if a later one scores higher.
    pub fn vote(&self, output: &ClassifierOutput) -> Vote {
        if let Some(anomaly) = output.anomaly {
            if anomaly >= self.anomaly_threshold {
                return Vote::Anomaly;
            }
        }

        output
            .scores
            .iter()
            .position(|&score| score >= self.min_confidence)
            .map_or(Vote::Uncertain, Vote::Category)
    }
}

/// Result of classifying every sub-window of one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub tally: Tally,
    /// Number of sub-windows evaluated (R)
    pub evaluated: usize,
}

/// Failure while classifying a sub-window. The cycle's tally is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    Signal { offset: usize, source: SignalError },
    Classifier { offset: usize, source: ClassifierError },
}

impl AggregationError {
    pub fn code(&self) -> i32 {
        match self {
            AggregationError::Signal { source, .. } => source.code(),
            AggregationError::Classifier { source, .. } => source.code(),
        }
    }

    /// Sample offset of the failing sub-window.
    pub fn offset(&self) -> usize {
        match self {
            AggregationError::Signal { offset, .. } | AggregationError::Classifier { offset, .. } => {
                *offset
            }
        }
    }
}

impl std::fmt::Display for AggregationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationError::Signal { offset, source } => {
                write!(f, "Sub-window at sample {offset}: {source}")
            }
            AggregationError::Classifier { offset, source } => {
                write!(f, "Sub-window at sample {offset}: {source}")
            }
        }
    }
}

impl std::error::Error for AggregationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AggregationError::Signal { source, .. } => Some(source),
            AggregationError::Classifier { source, .. } => Some(source),
        }
    }
}

/// Slides the classifier window over a capture.
#[derive(Debug, Clone)]
pub struct SubWindowAggregator {
    window_samples: usize,
    stride_samples: usize,
    rules: VoteRules,
}

impl SubWindowAggregator {
    pub fn new(window_samples: usize, stride_samples: usize, rules: VoteRules) -> Self {
        Self {
            window_samples,
            stride_samples: stride_samples.max(1),
            rules,
        }
    }

    /// Start offsets `0, S, 2S, ...` with `start + W <= captured`.
    pub fn offsets(&self, captured: usize) -> impl Iterator<Item = usize> {
        let last = captured.checked_sub(self.window_samples);
        (0..)
            .step_by(self.stride_samples)
            .take_while(move |start| last.map_or(false, |last| *start <= last))
    }

    /// Classify every sub-window of `buffer` and tally the votes.
    ///
    /// Stops at the first failure; no partial tally is returned.
    pub fn aggregate<C>(
        &self,
        buffer: &WindowBuffer,
        classifier: &mut C,
    ) -> Result<Aggregation, AggregationError>
    where
        C: Classifier + ?Sized,
    {
        let label_count = classifier.labels().len();
        let input_len = classifier.input_len();
        let mut tally = Tally::new(label_count);
        let mut evaluated = 0;

        for offset in self.offsets(buffer.len()) {
            let slice = buffer
                .slice(offset, self.window_samples)
                .unwrap_or_default();
            let signal = signal_from_buffer(slice, input_len)
                .map_err(|source| AggregationError::Signal { offset, source })?;

            let output = classifier
                .classify(&signal)
                .map_err(|source| AggregationError::Classifier { offset, source })?;

            if output.scores.len() != label_count {
                return Err(AggregationError::Classifier {
                    offset,
                    source: ClassifierError::InvalidOutput {
                        expected: label_count,
                        actual: output.scores.len(),
                    },
                });
            }

            tracing::debug!("{}", output.trace());

            tally.record(self.rules.vote(&output));
            evaluated += 1;
        }

        Ok(Aggregation { tally, evaluated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::Signal;
    use crate::sensor::Sample;

    /// Replays a fixed list of outputs, one per call.
    struct Scripted {
        labels: Vec<String>,
        input_len: usize,
        outputs: Vec<Result<ClassifierOutput, ClassifierError>>,
        calls: usize,
    }

    impl Scripted {
        fn new(label_count: usize, window: usize, outputs: Vec<Result<ClassifierOutput, ClassifierError>>) -> Self {
            Self {
                labels: (0..label_count).map(|i| format!("c{i}")).collect(),
                input_len: window * 3,
                outputs,
                calls: 0,
            }
        }
    }

    impl Classifier for Scripted {
        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn input_len(&self) -> usize {
            self.input_len
        }

        fn classify(&mut self, _signal: &Signal<'_>) -> Result<ClassifierOutput, ClassifierError> {
            let out = self.outputs[self.calls % self.outputs.len()].clone();
            self.calls += 1;
            out
        }
    }

    fn scores(values: &[f32]) -> ClassifierOutput {
        ClassifierOutput {
            scores: values.to_vec(),
            anomaly: None,
        }
    }

    fn full_buffer(samples: usize) -> WindowBuffer {
        let mut buffer = WindowBuffer::with_capacity(samples);
        for i in 0..samples {
            buffer
                .push(Sample {
                    x: i as f32,
                    y: 0.0,
                    z: 0.0,
                })
                .unwrap();
        }
        buffer
    }

    #[test]
    fn test_vote_first_confident_category_wins() {
        let rules = VoteRules::default();
        assert_eq!(rules.vote(&scores(&[0.1, 0.75, 0.95])), Vote::Category(1));
        assert_eq!(rules.vote(&scores(&[0.7, 0.3])), Vote::Category(0));
        assert_eq!(rules.vote(&scores(&[0.69, 0.69])), Vote::Uncertain);
    }

    #[test]
    fn test_vote_anomaly_takes_priority() {
        let rules = VoteRules::default();
        let output = ClassifierOutput {
            scores: vec![0.0, 0.0, 0.99],
            anomaly: Some(0.5),
        };
        assert_eq!(rules.vote(&output), Vote::Anomaly);

        let output = ClassifierOutput {
            scores: vec![0.0, 0.0, 0.99],
            anomaly: Some(0.49),
        };
        assert_eq!(rules.vote(&output), Vote::Category(2));
    }

    #[test]
    fn test_offsets_and_count() {
        let aggregator = SubWindowAggregator::new(4, 2, VoteRules::default());
        assert_eq!(aggregator.offsets(10).collect::<Vec<_>>(), vec![0, 2, 4, 6]);
        assert_eq!(aggregator.offsets(3).count(), 0);

        let aggregator = SubWindowAggregator::new(125, 6, VoteRules::default());
        assert_eq!(aggregator.offsets(250).count(), 21);
        assert_eq!(aggregator.offsets(250).last(), Some(120));
    }

    #[test]
    fn test_aggregate_four_of_five_scenario() {
        // 5 sub-windows: window 4, stride 1, 8 samples
        let confident = Ok(scores(&[0.1, 0.05, 0.75, 0.1]));
        let unsure = Ok(scores(&[0.3, 0.3, 0.3, 0.1]));
        let mut classifier = Scripted::new(
            4,
            4,
            vec![confident.clone(), confident.clone(), unsure, confident.clone(), confident],
        );
        let aggregator = SubWindowAggregator::new(4, 1, VoteRules::default());

        let result = aggregator.aggregate(&full_buffer(8), &mut classifier).unwrap();

        assert_eq!(result.evaluated, 5);
        assert_eq!(result.tally.counts(), &[0, 0, 4, 0, 0, 1]);
        assert_eq!(result.tally.total(), 5);
    }

    #[test]
    fn test_aggregate_aborts_on_classifier_error() {
        let mut classifier = Scripted::new(
            2,
            2,
            vec![Ok(scores(&[0.9, 0.1])), Err(ClassifierError::Inference(-5))],
        );
        let aggregator = SubWindowAggregator::new(2, 1, VoteRules::default());

        let err = aggregator
            .aggregate(&full_buffer(6), &mut classifier)
            .unwrap_err();
        assert_eq!(err.offset(), 1);
        assert_eq!(err.code(), -5);
        assert_eq!(classifier.calls, 2);
    }

    #[test]
    fn test_aggregate_rejects_mismatched_input_length() {
        let mut classifier = Scripted::new(2, 3, vec![Ok(scores(&[0.9, 0.1]))]);
        let aggregator = SubWindowAggregator::new(2, 1, VoteRules::default());

        let err = aggregator
            .aggregate(&full_buffer(6), &mut classifier)
            .unwrap_err();
        assert!(matches!(err, AggregationError::Signal { offset: 0, .. }));
        assert_eq!(classifier.calls, 0);
    }

    #[test]
    fn test_aggregate_rejects_wrong_score_count() {
        let mut classifier = Scripted::new(3, 2, vec![Ok(scores(&[0.9, 0.1]))]);
        let aggregator = SubWindowAggregator::new(2, 2, VoteRules::default());

        let err = aggregator
            .aggregate(&full_buffer(4), &mut classifier)
            .unwrap_err();
        assert_eq!(err.code(), -3);
    }

    #[test]
    fn test_tally_sum_matches_sub_windows() {
        let outputs = vec![
            Ok(scores(&[0.8, 0.1])),
            Ok(ClassifierOutput {
                scores: vec![0.1, 0.8],
                anomaly: Some(0.9),
            }),
            Ok(scores(&[0.2, 0.2])),
        ];
        for (samples, window, stride) in [(10, 3, 1), (20, 5, 3), (7, 7, 2), (9, 2, 4)] {
            let mut classifier = Scripted::new(2, window, outputs.clone());
            let aggregator = SubWindowAggregator::new(window, stride, VoteRules::default());
            let result = aggregator
                .aggregate(&full_buffer(samples), &mut classifier)
                .unwrap();
            assert_eq!(result.tally.total() as usize, result.evaluated);
            assert_eq!(result.evaluated, aggregator.offsets(samples).count());
        }
    }

    #[test]
    fn test_tally_describe() {
        let labels: Vec<String> = vec!["idle".into(), "walk".into()];
        let mut tally = Tally::new(2);
        tally.record(Vote::Category(1));
        tally.record(Vote::Uncertain);
        assert_eq!(tally.describe(&labels), "idle: 0, walk: 1, anomaly: 0, uncertain: 1");
    }
}
