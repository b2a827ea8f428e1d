//! Reduces a vote tally to a transmit decision.
//!
//! The top slot must hold strictly more votes than `floor(min_confidence * R)`
//! and must differ from the last slot that was actually sent.

use crate::core::aggregate::Tally;

/// Minimum vote count a slot must exceed, `floor(min_confidence * evaluated)`.
pub fn confidence_threshold(min_confidence: f64, evaluated: usize) -> u32 {
    let threshold = (min_confidence * evaluated as f64).floor();
    if threshold <= 0.0 {
        0
    } else {
        threshold as u32
    }
}

/// Slot with the greatest count; the first maximum in slot order wins ties.
pub fn top_slot(tally: &Tally) -> (usize, u8) {
    let mut top = (0, 0);
    for (slot, &count) in tally.counts().iter().enumerate() {
        if count > top.1 {
            top = (slot, count);
        }
    }
    top
}

/// Statistics computed from one tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub top_slot: usize,
    pub top_count: u8,
    pub confidence_threshold: u32,
    pub met_threshold: bool,
}

/// Outcome of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No slot is confident enough
    BelowThreshold(Evaluation),
    /// Same top slot as the last transmission
    Unchanged(Evaluation),
    /// New top slot; should be transmitted
    Transmit(Evaluation),
}

/// Threshold and change-detection filter, carrying the last sent slot.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    min_confidence: f64,
    last_top_slot: Option<usize>,
}

impl DecisionEngine {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence,
            last_top_slot: None,
        }
    }

    /// Slot of the last accepted transmission, if any.
    pub fn last_top_slot(&self) -> Option<usize> {
        self.last_top_slot
    }

    pub fn evaluate(&self, tally: &Tally, evaluated: usize) -> Evaluation {
        let threshold = confidence_threshold(self.min_confidence, evaluated);
        let (slot, count) = top_slot(tally);
        Evaluation {
            top_slot: slot,
            top_count: count,
            confidence_threshold: threshold,
            met_threshold: u32::from(count) > threshold,
        }
    }

    /// Apply the threshold, then the change filter.
    pub fn decide(&self, tally: &Tally, evaluated: usize) -> Decision {
        let evaluation = self.evaluate(tally, evaluated);
        if !evaluation.met_threshold {
            Decision::BelowThreshold(evaluation)
        } else if self.last_top_slot == Some(evaluation.top_slot) {
            Decision::Unchanged(evaluation)
        } else {
            Decision::Transmit(evaluation)
        }
    }

    /// Record that `slot` was accepted by the transmitter.
    pub fn commit(&mut self, slot: usize) {
        self.last_top_slot = Some(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(counts: &[u8]) -> Tally {
        Tally::from_counts(counts.to_vec()).unwrap()
    }

    #[test]
    fn test_confidence_threshold_floors() {
        assert_eq!(confidence_threshold(0.7, 5), 3);
        assert_eq!(confidence_threshold(0.7, 10), 7);
        assert_eq!(confidence_threshold(0.7, 21), 14);
        assert_eq!(confidence_threshold(0.7, 1), 0);
        assert_eq!(confidence_threshold(0.7, 0), 0);
    }

    #[test]
    fn test_top_slot_unique_maximum() {
        assert_eq!(top_slot(&tally(&[1, 0, 3, 0, 1])), (2, 3));
    }

    #[test]
    fn test_top_slot_tie_goes_to_lower_index() {
        assert_eq!(top_slot(&tally(&[0, 2, 0, 2, 0])), (1, 2));
        // Anomaly and uncertain compete as ordinary slots
        assert_eq!(top_slot(&tally(&[0, 0, 2, 2])), (2, 2));
        assert_eq!(top_slot(&tally(&[0, 0, 0, 0])), (0, 0));
    }

    #[test]
    fn test_threshold_is_strict() {
        let engine = DecisionEngine::new(0.7);
        let at = engine.evaluate(&tally(&[3, 0, 0, 2]), 5);
        assert_eq!(at.confidence_threshold, 3);
        assert!(!at.met_threshold);

        let above = engine.evaluate(&tally(&[4, 0, 0, 1]), 5);
        assert!(above.met_threshold);
    }

    #[test]
    fn test_decision_sequence() {
        let mut engine = DecisionEngine::new(0.7);
        let counts = tally(&[0, 0, 4, 0, 0, 1]);

        assert!(matches!(
            engine.decide(&counts, 5),
            Decision::Transmit(Evaluation { top_slot: 2, .. })
        ));

        // Not committed yet: still a transmit
        assert!(matches!(engine.decide(&counts, 5), Decision::Transmit(_)));

        engine.commit(2);
        assert!(matches!(engine.decide(&counts, 5), Decision::Unchanged(_)));

        let below = tally(&[0, 3, 0, 0, 0, 2]);
        assert!(matches!(engine.decide(&below, 5), Decision::BelowThreshold(_)));
        assert_eq!(engine.last_top_slot(), Some(2));
    }

    #[test]
    fn test_uncertain_can_be_transmitted() {
        let engine = DecisionEngine::new(0.7);
        let decision = engine.decide(&tally(&[1, 0, 0, 4]), 5);
        assert!(matches!(
            decision,
            Decision::Transmit(Evaluation { top_slot: 3, .. })
        ));
    }
}
