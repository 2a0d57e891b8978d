//! # Binary Bayes filter
//!
//! A per-cell occupancy belief stored as clamped log-odds. Evidence is
//! accumulated additively and the probability is read out through the
//! logistic function. Cells start at the minimum belief, so a map that has
//! never seen a hit contributes nothing to planning cost.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Probability floor of the belief; the ceiling is its complement.
pub const MIN_PROBABILITY: f32 = 0.1;
pub const MAX_PROBABILITY: f32 = 1.0 - MIN_PROBABILITY;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Log-odds occupancy belief, clamped so a long run of one-sided evidence
/// cannot saturate the cell beyond recovery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryBayesFilter {
    log_odds: f32,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Log-odds of a probability.
pub fn probability_to_log_odds(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}

/// Logistic readout of a log-odds value.
pub fn log_odds_to_probability(l: f32) -> f32 {
    1.0 / (1.0 + (-l).exp())
}

fn min_log_odds() -> f32 {
    probability_to_log_odds(MIN_PROBABILITY)
}

fn max_log_odds() -> f32 {
    probability_to_log_odds(MAX_PROBABILITY)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BinaryBayesFilter {
    /// A filter holding the minimum belief.
    pub fn new() -> Self {
        Self {
            log_odds: min_log_odds(),
        }
    }

    /// Accumulate one piece of evidence, given as log-odds.
    pub fn update(&mut self, evidence_log_odds: f32) {
        self.log_odds =
            (self.log_odds + evidence_log_odds).clamp(min_log_odds(), max_log_odds());
    }

    pub fn log_odds(&self) -> f32 {
        self.log_odds
    }

    pub fn probability(&self) -> f32 {
        log_odds_to_probability(self.log_odds)
    }

    /// Probability rescaled so the clamp range maps onto [0, 1]. A fresh
    /// cell reads 0, a fully believed obstacle reads 1.
    pub fn normalized(&self) -> f32 {
        (self.probability() - MIN_PROBABILITY) / (MAX_PROBABILITY - MIN_PROBABILITY)
    }
}

impl Default for BinaryBayesFilter {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prior() {
        let bbf = BinaryBayesFilter::new();
        assert!((bbf.probability() - MIN_PROBABILITY).abs() < 1e-6);
        assert!(bbf.normalized().abs() < 1e-6);
    }

    #[test]
    fn test_update_direction() {
        let hit = probability_to_log_odds(0.6);
        let miss = probability_to_log_odds(0.3);

        let mut bbf = BinaryBayesFilter::new();
        bbf.update(hit);
        assert!(bbf.probability() > MIN_PROBABILITY);

        let peak = bbf.probability();
        bbf.update(miss);
        bbf.update(miss);
        assert!(bbf.probability() < peak);
    }

    #[test]
    fn test_clamped() {
        let hit = probability_to_log_odds(0.8);
        let mut bbf = BinaryBayesFilter::new();
        for _ in 0..1000 {
            bbf.update(hit);
        }
        assert!(bbf.probability() <= MAX_PROBABILITY + 1e-6);

        let miss = probability_to_log_odds(0.2);
        for _ in 0..1000 {
            bbf.update(miss);
        }
        assert!(bbf.probability() >= MIN_PROBABILITY - 1e-6);
        assert!(bbf.log_odds() >= probability_to_log_odds(MIN_PROBABILITY) - 1e-6);
    }

    #[test]
    fn test_round_trip() {
        for p in [0.2f32, 0.5, 0.7] {
            let l = probability_to_log_odds(p);
            assert!((log_odds_to_probability(l) - p).abs() < 1e-5);
        }
    }

    #[test]
    fn test_evidence_applied_once_is_reversible() {
        let hit = probability_to_log_odds(0.7);
        let mut a = BinaryBayesFilter::new();
        a.update(hit);
        a.update(-hit);
        // One hit then its exact inverse lands back on the floor
        assert!((a.probability() - MIN_PROBABILITY).abs() < 1e-5);
    }
}
