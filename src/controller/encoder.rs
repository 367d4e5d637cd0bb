//! State encoding for the deliberation controller.
//!
//! Maps the current round's critiques plus the round index to the fixed
//! six-feature vector the value network consumes. The normalization constants
//! are load-bearing for compatibility with existing checkpoints and must not
//! be changed.

use crate::critique::{Critique, SCORE_MAX};

/// Dimension of the encoded state vector.
pub const FEATURE_DIM: usize = 6;

/// Divisor for the round-progress feature.
const ROUND_HORIZON: f64 = 6.0;

/// Encodes panel statistics into the controller's state vector.
///
/// Feature layout:
///
/// | index | feature                 | range    |
/// |-------|-------------------------|----------|
/// | 0     | mean overall score / 5  | [0, 1]   |
/// | 1     | score variance / 5      | [0, 1.25]|
/// | 2     | min overall score / 5   | [0, 1]   |
/// | 3     | mean confidence         | [0, 1]   |
/// | 4     | min(round / 6, 1)       | [0, 1]   |
/// | 5     | reserved, always 0      | {0}      |
///
/// The variance divisor is 5 rather than the theoretical maximum 6.25 as an
/// intentional dispersion gain.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateEncoder;

impl StateEncoder {
    /// Encodes one round of critiques.
    ///
    /// `reviews` is the tail slice of the run state's review list with length
    /// equal to the role count; an empty slice encodes to the zero vector.
    /// Scores are clamped to `[0, 5]` and confidences to `[0, 1]` before any
    /// statistics, so the output is always finite and non-negative.
    pub fn encode(&self, reviews: &[Critique], current_round: u32) -> [f64; FEATURE_DIM] {
        if reviews.is_empty() {
            return [0.0; FEATURE_DIM];
        }

        let scores: Vec<f64> = reviews
            .iter()
            .map(|r| clamp_finite(r.overall_score, 0.0, SCORE_MAX))
            .collect();
        let confidences: Vec<f64> = reviews
            .iter()
            .map(|r| clamp_finite(r.confidence, 0.0, 1.0))
            .collect();

        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        let mean_confidence = confidences.iter().sum::<f64>() / n;
        let round_progress = (f64::from(current_round) / ROUND_HORIZON).min(1.0);

        [
            mean / SCORE_MAX,
            variance / SCORE_MAX,
            min / SCORE_MAX,
            mean_confidence,
            round_progress,
            0.0,
        ]
    }
}

/// Clamps to `[lo, hi]`, mapping NaN to `lo`.
fn clamp_finite(x: f64, lo: f64, hi: f64) -> f64 {
    if x.is_nan() {
        lo
    } else {
        x.clamp(lo, hi)
    }
}
