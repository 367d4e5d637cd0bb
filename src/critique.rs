//! Evaluator output schema.
//!
//! A [`Critique`] is one evaluator's structured verdict for a subject in one
//! round: per-indicator scores, an overall score on the `[0, 5]` scale, a
//! confidence in `[0, 1]`, and the reasoning behind them. The schema is what
//! the language-model backend is constrained to produce.

use serde::{Deserialize, Serialize};

/// Overall scores live on this fixed scale.
pub const SCORE_MAX: f64 = 5.0;

/// One rubric indicator's score with its supporting evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreItem {
    pub indicator: String,
    pub score: f64,
    pub evidence: String,
    pub comment: String,
}

/// A single evaluator's structured output for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    /// The emitting evaluator's role. Forcibly overwritten with the bound
    /// role on receipt, so downstream consumers can trust it.
    pub role: String,
    pub thought_process: String,
    pub scores: Vec<ScoreItem>,
    /// Overall score in `[0, 5]`.
    pub overall_score: f64,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Critique {
    /// Checks the schema's numeric ranges.
    ///
    /// Returns the offending field name on violation. NaN fails both checks.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(0.0..=SCORE_MAX).contains(&self.overall_score) {
            return Err("overall_score");
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err("confidence");
        }
        Ok(())
    }
}
