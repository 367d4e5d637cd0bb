//! Deterministic panel simulator for offline controller training.
//!
//! Emits scores that start as a noisy guess around the subject's ground truth
//! and, across debate rounds, either converge toward it or drift, per the
//! configured simulation parameters. No language model is involved, so whole
//! training runs are reproducible from a seed.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::{Evaluate, EvaluatorError};
use crate::config::SimulationConfig;
use crate::critique::{Critique, ScoreItem, SCORE_MAX};
use crate::subject::Subject;

/// A simulated panel member.
///
/// Round dynamics, given ground truth `gt` and this role's previous score
/// `s_prev`:
///
/// - first round: `gt + N(0, noise_level)`;
/// - debate round, with probability `convergence_rate`:
///   `s_prev + convergence_speed · (gt − s_prev) + N(0, 0.1)`;
/// - otherwise: `s_prev + N(0, 0.5 · noise_level)`.
///
/// Scores are clamped to `[0, 5]` and rounded to two decimals; confidence is
/// fixed at 0.9.
pub struct MockEvaluator {
    role_name: String,
    params: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl MockEvaluator {
    pub fn new(role_name: impl Into<String>, params: SimulationConfig, seed: u64) -> Self {
        Self {
            role_name: role_name.into(),
            params,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Resets the internal RNG.
    ///
    /// Called at episode start so the simulated panel's draws depend only on
    /// the episode seed, which keeps resumed runs bit-identical.
    pub fn reseed(&self, seed: u64) {
        *self.rng.lock().expect("mock rng lock") = StdRng::seed_from_u64(seed);
    }

    fn gaussian(rng: &mut StdRng, std_dev: f64) -> f64 {
        if std_dev <= 0.0 {
            return 0.0;
        }
        Normal::new(0.0, std_dev).expect("valid std dev").sample(rng)
    }
}

#[async_trait]
impl Evaluate for MockEvaluator {
    fn role(&self) -> &str {
        &self.role_name
    }

    async fn evaluate(
        &self,
        subject: &Subject,
        previous_reviews: &[Critique],
    ) -> Result<Critique, EvaluatorError> {
        let gt = subject.ground_truth(SCORE_MAX);
        let mut rng = self.rng.lock().expect("mock rng lock");

        let previous_own = previous_reviews
            .iter()
            .find(|r| r.role == self.role_name)
            .map(|r| r.overall_score);

        let score = match previous_own {
            // First round, or our own prior critique is missing: blind guess.
            None => gt + Self::gaussian(&mut rng, self.params.noise_level),
            Some(s_prev) => {
                if rng.gen::<f64>() < self.params.convergence_rate {
                    s_prev
                        + self.params.convergence_speed * (gt - s_prev)
                        + Self::gaussian(&mut rng, 0.1)
                } else {
                    s_prev + Self::gaussian(&mut rng, 0.5 * self.params.noise_level)
                }
            }
        };

        let score = (score.clamp(0.0, SCORE_MAX) * 100.0).round() / 100.0;

        Ok(Critique {
            role: self.role_name.clone(),
            thought_process: format!("[Mock] Simulation based on GT={gt:.2}"),
            scores: vec![ScoreItem {
                indicator: "Mock_Metric".into(),
                score,
                evidence: "N/A".into(),
                comment: "Simulated".into(),
            }],
            overall_score: score,
            confidence: 0.9,
        })
    }
}
