//! End-of-episode reward.
//!
//! The reward trades scoring accuracy against deliberation cost:
//!
//! ```text
//! accuracy = max(0, 1 − 0.4 · |pred − truth|)
//! penalty  = 0.05 · (rounds_used − 1)
//! reward   = accuracy − penalty
//! ```
//!
//! where `pred` is the mean overall score of the final round's critiques and
//! `truth` the corpus ground truth on the same scale. An episode whose final
//! round produced no critiques earns the −1.0 error sentinel. The slope and
//! penalty constants are load-bearing for existing checkpoints.

use crate::graph::RunState;

/// Accuracy falloff per unit of absolute error.
const ERROR_SLOPE: f64 = 0.4;

/// Cost of each round beyond the first.
const ROUND_PENALTY: f64 = 0.05;

/// Reward assigned when the final round holds no critiques.
const EMPTY_PANEL_SENTINEL: f64 = -1.0;

/// Result of the reward computation.
#[derive(Debug, Clone, Copy)]
pub struct RewardOutcome {
    /// Reward credited to the episode's terminal transition.
    pub reward: f64,
    /// The panel's final predicted score (0.0 for the sentinel case).
    pub predicted: f64,
}

/// Computes the episode reward from the final run state.
///
/// `ground_truth` must already be normalized to the critique score scale.
pub fn compute_reward(final_state: &RunState, ground_truth: f64, role_count: usize) -> RewardOutcome {
    let last_round = final_state.last_round(role_count);
    if last_round.is_empty() {
        return RewardOutcome {
            reward: EMPTY_PANEL_SENTINEL,
            predicted: 0.0,
        };
    }

    let predicted =
        last_round.iter().map(|c| c.overall_score).sum::<f64>() / last_round.len() as f64;
    let error = (predicted - ground_truth).abs();
    let accuracy = (1.0 - ERROR_SLOPE * error).max(0.0);

    let rounds_used = final_state.current_round.saturating_sub(1).max(1);
    let penalty = ROUND_PENALTY * f64::from(rounds_used - 1);

    RewardOutcome {
        reward: accuracy - penalty,
        predicted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::tests::tiny_subject;
    use crate::critique::Critique;
    use crate::graph::{RunState, StateUpdate};

    fn state(scores: &[f64], current_round: u32) -> RunState {
        let mut state = RunState::new(tiny_subject(1), None);
        state.apply(StateUpdate {
            reviews: scores
                .iter()
                .map(|s| Critique {
                    role: "R".into(),
                    thought_process: String::new(),
                    scores: vec![],
                    overall_score: *s,
                    confidence: 0.9,
                })
                .collect(),
            current_round: Some(current_round),
            ..Default::default()
        });
        state
    }

    #[test]
    fn perfect_single_round_scores_exactly_one() {
        let s = state(&[3.0, 3.0, 3.0], 2);
        let outcome = compute_reward(&s, 3.0, 3);
        assert!((outcome.reward - 1.0).abs() < 1e-12);
        assert!((outcome.predicted - 3.0).abs() < 1e-12);
    }

    #[test]
    fn accuracy_term_hits_zero_at_large_error() {
        // error = 2.5 → accuracy exactly 0.
        let s = state(&[0.5, 0.5, 0.5], 2);
        let outcome = compute_reward(&s, 3.0, 3);
        assert!((outcome.reward - 0.0).abs() < 1e-12);

        // Beyond that, accuracy stays clamped at 0.
        let s = state(&[0.0, 0.0, 0.0], 2);
        let outcome = compute_reward(&s, 5.0, 3);
        assert_eq!(outcome.reward, 0.0);
    }

    #[test]
    fn each_extra_round_costs_five_hundredths() {
        let one_round = compute_reward(&state(&[3.0; 3], 2), 3.0, 3).reward;
        let three_rounds = compute_reward(&state(&[3.0; 3], 4), 3.0, 3).reward;
        assert!((one_round - three_rounds - 0.10).abs() < 1e-12);
    }

    #[test]
    fn empty_final_round_earns_the_sentinel() {
        let s = RunState::new(tiny_subject(1), None);
        let outcome = compute_reward(&s, 3.0, 3);
        assert_eq!(outcome.reward, EMPTY_PANEL_SENTINEL);
        assert_eq!(outcome.predicted, 0.0);
    }

    #[test]
    fn prediction_averages_only_the_final_round() {
        // Two rounds; the first must not contaminate the mean.
        let mut s = state(&[0.0, 0.0, 0.0], 2);
        s.apply(StateUpdate {
            reviews: state(&[4.0, 4.0, 4.0], 3).reviews,
            current_round: Some(3),
            ..Default::default()
        });
        let outcome = compute_reward(&s, 4.0, 3);
        assert!((outcome.predicted - 4.0).abs() < 1e-12);
        // rounds_used = 2 → one extra-round penalty.
        assert!((outcome.reward - 0.95).abs() < 1e-12);
    }

    #[test]
    fn reward_never_exceeds_one() {
        for gt in [0.0, 2.5, 5.0] {
            for score in [0.0, 2.5, 5.0] {
                let outcome = compute_reward(&state(&[score; 3], 2), gt, 3);
                assert!(outcome.reward <= 1.0 + 1e-12);
            }
        }
    }
}
