//! Offline controller training.
//!
//! - [`harness::TrainingHarness`]: the sequential episode loop with
//!   checkpoint-resume and held-out evaluation.
//! - [`reward`]: the accuracy-minus-deliberation-cost reward.
//! - [`metrics`]: the per-episode CSV log.

pub mod harness;
pub mod metrics;
pub mod reward;

#[cfg(test)]
mod scenarios;

pub use harness::{epsilon_for_episode, EvalReport, TrainError, TrainingHarness, TrainingSummary};
pub use metrics::{MetricsError, MetricsLog, MetricsRow};
pub use reward::{compute_reward, RewardOutcome};
