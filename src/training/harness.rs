//! Offline training loop.
//!
//! Drives the deliberation graph over the labeled corpus, one episode at a
//! time: sample a subject from the training split, run the graph to
//! completion, compute the sparse end-of-episode reward, materialize one
//! transition per controller pass, take a gradient step, and periodically
//! checkpoint. Episodes are strictly sequential, so the controller's
//! parameters are never mutated concurrently.
//!
//! All per-episode randomness (subject sampling, mock panels, exploration) is
//! derived from `base_seed + episode`, so a run resumed from a checkpoint
//! replays the same episode stream as the uninterrupted run.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::metrics::{MetricsError, MetricsLog, MetricsRow};
use super::reward::compute_reward;
use crate::config::{AppConfig, TrainingConfig};
use crate::controller::{DqnController, Transition};
use crate::corpus::{CorpusLoader, Split};
use crate::graph::{DeliberationGraph, DeliberationTopology, GraphError, RunState};
use crate::panel::EvaluatorRegistry;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("training split is empty")]
    EmptySplit,
}

/// Exploration rate for episode `i`: exponential decay from `epsilon_start`
/// to `epsilon_end` with time constant `epsilon_decay`.
pub fn epsilon_for_episode(config: &TrainingConfig, episode: u64) -> f64 {
    config.epsilon_end
        + (config.epsilon_start - config.epsilon_end)
            * (-(episode as f64) / config.epsilon_decay).exp()
}

/// Aggregate results of a training run.
#[derive(Debug)]
pub struct TrainingSummary {
    /// One row per episode, in order (also written to the metrics log).
    pub rows: Vec<MetricsRow>,
    /// Episodes aborted by evaluator failure.
    pub failed_episodes: u64,
}

impl TrainingSummary {
    /// Mean reward over successful episodes.
    pub fn mean_reward(&self) -> f64 {
        let rewards: Vec<f64> = self.rows.iter().filter_map(|r| r.reward).collect();
        if rewards.is_empty() {
            return 0.0;
        }
        rewards.iter().sum::<f64>() / rewards.len() as f64
    }
}

/// Greedy held-out evaluation results.
#[derive(Debug)]
pub struct EvalReport {
    pub episodes: usize,
    pub mean_abs_error: f64,
    pub mean_rounds: f64,
}

/// The episode loop.
pub struct TrainingHarness {
    config: AppConfig,
    registry: Arc<EvaluatorRegistry>,
    controller: Arc<Mutex<DqnController>>,
    corpus: CorpusLoader,
    checkpoint_path: PathBuf,
    metrics: MetricsLog,
    base_seed: u64,
}

impl TrainingHarness {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        registry: Arc<EvaluatorRegistry>,
        controller: Arc<Mutex<DqnController>>,
        corpus: CorpusLoader,
        checkpoint_path: impl Into<PathBuf>,
        metrics: MetricsLog,
        base_seed: u64,
    ) -> Self {
        Self {
            config,
            registry,
            controller,
            corpus,
            checkpoint_path: checkpoint_path.into(),
            metrics,
            base_seed,
        }
    }

    /// Runs the configured number of training episodes, resuming from the
    /// checkpoint when one is readable.
    pub async fn train(&mut self) -> Result<TrainingSummary, TrainError> {
        let train_indices = self.corpus.split_indices(Split::Train);
        if train_indices.is_empty() {
            return Err(TrainError::EmptySplit);
        }

        let start_episode = self
            .controller
            .lock()
            .expect("controller lock")
            .load_or_fresh(&self.checkpoint_path);

        let training = self.config.training.clone();
        info!(
            "training episodes {}..{} (lr={}, γ={}, batch={})",
            start_episode, training.total_episodes, training.learning_rate, training.gamma,
            training.batch_size
        );

        let mut summary = TrainingSummary {
            rows: Vec::new(),
            failed_episodes: 0,
        };

        for episode in start_episode..training.total_episodes {
            let epsilon = epsilon_for_episode(&training, episode);
            let episode_seed = self.episode_seed(episode);

            // Per-episode reseeding keeps resumed runs on the same stream.
            let mut sample_rng = StdRng::seed_from_u64(episode_seed);
            self.registry.reseed_mocks(episode_seed ^ 0x5153_0fa5);
            self.controller
                .lock()
                .expect("controller lock")
                .reseed(episode_seed ^ 0x9e37_79b9);

            let index = train_indices[sample_rng.gen_range(0..train_indices.len())];
            let (subject, ground_truth) = self.corpus.subject(index);
            let set_id = subject.metadata.set_id;

            let row = match self.run_episode(subject, epsilon).await {
                Ok(final_state) => {
                    let role_count = self.config.agents.len();
                    let outcome = compute_reward(&final_state, ground_truth, role_count);
                    let loss = self.absorb_trajectory(&final_state, outcome.reward, episode);

                    MetricsRow {
                        episode,
                        reward: Some(outcome.reward),
                        loss,
                        rounds: final_state.current_round.saturating_sub(1),
                        epsilon,
                        gt: Some(ground_truth),
                        pred: Some(outcome.predicted),
                        note: String::new(),
                    }
                }
                Err(err) => {
                    warn!("episode {episode} (set {set_id}) aborted: {err}");
                    summary.failed_episodes += 1;
                    MetricsRow {
                        episode,
                        reward: None,
                        loss: None,
                        rounds: 0,
                        epsilon,
                        gt: Some(ground_truth),
                        pred: None,
                        note: "evaluator_error".into(),
                    }
                }
            };

            self.metrics.record(&row)?;
            summary.rows.push(row);

            if (episode + 1) % 10 == 0 {
                let last = summary.rows.last().expect("row just pushed");
                info!(
                    "ep {:04} | ε={:.2} | rounds={} | gt={:.1} pred={} | reward={}",
                    episode + 1,
                    epsilon,
                    last.rounds,
                    ground_truth,
                    last.pred.map_or("-".into(), |p| format!("{p:.1}")),
                    last.reward.map_or("-".into(), |r| format!("{r:.3}")),
                );
            }

            if (episode + 1) % training.checkpoint_every == 0 {
                self.save_checkpoint(episode);
            }
        }

        // Final checkpoint so a completed run is always resumable.
        if training.total_episodes > start_episode {
            self.save_checkpoint(training.total_episodes - 1);
        }
        Ok(summary)
    }

    /// Runs greedy (ε = 0) episodes over the held-out split.
    pub async fn evaluate(&self, episodes: usize) -> Result<EvalReport, TrainError> {
        let test_indices = self.corpus.split_indices(Split::Test);
        if test_indices.is_empty() {
            return Err(TrainError::EmptySplit);
        }

        let mut abs_errors = Vec::new();
        let mut rounds = Vec::new();
        for (i, index) in test_indices.iter().cycle().take(episodes).enumerate() {
            let eval_seed = self.episode_seed(u64::MAX - i as u64);
            self.registry.reseed_mocks(eval_seed);

            let (subject, ground_truth) = self.corpus.subject(*index);
            let final_state = match self.run_episode(subject, 0.0).await {
                Ok(state) => state,
                Err(err) => {
                    warn!("evaluation episode {i} aborted: {err}");
                    continue;
                }
            };
            let outcome = compute_reward(&final_state, ground_truth, self.config.agents.len());
            abs_errors.push((outcome.predicted - ground_truth).abs());
            rounds.push(f64::from(final_state.current_round.saturating_sub(1)));
        }

        let n = abs_errors.len().max(1) as f64;
        Ok(EvalReport {
            episodes: abs_errors.len(),
            mean_abs_error: abs_errors.iter().sum::<f64>() / n,
            mean_rounds: rounds.iter().sum::<f64>() / n,
        })
    }

    /// Builds the graph for one subject and runs it.
    async fn run_episode(
        &self,
        subject: crate::subject::Subject,
        epsilon: f64,
    ) -> Result<RunState, GraphError> {
        let roles = self.config.role_names();
        let panel = self
            .registry
            .panel(subject.metadata.set_id)
            .map_err(|e| GraphError::PanelMismatch(e.to_string()))?;
        let graph = DeliberationGraph::new(
            DeliberationTopology::build(&roles),
            panel,
            Arc::clone(&self.controller),
            self.config.global_settings.max_rounds,
        )?;
        graph.run(RunState::new(subject, Some(epsilon))).await
    }

    /// Materializes the episode's trajectory into replay transitions and
    /// takes one gradient step.
    ///
    /// The whole trajectory is buffered in run state and written here, after
    /// the episode completed: an aborted episode stores nothing. Only the
    /// last transition carries the reward.
    fn absorb_trajectory(
        &self,
        final_state: &RunState,
        reward: f64,
        episode: u64,
    ) -> Option<f64> {
        let trace = &final_state.dqn_trace;
        let mut controller = self.controller.lock().expect("controller lock");

        for (t, entry) in trace.iter().enumerate() {
            let is_last = t + 1 == trace.len();
            controller.store_transition(Transition {
                state: entry.state,
                action: entry.action.index(),
                reward: if is_last { reward } else { 0.0 },
                next_state: if is_last {
                    entry.state
                } else {
                    trace[t + 1].state
                },
                terminal: is_last,
            });
        }

        let past_warmup = self
            .config
            .training
            .warmup_steps
            .map_or(true, |warmup| episode >= warmup);
        if past_warmup {
            controller.update_policy(self.config.training.batch_size)
        } else {
            None
        }
    }

    fn save_checkpoint(&self, episode: u64) {
        let controller = self.controller.lock().expect("controller lock");
        // Write failures are logged and skipped; they never abort training.
        if let Err(err) = controller.save(&self.checkpoint_path, episode) {
            warn!("checkpoint write failed: {err}");
        }
    }

    /// Seed for all of episode `i`'s randomness.
    fn episode_seed(&self, episode: u64) -> u64 {
        self.base_seed
            .wrapping_add(episode.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }
}
