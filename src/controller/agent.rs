//! The value-based deliberation controller.
//!
//! Wraps the policy network, a lagged target copy, the replay buffer, and the
//! Adam optimizer behind the small contract the graph and the training
//! harness use: ε-greedy action selection, transition storage, one-step
//! policy updates, and checkpoint I/O.

use std::fs;
use std::path::Path;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::encoder::FEATURE_DIM;
use super::network::{Gradients, ValueNetwork, ACTION_DIM};
use super::optim::Adam;
use super::replay::{ReplayBuffer, Transition};

/// Soft-update blend factor for the target network.
///
/// Load-bearing for compatibility with existing checkpoints.
const TAU: f64 = 0.01;

/// The controller's discrete action space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Accept the panel's current consensus and terminate the episode.
    Submit,
    /// Run another debate round.
    Debate,
}

impl Action {
    /// The network output index for this action.
    pub fn index(&self) -> usize {
        match self {
            Action::Submit => 0,
            Action::Debate => 1,
        }
    }

    /// Inverse of [`Action::index`]. Out-of-range indices map to `Submit`,
    /// matching the router's default.
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Action::Debate,
            _ => Action::Submit,
        }
    }
}

/// Errors from controller checkpoint I/O.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("checkpoint I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint serialization failed: {0}")]
    Codec(#[from] bincode::Error),

    #[error("checkpoint holds {found} parameters, expected {expected}")]
    ParameterMismatch { expected: usize, found: usize },
}

/// On-disk checkpoint payload.
#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    episode_index: u64,
    policy_params: Vec<f64>,
    optimizer_state: Adam,
}

/// Hyperparameters the controller needs from the training section.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub learning_rate: f64,
    pub gamma: f64,
    pub buffer_size: usize,
}

/// The ε-greedy DQN controller.
pub struct DqnController {
    policy: ValueNetwork,
    /// Lagged copy of `policy`, blended toward it after every optimizer step.
    target: ValueNetwork,
    optimizer: Adam,
    buffer: ReplayBuffer,
    gamma: f64,
    learning_rate: f64,
    rng: StdRng,
}

impl DqnController {
    /// Creates a controller with freshly initialized networks.
    ///
    /// The target network starts as a parameter-for-parameter copy of the
    /// policy network. `seed` drives weight initialization, exploration, and
    /// batch sampling.
    pub fn new(config: ControllerConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let policy = ValueNetwork::new(&mut rng);
        let target = policy.clone();
        let optimizer = Adam::new(config.learning_rate, ValueNetwork::param_count());
        Self {
            policy,
            target,
            optimizer,
            buffer: ReplayBuffer::new(config.buffer_size),
            gamma: config.gamma,
            learning_rate: config.learning_rate,
            rng,
        }
    }

    /// Pure forward pass: `[q_submit, q_debate]` for `state`.
    pub fn get_q_values(&self, state: &[f64; FEATURE_DIM]) -> [f64; ACTION_DIM] {
        self.policy.forward(state)
    }

    /// ε-greedy action selection.
    ///
    /// With probability `epsilon` picks uniformly from the action space;
    /// otherwise picks the argmax of the action values, breaking ties toward
    /// `Submit`.
    pub fn select_action(&mut self, state: &[f64; FEATURE_DIM], epsilon: f64) -> Action {
        if epsilon > 0.0 && self.rng.gen::<f64>() < epsilon {
            return Action::from_index(self.rng.gen_range(0..ACTION_DIM));
        }
        let q = self.policy.forward(state);
        let mut best = 0;
        for (i, value) in q.iter().enumerate().skip(1) {
            if *value > q[best] {
                best = i;
            }
        }
        Action::from_index(best)
    }

    /// Appends a transition to the replay buffer, evicting the oldest when
    /// capacity is reached.
    pub fn store_transition(&mut self, transition: Transition) {
        self.buffer.push(transition);
    }

    /// Performs one gradient step against the Bellman target.
    ///
    /// Returns `None` (no update) while the buffer holds fewer than
    /// `batch_size` transitions, otherwise the scalar MSE loss. After each
    /// optimizer step the target network is soft-updated toward the policy.
    pub fn update_policy(&mut self, batch_size: usize) -> Option<f64> {
        let batch: Vec<Transition> = self
            .buffer
            .sample_batch(batch_size, &mut self.rng)?
            .into_iter()
            .cloned()
            .collect();

        let mut grads = Gradients::zeros();
        let mut loss = 0.0;
        let scale = 1.0 / batch.len() as f64;

        for t in &batch {
            let trace = self.policy.forward_trace(&t.state);
            let current_q = trace.output[t.action];

            let next_q = self.target.forward(&t.next_state);
            let max_next_q = next_q.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let not_terminal = if t.terminal { 0.0 } else { 1.0 };
            let expected_q = t.reward + self.gamma * max_next_q * not_terminal;

            let diff = current_q - expected_q;
            loss += diff * diff * scale;

            let mut d_output = [0.0; ACTION_DIM];
            d_output[t.action] = 2.0 * diff * scale;
            self.policy.backward(&trace, &d_output, &mut grads);
        }

        let mut params = self.policy.params_flat();
        self.optimizer.step(&mut params, &grads);
        self.policy.set_params_flat(&params);
        self.target.soft_update_from(&self.policy, TAU);

        Some(loss)
    }

    /// Writes a checkpoint: episode index, policy parameters, optimizer
    /// state.
    pub fn save(&self, path: &Path, episode_index: u64) -> Result<(), ControllerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ControllerError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let checkpoint = Checkpoint {
            episode_index,
            policy_params: self.policy.params_flat(),
            optimizer_state: self.optimizer.clone(),
        };
        let blob = bincode::serialize(&checkpoint)?;
        fs::write(path, blob).map_err(|source| ControllerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!("checkpoint saved to {} (episode {})", path.display(), episode_index);
        Ok(())
    }

    /// Restores a checkpoint, loading the stored parameters into both the
    /// policy and the target network and resuming the optimizer state.
    ///
    /// Returns the stored episode index.
    pub fn load(&mut self, path: &Path) -> Result<u64, ControllerError> {
        let blob = fs::read(path).map_err(|source| ControllerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let checkpoint: Checkpoint = bincode::deserialize(&blob)?;
        let expected = ValueNetwork::param_count();
        if checkpoint.policy_params.len() != expected {
            return Err(ControllerError::ParameterMismatch {
                expected,
                found: checkpoint.policy_params.len(),
            });
        }
        self.policy.set_params_flat(&checkpoint.policy_params);
        self.target.set_params_flat(&checkpoint.policy_params);
        self.optimizer = checkpoint.optimizer_state;
        // The live config's learning rate wins over the checkpointed one.
        self.optimizer.set_learning_rate(self.learning_rate);
        info!(
            "checkpoint loaded from {} (episode {})",
            path.display(),
            checkpoint.episode_index
        );
        Ok(checkpoint.episode_index)
    }

    /// Attempts to resume from `path`; any failure degrades to a fresh start.
    ///
    /// Returns the episode index to resume from (0 when no usable checkpoint
    /// exists).
    pub fn load_or_fresh(&mut self, path: &Path) -> u64 {
        if !path.exists() {
            info!("no checkpoint at {}, starting fresh", path.display());
            return 0;
        }
        match self.load(path) {
            Ok(episode_index) => episode_index + 1,
            Err(err) => {
                warn!("checkpoint load failed ({err}), starting fresh");
                0
            }
        }
    }

    /// Reseeds exploration and batch sampling.
    ///
    /// The harness calls this at episode start so a resumed run replays the
    /// same exploration stream.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Number of transitions currently stored.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Target-network action values (used by tests and diagnostics).
    pub fn target_q_values(&self, state: &[f64; FEATURE_DIM]) -> [f64; ACTION_DIM] {
        self.target.forward(state)
    }

    /// Flat policy parameters (used by tests and diagnostics).
    pub fn policy_params(&self) -> Vec<f64> {
        self.policy.params_flat()
    }

    /// Overwrites policy and target parameters from a flat vector, as a
    /// checkpoint load does.
    pub fn set_policy_params(&mut self, params: &[f64]) {
        self.policy.set_params_flat(params);
        self.target.set_params_flat(params);
    }

    /// Flat target parameters (used by tests and diagnostics).
    pub fn target_params(&self) -> Vec<f64> {
        self.target.params_flat()
    }
}
