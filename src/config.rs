//! Application configuration.
//!
//! A single YAML-backed configuration object covers the run mode, the panel
//! composition, deliberation limits, controller training hyperparameters, and
//! the mock-panel simulation parameters. Configuration problems are fatal at
//! startup and never raised from within an episode.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Whether evaluators call a real language model or the offline simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Production,
    MockTraining,
}

/// One panel role: a name plus its prompt template.
///
/// `{rubric_content}` inside the template is substituted with the set's
/// rubric text when the evaluator is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub system_prompt_template: String,
}

/// Limits shared by every episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Hard cutoff on debate rounds; the router forces termination beyond it.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Target score range critiques and ground truth are normalized to.
    #[serde(default = "default_score_range")]
    pub score_range: [f64; 2],
}

fn default_max_rounds() -> u32 {
    6
}

fn default_score_range() -> [f64; 2] {
    [0.0, 5.0]
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            score_range: default_score_range(),
        }
    }
}

/// Controller training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    /// Discount factor γ for the Bellman target.
    pub gamma: f64,
    /// Replay buffer capacity.
    pub buffer_size: usize,
    pub batch_size: usize,
    pub total_episodes: u64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    /// Exponential decay constant for the ε schedule.
    pub epsilon_decay: f64,
    /// Episodes to run before the first gradient update.
    #[serde(default)]
    pub warmup_steps: Option<u64>,
    /// Checkpoint cadence in episodes.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: u64,
}

fn default_checkpoint_every() -> u64 {
    10
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            gamma: 0.95,
            buffer_size: 5000,
            batch_size: 32,
            total_episodes: 500,
            epsilon_start: 1.0,
            epsilon_end: 0.05,
            epsilon_decay: 200.0,
            warmup_steps: None,
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

/// Mock-panel dynamics, used only in [`RunMode::MockTraining`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Probability that a debate round moves a role toward the ground truth.
    pub convergence_rate: f64,
    /// Standard deviation of the first-round guess.
    pub noise_level: f64,
    /// Fraction of the remaining error removed by a convergent step.
    pub convergence_speed: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            convergence_rate: 0.8,
            noise_level: 1.0,
            convergence_speed: 0.5,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub run_mode: RunMode,
    /// Ordered panel roles; order fixes the role set for every episode.
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub global_settings: GlobalSettings,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub simulation: Option<SimulationConfig>,
}

impl AppConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one agent role is required".into(),
            ));
        }
        let mut names: Vec<&str> = self.agents.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.agents.len() {
            return Err(ConfigError::Invalid("agent names must be unique".into()));
        }
        if self.global_settings.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be positive".into()));
        }
        let [lo, hi] = self.global_settings.score_range;
        if !(hi > lo) {
            return Err(ConfigError::Invalid(
                "score_range upper bound must exceed lower bound".into(),
            ));
        }
        let t = &self.training;
        if t.learning_rate <= 0.0 || !(0.0..=1.0).contains(&t.gamma) {
            return Err(ConfigError::Invalid(
                "learning_rate must be positive and gamma in [0, 1]".into(),
            ));
        }
        if t.buffer_size == 0 || t.batch_size == 0 || t.batch_size > t.buffer_size {
            return Err(ConfigError::Invalid(
                "batch_size must be positive and no larger than buffer_size".into(),
            ));
        }
        if t.epsilon_decay <= 0.0 {
            return Err(ConfigError::Invalid("epsilon_decay must be positive".into()));
        }
        if self.run_mode == RunMode::MockTraining && self.simulation.is_none() {
            return Err(ConfigError::Invalid(
                "mock_training mode requires a simulation section".into(),
            ));
        }
        Ok(())
    }

    /// The configured role names, in panel order.
    pub fn role_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    /// Upper bound of the target score range.
    pub fn target_max_score(&self) -> f64 {
        self.global_settings.score_range[1]
    }
}
