//! Evaluator construction and caching.
//!
//! The registry owns the mapping from `(set_id, role)` to a ready evaluator:
//! it loads the set's rubric, substitutes it into the role's prompt template,
//! and caches the result so each rubric file is read at most once per key.
//! In mock-training mode it hands out simulated evaluators keyed by role
//! only, bypassing rubric loading and the language-model backend entirely.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::warn;
use thiserror::Error;

use super::backend::LanguageModel;
use super::evaluator::Evaluator;
use super::mock::MockEvaluator;
use super::Evaluate;
use crate::config::{AgentConfig, AppConfig, RunMode, SimulationConfig};

/// Placeholder substituted for the rubric when the set's file is missing.
const RUBRIC_PLACEHOLDER: &str =
    "(No rubric is available for this set. Score using general expert judgment.)";

/// Template marker replaced by the rubric text.
const RUBRIC_MARKER: &str = "{rubric_content}";

/// Sampling temperature for production evaluators.
const EVALUATOR_TEMPERATURE: f64 = 0.0;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown role {0:?}")]
    UnknownRole(String),

    #[error("production mode requires a language-model backend")]
    MissingBackend,

    #[error("mock_training mode requires simulation parameters")]
    MissingSimulation,
}

enum Backing {
    /// Rubric-injected evaluators over a shared backend.
    Production(Arc<dyn LanguageModel>),
    /// Role-keyed deterministic simulators.
    Mock(SimulationConfig),
}

/// Cache + constructor for panel evaluators.
pub struct EvaluatorRegistry {
    agents: Vec<AgentConfig>,
    rubric_dir: PathBuf,
    backing: Backing,
    cache: Mutex<HashMap<(i64, String), Arc<Evaluator>>>,
    mocks: Mutex<HashMap<String, Arc<MockEvaluator>>>,
}

impl EvaluatorRegistry {
    /// Builds a registry for the configured run mode.
    ///
    /// `backend` is required in production mode and ignored in mock-training
    /// mode.
    pub fn new(
        config: &AppConfig,
        rubric_dir: impl Into<PathBuf>,
        backend: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self, RegistryError> {
        let backing = match config.run_mode {
            RunMode::Production => {
                Backing::Production(backend.ok_or(RegistryError::MissingBackend)?)
            }
            RunMode::MockTraining => {
                Backing::Mock(config.simulation.ok_or(RegistryError::MissingSimulation)?)
            }
        };
        Ok(Self {
            agents: config.agents.clone(),
            rubric_dir: rubric_dir.into(),
            backing,
            cache: Mutex::new(HashMap::new()),
            mocks: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the evaluator for `(set_id, role)`, constructing and caching
    /// it on first use.
    pub fn get(&self, set_id: i64, role: &str) -> Result<Arc<dyn Evaluate>, RegistryError> {
        let agent = self
            .agents
            .iter()
            .find(|a| a.name == role)
            .ok_or_else(|| RegistryError::UnknownRole(role.to_string()))?;

        match &self.backing {
            Backing::Mock(params) => {
                let mut mocks = self.mocks.lock().expect("mock cache lock");
                let entry = mocks
                    .entry(role.to_string())
                    .or_insert_with(|| Arc::new(MockEvaluator::new(role, *params, 0)))
                    .clone();
                Ok(entry)
            }
            Backing::Production(backend) => {
                let mut cache = self.cache.lock().expect("evaluator cache lock");
                let entry = cache
                    .entry((set_id, role.to_string()))
                    .or_insert_with(|| {
                        let rubric = self.load_rubric(set_id);
                        let system_prompt =
                            agent.system_prompt_template.replace(RUBRIC_MARKER, &rubric);
                        Arc::new(Evaluator::new(
                            role,
                            system_prompt,
                            EVALUATOR_TEMPERATURE,
                            backend.clone(),
                        ))
                    })
                    .clone();
                Ok(entry)
            }
        }
    }

    /// The full panel for a set, in configured role order.
    pub fn panel(&self, set_id: i64) -> Result<Vec<Arc<dyn Evaluate>>, RegistryError> {
        self.agents
            .iter()
            .map(|a| self.get(set_id, &a.name))
            .collect()
    }

    /// Reseeds every cached mock evaluator, deriving a distinct stream per
    /// role from `seed`. No-op in production mode.
    pub fn reseed_mocks(&self, seed: u64) {
        if let Backing::Mock(params) = &self.backing {
            let mut mocks = self.mocks.lock().expect("mock cache lock");
            for (idx, agent) in self.agents.iter().enumerate() {
                let role_seed = seed.wrapping_add(idx as u64);
                mocks
                    .entry(agent.name.clone())
                    .or_insert_with(|| Arc::new(MockEvaluator::new(&agent.name, *params, role_seed)))
                    .reseed(role_seed);
            }
        }
    }

    /// Reads `rubrics/set_<N>.md`, substituting a placeholder when the file
    /// is missing or unreadable. Rubric absence is recoverable and never
    /// fails an episode.
    fn load_rubric(&self, set_id: i64) -> String {
        let path = self.rubric_dir.join(format!("set_{set_id}.md"));
        match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    "rubric {} unavailable ({err}), using placeholder",
                    path.display()
                );
                RUBRIC_PLACEHOLDER.to_string()
            }
        }
    }
}
