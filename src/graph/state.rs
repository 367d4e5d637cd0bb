//! Run state threaded through the deliberation graph.
//!
//! The state is a typed bag of fields with per-field merge rules: nodes never
//! mutate the state directly, they return a [`StateUpdate`] that the engine
//! folds in through [`RunState::apply`]. `reviews` and `dqn_trace` append;
//! the control scalars overwrite; `submission` is set once at construction
//! and carries no update field at all, so the graph cannot overwrite it.

use serde::Serialize;

use crate::controller::{Action, FEATURE_DIM};
use crate::critique::Critique;
use crate::subject::Subject;

/// One controller pass recorded for end-of-episode transition building.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// Encoded state the controller observed.
    pub state: [f64; FEATURE_DIM],
    /// Action it selected.
    pub action: Action,
}

/// Last-pass controller diagnostics, kept for logging and inspection.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    /// Round the controller observed (before incrementing).
    pub round: u32,
    pub features: [f64; FEATURE_DIM],
    pub q_values: [f64; 2],
    pub action: Action,
    pub epsilon: f64,
}

/// The shared per-episode state.
#[derive(Debug)]
pub struct RunState {
    /// The subject under evaluation. Write-once.
    pub submission: Subject,
    /// All critiques, in round order. Append-only.
    pub reviews: Vec<Critique>,
    /// Current round, starting at 1; incremented once per controller pass.
    pub current_round: u32,
    /// Last action the controller emitted.
    pub dqn_action: Option<Action>,
    /// Exploration rate for this episode; the controller falls back to a
    /// small default when absent.
    pub epsilon: Option<f64>,
    /// One entry per controller pass. Append-only.
    pub dqn_trace: Vec<TraceEntry>,
    /// Diagnostics from the most recent controller pass.
    pub dqn_debug_info: Option<DebugInfo>,
}

/// A node's contribution to the state, merged by [`RunState::apply`].
#[derive(Debug, Default)]
pub struct StateUpdate {
    /// Critiques to append.
    pub reviews: Vec<Critique>,
    /// New round counter, when the node advances it.
    pub current_round: Option<u32>,
    pub dqn_action: Option<Action>,
    /// Trace entries to append.
    pub dqn_trace: Vec<TraceEntry>,
    pub dqn_debug_info: Option<DebugInfo>,
}

impl RunState {
    /// Fresh state for one episode.
    pub fn new(submission: Subject, epsilon: Option<f64>) -> Self {
        Self {
            submission,
            reviews: Vec::new(),
            current_round: 1,
            dqn_action: None,
            epsilon,
            dqn_trace: Vec::new(),
            dqn_debug_info: None,
        }
    }

    /// Merges a node's update: appends to the list fields, overwrites the
    /// scalars that are present.
    pub fn apply(&mut self, update: StateUpdate) {
        self.reviews.extend(update.reviews);
        if let Some(round) = update.current_round {
            self.current_round = round;
        }
        if let Some(action) = update.dqn_action {
            self.dqn_action = Some(action);
        }
        self.dqn_trace.extend(update.dqn_trace);
        if let Some(info) = update.dqn_debug_info {
            self.dqn_debug_info = Some(info);
        }
    }

    /// The most recent completed round: the tail slice of `reviews` with
    /// length `role_count` (or the whole list if shorter).
    pub fn last_round(&self, role_count: usize) -> &[Critique] {
        let start = self.reviews.len().saturating_sub(role_count);
        &self.reviews[start..]
    }
}
