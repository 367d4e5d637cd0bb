//! Deliberation graph execution.
//!
//! Drives one episode over the static topology: fan the subject out to every
//! role node, run the evaluators concurrently, gather their critiques at the
//! barrier, run the controller pass, then either loop back for another round
//! or terminate per the routing function.
//!
//! Role nodes are I/O-bound and share no mutable state with their siblings;
//! they run as concurrent futures joined at the barrier. The first failure
//! drops the remaining in-flight calls, and dropping the episode future from
//! the outside cancels the round the same way — in both cases no partial
//! results leak anywhere that outlives the episode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::try_join_all;
use log::{debug, info};
use thiserror::Error;

use super::state::{DebugInfo, RunState, StateUpdate, TraceEntry};
use super::topology::DeliberationTopology;
use crate::controller::{Action, DqnController, StateEncoder};
use crate::panel::{Evaluate, EvaluatorError};

/// Exploration rate used when the run state does not carry one.
const DEFAULT_EPSILON: f64 = 0.05;

/// Errors from graph construction or execution.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),

    #[error("panel does not match topology: {0}")]
    PanelMismatch(String),
}

/// Why an episode terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The controller chose *Submit*.
    Submitted,
    /// The round cutoff fired; logged as a forced termination.
    RoundLimit,
}

/// Where execution goes after a controller pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Loop back to the fan-out for another round.
    Fanout,
    /// Terminate the episode.
    End(Termination),
}

/// The routing function consulted immediately after the controller node.
///
/// Total over its inputs: the round cutoff wins over everything, then a
/// *Debate* action loops, and anything else submits.
pub fn route_after_decision(current_round: u32, action: Action, max_rounds: u32) -> Route {
    if current_round > max_rounds {
        return Route::End(Termination::RoundLimit);
    }
    match action {
        Action::Debate => Route::Fanout,
        Action::Submit => Route::End(Termination::Submitted),
    }
}

/// An executable deliberation graph: the topology plus one evaluator per role
/// node and the shared controller.
pub struct DeliberationGraph {
    topology: DeliberationTopology,
    evaluators: HashMap<String, Arc<dyn Evaluate>>,
    controller: Arc<Mutex<DqnController>>,
    encoder: StateEncoder,
    max_rounds: u32,
}

impl DeliberationGraph {
    /// Wires a panel onto the topology.
    ///
    /// Every topology role must have exactly one evaluator bound to it.
    pub fn new(
        topology: DeliberationTopology,
        panel: Vec<Arc<dyn Evaluate>>,
        controller: Arc<Mutex<DqnController>>,
        max_rounds: u32,
    ) -> Result<Self, GraphError> {
        let mut evaluators = HashMap::with_capacity(panel.len());
        for evaluator in panel {
            let role = evaluator.role().to_string();
            if !topology.has_role(&role) {
                return Err(GraphError::PanelMismatch(format!(
                    "evaluator role {role:?} has no node"
                )));
            }
            if evaluators.insert(role.clone(), evaluator).is_some() {
                return Err(GraphError::PanelMismatch(format!(
                    "duplicate evaluator for role {role:?}"
                )));
            }
        }
        if evaluators.len() != topology.role_count() {
            return Err(GraphError::PanelMismatch(format!(
                "{} evaluators for {} role nodes",
                evaluators.len(),
                topology.role_count()
            )));
        }
        Ok(Self {
            topology,
            evaluators,
            controller,
            encoder: StateEncoder,
            max_rounds,
        })
    }

    /// Runs one episode to completion, returning the final state.
    pub async fn run(&self, mut state: RunState) -> Result<RunState, GraphError> {
        let role_count = self.topology.role_count();
        loop {
            // Fan-out: snapshot the most recent completed round. Role nodes
            // see only this slice, never their peers' in-flight critiques.
            let snapshot: Vec<_> = state.last_round(role_count).to_vec();
            debug!(
                "round {} fan-out for {} ({} prior critiques passed)",
                state.current_round,
                state.submission.subject_id,
                snapshot.len()
            );

            let futures = self.topology.roles().into_iter().map(|role| {
                let evaluator = Arc::clone(&self.evaluators[role]);
                let submission = &state.submission;
                let snapshot = &snapshot;
                async move { evaluator.evaluate(submission, snapshot).await }
            });

            // Barrier: all role returns are gathered before any reducer runs.
            let critiques = try_join_all(futures).await?;
            state.apply(StateUpdate {
                reviews: critiques,
                ..Default::default()
            });

            debug_assert_eq!(
                state.reviews.len(),
                state.current_round as usize * role_count,
                "round barrier invariant"
            );

            let update = self.controller_pass(&state);
            state.apply(update);

            let action = state.dqn_action.unwrap_or(Action::Submit);
            match route_after_decision(state.current_round, action, self.max_rounds) {
                Route::Fanout => continue,
                Route::End(Termination::Submitted) => {
                    debug!("{}: consensus submitted", state.submission.subject_id);
                    break;
                }
                Route::End(Termination::RoundLimit) => {
                    info!(
                        "{}: round limit {} reached, forcing termination",
                        state.submission.subject_id, self.max_rounds
                    );
                    break;
                }
            }
        }
        Ok(state)
    }

    /// The controller node: encode the round, select an action, advance the
    /// round counter, record the trace entry and diagnostics. Never writes
    /// `reviews`.
    fn controller_pass(&self, state: &RunState) -> StateUpdate {
        let features = self
            .encoder
            .encode(state.last_round(self.topology.role_count()), state.current_round);
        let epsilon = state.epsilon.unwrap_or(DEFAULT_EPSILON);

        let mut controller = self.controller.lock().expect("controller lock");
        let q_values = controller.get_q_values(&features);
        let action = controller.select_action(&features, epsilon);
        drop(controller);

        debug!(
            "round {}: q={:?} action={:?} (ε={:.3})",
            state.current_round, q_values, action, epsilon
        );

        StateUpdate {
            reviews: Vec::new(),
            current_round: Some(state.current_round + 1),
            dqn_action: Some(action),
            dqn_trace: vec![TraceEntry {
                state: features,
                action,
            }],
            dqn_debug_info: Some(DebugInfo {
                round: state.current_round,
                features,
                q_values,
                action,
                epsilon,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::controller::ControllerConfig;
    use crate::critique::Critique;
    use crate::panel::MockEvaluator;
    use crate::subject::{Artifact, ArtifactKind, Subject, SubjectMetadata};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    fn subject(original_score: f64) -> Subject {
        Subject {
            subject_id: "Set1_ID1".into(),
            artifacts: vec![Artifact {
                kind: ArtifactKind::TextContent,
                content: "essay".into(),
                filename: "essay_set_1.txt".into(),
                description: None,
            }],
            reference_text: None,
            metadata: SubjectMetadata {
                set_id: 1,
                raw_max_score: 10.0,
                context: "prompt".into(),
                original_score,
                extra: BTreeMap::new(),
            },
        }
    }

    fn controller() -> Arc<Mutex<DqnController>> {
        Arc::new(Mutex::new(DqnController::new(
            ControllerConfig {
                learning_rate: 0.001,
                gamma: 0.95,
                buffer_size: 100,
            },
            42,
        )))
    }

    fn mock_panel(roles: &[&str], noise: f64, seed: u64) -> Vec<Arc<dyn Evaluate>> {
        let params = SimulationConfig {
            convergence_rate: 1.0,
            noise_level: noise,
            convergence_speed: 0.5,
        };
        roles
            .iter()
            .enumerate()
            .map(|(i, role)| {
                Arc::new(MockEvaluator::new(*role, params, seed + i as u64)) as Arc<dyn Evaluate>
            })
            .collect()
    }

    fn graph_for(panel: Vec<Arc<dyn Evaluate>>, max_rounds: u32) -> DeliberationGraph {
        let roles: Vec<String> = panel.iter().map(|e| e.role().to_string()).collect();
        let topology = DeliberationTopology::build(&roles);
        DeliberationGraph::new(topology, panel, controller(), max_rounds).unwrap()
    }

    /// Evaluator double that always errors, for abort-path tests.
    struct Failing(String);

    #[async_trait]
    impl Evaluate for Failing {
        fn role(&self) -> &str {
            &self.0
        }

        async fn evaluate(
            &self,
            _subject: &Subject,
            _previous: &[Critique],
        ) -> Result<Critique, EvaluatorError> {
            Err(EvaluatorError::Schema {
                role: self.0.clone(),
                field: "overall_score",
            })
        }
    }

    #[test]
    fn router_is_total_and_deterministic() {
        use Action::*;
        assert_eq!(route_after_decision(2, Debate, 6), Route::Fanout);
        assert_eq!(
            route_after_decision(2, Submit, 6),
            Route::End(Termination::Submitted)
        );
        // Cutoff wins regardless of action.
        assert_eq!(
            route_after_decision(7, Debate, 6),
            Route::End(Termination::RoundLimit)
        );
        assert_eq!(
            route_after_decision(7, Submit, 6),
            Route::End(Termination::RoundLimit)
        );
        // Boundary: round == max_rounds still routes on the action.
        assert_eq!(route_after_decision(6, Debate, 6), Route::Fanout);
    }

    #[tokio::test]
    async fn one_round_produces_one_critique_per_role() {
        let graph = graph_for(mock_panel(&["R1", "R2", "R3"], 0.0, 1), 6);
        // ε = 0 keeps the controller greedy; whatever it picks, the first
        // round's barrier invariant must hold in the final state.
        let state = RunState::new(subject(5.0), Some(0.0));
        let final_state = graph.run(state).await.unwrap();

        let role_count = 3;
        assert_eq!(final_state.reviews.len() % role_count, 0);
        let rounds_run = final_state.reviews.len() / role_count;
        assert_eq!(final_state.current_round as usize, rounds_run + 1);
        assert_eq!(final_state.dqn_trace.len(), rounds_run);
    }

    #[tokio::test]
    async fn round_limit_forces_termination() {
        // ε = 1.0 explores uniformly, so the controller may debate on every
        // pass; the cutoff must bound the episode no matter the draws.
        let max_rounds = 3;
        let graph = graph_for(mock_panel(&["R1", "R2", "R3"], 2.0, 2), max_rounds);
        let final_state = graph
            .run(RunState::new(subject(5.0), Some(1.0)))
            .await
            .unwrap();
        assert!(final_state.current_round <= max_rounds + 1);
        assert!(final_state.reviews.len() <= (max_rounds as usize) * 3);
        assert_eq!(
            final_state.reviews.len(),
            (final_state.current_round as usize - 1) * 3
        );
    }

    #[tokio::test]
    async fn every_critique_carries_a_configured_role() {
        let graph = graph_for(mock_panel(&["R1", "R2", "R3"], 1.0, 3), 6);
        let final_state = graph.run(RunState::new(subject(7.0), Some(0.5))).await.unwrap();
        for critique in &final_state.reviews {
            assert!(["R1", "R2", "R3"].contains(&critique.role.as_str()));
        }
        // Each round contains each role exactly once.
        for chunk in final_state.reviews.chunks(3) {
            let mut roles: Vec<&str> = chunk.iter().map(|c| c.role.as_str()).collect();
            roles.sort_unstable();
            assert_eq!(roles, vec!["R1", "R2", "R3"]);
        }
    }

    #[tokio::test]
    async fn evaluator_failure_aborts_the_episode() {
        let panel: Vec<Arc<dyn Evaluate>> = vec![
            Arc::new(MockEvaluator::new(
                "R1",
                SimulationConfig::default(),
                1,
            )),
            Arc::new(Failing("R2".into())),
            Arc::new(MockEvaluator::new(
                "R3",
                SimulationConfig::default(),
                3,
            )),
        ];
        let graph = graph_for(panel, 6);
        let err = graph
            .run(RunState::new(subject(5.0), Some(0.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Evaluator(_)));
    }

    #[tokio::test]
    async fn trace_grows_monotonically_with_rounds() {
        let graph = graph_for(mock_panel(&["R1", "R2"], 1.5, 4), 4);
        let final_state = graph.run(RunState::new(subject(3.0), Some(1.0))).await.unwrap();
        // Round-progress feature (index 4) is non-decreasing along the trace.
        let mut last = -1.0;
        for entry in &final_state.dqn_trace {
            assert!(entry.state[4] >= last);
            last = entry.state[4];
        }
        assert!(final_state.dqn_debug_info.is_some());
    }

    #[test]
    fn panel_mismatch_is_rejected() {
        let topology = DeliberationTopology::build(&["R1".to_string(), "R2".to_string()]);
        let panel = mock_panel(&["R1"], 1.0, 5);
        assert!(matches!(
            DeliberationGraph::new(topology, panel, controller(), 6),
            Err(GraphError::PanelMismatch(_))
        ));
    }
}
