//! End-to-end deliberation scenarios.
//!
//! Drives the full graph with scripted three-role panels and hand-pinned
//! policies, checking the episode-level contracts: immediate submission,
//! debate that improves the panel, the round cutoff, failure handling, and
//! checkpoint resume.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::tests::mock_config;
use crate::config::RunMode;
use crate::controller::network::{ACTION_DIM, HIDDEN_DIM, STATE_DIM};
use crate::controller::{ControllerConfig, DqnController, ValueNetwork};
use crate::corpus::tests::tiny_subject;
use crate::corpus::CorpusLoader;
use crate::critique::Critique;
use crate::graph::{DeliberationGraph, DeliberationTopology, RunState};
use crate::panel::{
    BackendError, Evaluate, EvaluatorError, EvaluatorRegistry, LanguageModel,
};
use crate::subject::Subject;
use crate::training::metrics::MetricsLog;
use crate::training::reward::compute_reward;
use crate::training::TrainingHarness;

/// Panel member that replays a fixed score per round, repeating the last
/// entry once the script runs out.
struct Scripted {
    role: String,
    rounds: Vec<f64>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(role: &str, rounds: &[f64]) -> Arc<Self> {
        Arc::new(Self {
            role: role.into(),
            rounds: rounds.to_vec(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Evaluate for Scripted {
    fn role(&self) -> &str {
        &self.role
    }

    async fn evaluate(
        &self,
        _subject: &Subject,
        _previous: &[Critique],
    ) -> Result<Critique, EvaluatorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let score = self.rounds[call.min(self.rounds.len() - 1)];
        Ok(Critique {
            role: self.role.clone(),
            thought_process: format!("scripted round {call}"),
            scores: vec![],
            overall_score: score,
            confidence: 0.9,
        })
    }
}

fn controller(buffer_size: usize) -> Arc<Mutex<DqnController>> {
    Arc::new(Mutex::new(DqnController::new(
        ControllerConfig {
            learning_rate: 0.001,
            gamma: 0.95,
            buffer_size,
        },
        42,
    )))
}

/// Flat-parameter offsets for hand-built policies.
const L1_W: usize = 0;
const L1_B: usize = L1_W + STATE_DIM * HIDDEN_DIM;
const L2_W: usize = L1_B + HIDDEN_DIM;
const L2_B: usize = L2_W + HIDDEN_DIM * HIDDEN_DIM;
const L3_W: usize = L2_B + HIDDEN_DIM;
const L3_B: usize = L3_W + HIDDEN_DIM * ACTION_DIM;

/// Pins the policy to constant action values via the output biases.
fn pin_constant_policy(ctrl: &Arc<Mutex<DqnController>>, q_submit: f64, q_debate: f64) {
    let mut params = vec![0.0; ValueNetwork::param_count()];
    params[L3_B] = q_submit;
    params[L3_B + 1] = q_debate;
    ctrl.lock().unwrap().set_policy_params(&params);
}

/// Pins a policy whose debate value equals the encoded variance feature and
/// whose submit value is the constant `threshold`: the controller debates
/// exactly while panel dispersion exceeds it.
fn pin_dispersion_policy(ctrl: &Arc<Mutex<DqnController>>, threshold: f64) {
    let mut params = vec![0.0; ValueNetwork::param_count()];
    // Chain feature[1] through hidden unit 0 of both layers into q_debate.
    params[L1_W + 1] = 1.0;
    params[L2_W] = 1.0;
    params[L3_W + HIDDEN_DIM] = 1.0;
    params[L3_B] = threshold;
    ctrl.lock().unwrap().set_policy_params(&params);
}

fn graph(
    panel: Vec<Arc<dyn Evaluate>>,
    ctrl: Arc<Mutex<DqnController>>,
    max_rounds: u32,
) -> DeliberationGraph {
    let roles: Vec<String> = panel.iter().map(|e| e.role().to_string()).collect();
    DeliberationGraph::new(DeliberationTopology::build(&roles), panel, ctrl, max_rounds).unwrap()
}

/// Subject whose ground truth on the 5-point scale is `gt`.
fn subject_with_gt(gt: f64) -> Subject {
    let mut subject = tiny_subject(1);
    subject.metadata.raw_max_score = 5.0;
    subject.metadata.original_score = gt;
    subject
}

#[tokio::test]
async fn immediate_submit_ends_after_one_round() {
    let ctrl = controller(100);
    pin_constant_policy(&ctrl, 1.0, 0.0);

    let panel: Vec<Arc<dyn Evaluate>> = vec![
        Scripted::new("R1", &[3.0]),
        Scripted::new("R2", &[3.01]),
        Scripted::new("R3", &[2.99]),
    ];
    let graph = graph(panel, ctrl, 6);
    let final_state = graph
        .run(RunState::new(subject_with_gt(3.0), Some(0.0)))
        .await
        .unwrap();

    assert_eq!(final_state.current_round, 2);
    assert_eq!(final_state.reviews.len(), 3);
    assert_eq!(final_state.dqn_trace.len(), 1);

    let outcome = compute_reward(&final_state, 3.0, 3);
    assert!((outcome.reward - 1.0).abs() < 1e-9, "reward {}", outcome.reward);
}

#[tokio::test]
async fn one_debate_round_improves_the_panel() {
    let ctrl = controller(100);
    // Round 1 scores {2.5, 3.0, 2.8}: variance/5 ≈ 0.0084; round 2 scores
    // {3.9, 4.0, 4.1}: variance/5 ≈ 0.0013. A threshold between the two makes
    // the controller debate once, then submit.
    pin_dispersion_policy(&ctrl, 0.005);

    let panel: Vec<Arc<dyn Evaluate>> = vec![
        Scripted::new("R1", &[2.5, 3.9]),
        Scripted::new("R2", &[3.0, 4.0]),
        Scripted::new("R3", &[2.8, 4.1]),
    ];
    let graph = graph(panel, ctrl, 6);
    let final_state = graph
        .run(RunState::new(subject_with_gt(4.0), Some(0.0)))
        .await
        .unwrap();

    assert_eq!(final_state.current_round, 3);
    assert_eq!(final_state.reviews.len(), 6);
    assert_eq!(final_state.dqn_trace.len(), 2);

    let outcome = compute_reward(&final_state, 4.0, 3);
    // mean(3.9, 4.0, 4.1) = 4.0 exactly: accuracy 1.0, one extra round.
    assert!((outcome.reward - 0.95).abs() < 1e-9, "reward {}", outcome.reward);
    assert!((outcome.predicted - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn round_cutoff_forces_submission_of_a_stubborn_panel() {
    let max_rounds = 6;
    let ctrl = controller(100);
    pin_constant_policy(&ctrl, 0.0, 1.0);

    // Persistent dispersion; the controller would debate forever.
    let panel: Vec<Arc<dyn Evaluate>> = vec![
        Scripted::new("R1", &[1.0]),
        Scripted::new("R2", &[3.0]),
        Scripted::new("R3", &[5.0]),
    ];
    let graph = graph(panel, ctrl, max_rounds);
    let final_state = graph
        .run(RunState::new(subject_with_gt(3.0), Some(0.0)))
        .await
        .unwrap();

    assert_eq!(final_state.reviews.len(), max_rounds as usize * 3);
    assert_eq!(final_state.current_round, max_rounds + 1);
    assert_eq!(final_state.dqn_trace.len(), max_rounds as usize);
}

#[tokio::test]
async fn trajectory_materializes_into_sparse_reward_transitions() {
    use crate::controller::Transition;

    let ctrl = controller(100);
    pin_dispersion_policy(&ctrl, 0.005);

    let panel: Vec<Arc<dyn Evaluate>> = vec![
        Scripted::new("R1", &[2.5, 3.9]),
        Scripted::new("R2", &[3.0, 4.0]),
        Scripted::new("R3", &[2.8, 4.1]),
    ];
    let graph = graph(panel, Arc::clone(&ctrl), 6);
    let final_state = graph
        .run(RunState::new(subject_with_gt(4.0), Some(0.0)))
        .await
        .unwrap();

    let trace = &final_state.dqn_trace;
    assert_eq!(trace.len(), final_state.current_round as usize - 1);

    // Materialize transitions exactly the way the harness does.
    let reward = compute_reward(&final_state, 4.0, 3).reward;
    let transitions: Vec<Transition> = trace
        .iter()
        .enumerate()
        .map(|(t, entry)| {
            let is_last = t + 1 == trace.len();
            Transition {
                state: entry.state,
                action: entry.action.index(),
                reward: if is_last { reward } else { 0.0 },
                next_state: if is_last { entry.state } else { trace[t + 1].state },
                terminal: is_last,
            }
        })
        .collect();

    assert_eq!(transitions.len(), trace.len());
    let terminals: Vec<usize> = transitions
        .iter()
        .enumerate()
        .filter(|(_, tr)| tr.terminal)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(terminals, vec![transitions.len() - 1]);

    // The reward is sparse: zero everywhere except the terminal step.
    for tr in &transitions[..transitions.len() - 1] {
        assert_eq!(tr.reward, 0.0);
    }
    assert!((transitions.last().unwrap().reward - 0.95).abs() < 1e-9);

    // Non-terminal steps chain into the next observed state.
    for (t, tr) in transitions[..transitions.len() - 1].iter().enumerate() {
        assert_eq!(tr.next_state, trace[t + 1].state);
    }
}

/// Backend that always fails, for the abort path.
struct DeadBackend;

#[async_trait]
impl LanguageModel for DeadBackend {
    async fn invoke(
        &self,
        _system: &str,
        _user: &str,
        _temperature: f64,
    ) -> Result<Critique, BackendError> {
        Err(BackendError::Call("connection refused".into()))
    }
}

fn write_tiny_corpus(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let tsv = dir.join("corpus.tsv");
    let meta = dir.join("context.json");
    let mut body = String::from("essay_id\tessay_set\tessay\tdomain1_score\n");
    for i in 0..10 {
        body.push_str(&format!("{i}\t1\tEssay number {i} about computers.\t{}\n", i % 6));
    }
    std::fs::write(&tsv, body).unwrap();
    std::fs::write(
        &meta,
        r#"{"score_ranges": {"1": 5}, "prompts": {"1": "Computers."}}"#,
    )
    .unwrap();
    (tsv, meta)
}

#[tokio::test]
async fn evaluator_failure_leaves_buffer_untouched_and_logs_a_row() {
    let dir = tempfile::tempdir().unwrap();
    let (tsv, meta) = write_tiny_corpus(dir.path());

    let mut config = mock_config(&["R1", "R2", "R3"]);
    config.run_mode = RunMode::Production;
    config.simulation = None;
    config.training.total_episodes = 3;

    let registry = Arc::new(
        EvaluatorRegistry::new(&config, dir.path().join("rubrics"), Some(Arc::new(DeadBackend)))
            .unwrap(),
    );
    let ctrl = controller(100);
    let corpus = CorpusLoader::load(&tsv, &meta, 5.0).unwrap();
    let metrics = MetricsLog::create(&dir.path().join("metrics.csv")).unwrap();

    let mut harness = TrainingHarness::new(
        config,
        registry,
        Arc::clone(&ctrl),
        corpus,
        dir.path().join("ckpt.bin"),
        metrics,
        7,
    );
    let summary = harness.train().await.unwrap();

    assert_eq!(summary.failed_episodes, 3);
    assert_eq!(ctrl.lock().unwrap().buffer_len(), 0);
    for row in &summary.rows {
        assert!(row.reward.is_none());
        assert_eq!(row.note, "evaluator_error");
        assert_eq!(row.rounds, 0);
    }

    let log_text = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
    assert!(log_text.contains("evaluator_error"));
}

async fn run_mock_training(
    dir: &Path,
    tag: &str,
    total_episodes: u64,
    resume: bool,
) -> crate::training::TrainingSummary {
    let (tsv, meta) = write_tiny_corpus(dir);

    let mut config = mock_config(&["R1", "R2", "R3"]);
    config.training.total_episodes = total_episodes;
    // A batch the horizon cannot fill: no gradient step perturbs the policy,
    // so resumed and uninterrupted runs are comparable row for row.
    config.training.buffer_size = 4096;
    config.training.batch_size = 2048;
    config.training.checkpoint_every = 4;

    let registry = Arc::new(EvaluatorRegistry::new(&config, dir.join("rubrics"), None).unwrap());
    let ctrl = controller(4096);
    let corpus = CorpusLoader::load(&tsv, &meta, 5.0).unwrap();
    let checkpoint = if resume {
        dir.join("resume.ckpt")
    } else {
        dir.join(format!("{tag}.ckpt"))
    };
    let metrics = MetricsLog::create(&dir.join(format!("{tag}.csv"))).unwrap();

    let mut harness =
        TrainingHarness::new(config, registry, ctrl, corpus, checkpoint, metrics, 99);
    harness.train().await.unwrap()
}

#[tokio::test]
async fn interrupted_and_uninterrupted_runs_produce_the_same_episodes() {
    let dir = tempfile::tempdir().unwrap();

    // One uninterrupted run of 12 episodes.
    let full = run_mock_training(dir.path(), "full", 12, false).await;
    assert_eq!(full.rows.len(), 12);

    // A run stopped at 8 episodes, then resumed to 12 from its checkpoint.
    let head = run_mock_training(dir.path(), "resume", 8, true).await;
    assert_eq!(head.rows.len(), 8);
    let tail = run_mock_training(dir.path(), "resume", 12, true).await;
    assert_eq!(tail.rows.first().unwrap().episode, 8);

    for (row, full_row) in tail.rows.iter().zip(full.rows.iter().skip(8)) {
        assert_eq!(row.episode, full_row.episode);
        assert_eq!(row.reward, full_row.reward);
        assert_eq!(row.rounds, full_row.rounds);
        assert_eq!(row.gt, full_row.gt);
        assert_eq!(row.pred, full_row.pred);
        assert_eq!(row.epsilon, full_row.epsilon);
    }
}

#[tokio::test]
async fn mock_training_runs_end_to_end_and_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let summary = run_mock_training(dir.path(), "smoke", 6, false).await;

    assert_eq!(summary.rows.len(), 6);
    assert_eq!(summary.failed_episodes, 0);
    for row in &summary.rows {
        let reward = row.reward.expect("mock episodes succeed");
        assert!((-1.0..=1.0).contains(&reward));
        assert!(row.rounds >= 1);
    }
    assert!(dir.path().join("smoke.ckpt").exists());
}
