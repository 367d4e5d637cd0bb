//! Offline controller training entry point.
//!
//! Wires configuration, corpus, evaluator registry, and the controller into
//! the training harness, runs the configured number of episodes, then reports
//! a greedy evaluation pass over the held-out split.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use log::{error, info};

use consilium::config::AppConfig;
use consilium::controller::{ControllerConfig, DqnController};
use consilium::corpus::CorpusLoader;
use consilium::panel::EvaluatorRegistry;
use consilium::training::{MetricsLog, TrainingHarness};

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the deliberation controller offline")]
struct Args {
    /// Configuration file.
    #[arg(long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Tab-separated essay corpus.
    #[arg(long, default_value = "data/raw_submissions/training_set_rel3.tsv")]
    corpus: PathBuf,

    /// Corpus metadata JSON (score ranges, prompts, source texts).
    #[arg(long, default_value = "data/metadata/asap_context.json")]
    metadata: PathBuf,

    /// Rubric directory holding set_<N>.md files.
    #[arg(long, default_value = "rubrics")]
    rubrics: PathBuf,

    /// Checkpoint file for resume.
    #[arg(long, default_value = "data/model/dqn_checkpoint.bin")]
    checkpoint: PathBuf,

    /// Directory for metrics logs.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Override for training.total_episodes.
    #[arg(long)]
    episodes: Option<u64>,

    /// Held-out greedy evaluation episodes after training.
    #[arg(long, default_value_t = 50)]
    eval_episodes: usize,

    /// Base seed for episode sampling and simulation.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(&args.config)?;
    if let Some(episodes) = args.episodes {
        config.training.total_episodes = episodes;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let metrics_path = args.log_dir.join(format!("train_log_{timestamp}.csv"));
    info!(
        "mode {:?} | {} roles | {} episodes | metrics {}",
        config.run_mode,
        config.agents.len(),
        config.training.total_episodes,
        metrics_path.display()
    );

    let corpus = CorpusLoader::load(&args.corpus, &args.metadata, config.target_max_score())?;
    // Training runs against the mock panel; a production backend would be
    // injected here instead of `None`.
    let registry = Arc::new(EvaluatorRegistry::new(&config, &args.rubrics, None)?);
    let controller = Arc::new(Mutex::new(DqnController::new(
        ControllerConfig {
            learning_rate: config.training.learning_rate,
            gamma: config.training.gamma,
            buffer_size: config.training.buffer_size,
        },
        args.seed,
    )));
    let metrics = MetricsLog::create(&metrics_path)?;

    let mut harness = TrainingHarness::new(
        config,
        registry,
        controller,
        corpus,
        &args.checkpoint,
        metrics,
        args.seed,
    );

    let summary = harness.train().await?;
    info!(
        "training finished: {} episodes, {} failed, mean reward {:.3}",
        summary.rows.len(),
        summary.failed_episodes,
        summary.mean_reward()
    );

    if args.eval_episodes > 0 {
        let report = harness.evaluate(args.eval_episodes).await?;
        info!(
            "held-out evaluation: {} episodes | mean |error| {:.3} | mean rounds {:.2}",
            report.episodes, report.mean_abs_error, report.mean_rounds
        );
    }

    Ok(())
}
