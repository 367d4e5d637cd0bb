//! consilium - Consensus-Oriented Scoring via Iterated Multi-view Deliberation
//!
//! A panel-of-experts evaluation engine: a subject (an essay together with a
//! rubric and optional source material) is fanned out to a configurable set of
//! role-bound evaluators, their critiques are gathered at a barrier, and a
//! value-based controller decides each round whether the panel has converged
//! enough to submit a final score or should debate another round. The
//! controller is trained offline against a labeled corpus so the loop trades
//! scoring accuracy against the cost of extra rounds.
//!
//! # Architecture
//!
//! - **Panel** ([`panel`]): role-bound evaluators behind the
//!   [`panel::Evaluate`] trait, constructed and cached by the
//!   [`panel::EvaluatorRegistry`]. A deterministic [`panel::MockEvaluator`]
//!   supports offline controller training without a language model.
//! - **Graph** ([`graph`]): the deliberation topology as data
//!   (fan-out → parallel roles → barrier → controller → loop or end) and a
//!   small engine that executes it, merging node returns through per-field
//!   reducers on [`graph::RunState`].
//! - **Controller** ([`controller`]): a six-feature state encoder, a
//!   fixed-topology value network with a lagged target copy, an ε-greedy
//!   action rule, and a bounded replay buffer.
//! - **Training** ([`training`]): the episode loop that drives the graph over
//!   a labeled corpus, materializes sparse-reward transitions, performs
//!   gradient updates, and checkpoints for resume.

pub mod config;
pub mod controller;
pub mod corpus;
pub mod critique;
pub mod graph;
pub mod panel;
pub mod subject;
pub mod training;

pub use config::AppConfig;
pub use critique::{Critique, ScoreItem};
pub use subject::{Artifact, ArtifactKind, Subject};
