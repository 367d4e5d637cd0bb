//! The deliberation graph.
//!
//! A small dataflow engine: parallel fan-out to the role nodes, barrier
//! fan-in at the controller, and a conditional back-edge gated by the
//! controller's decision. The topology is data ([`DeliberationTopology`]),
//! built from the configured role list; the engine
//! ([`DeliberationGraph`]) executes it, merging node returns into the shared
//! [`RunState`] through per-field reducers.

pub mod engine;
pub mod state;
pub mod topology;

pub use engine::{route_after_decision, DeliberationGraph, GraphError, Route, Termination};
pub use state::{DebugInfo, RunState, StateUpdate, TraceEntry};
pub use topology::{DeliberationTopology, NodeKind};
