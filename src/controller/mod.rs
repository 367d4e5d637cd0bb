//! The value-based deliberation controller.
//!
//! Observes per-round panel statistics and decides between *Submit* and
//! *Debate*:
//!
//! - [`encoder::StateEncoder`]: critiques → fixed six-feature state vector.
//! - [`network::ValueNetwork`]: two-hidden-layer action-value regression.
//! - [`agent::DqnController`]: ε-greedy selection, replay buffer, Bellman
//!   updates against a soft-updated target network, checkpoint I/O.

pub mod agent;
pub mod encoder;
pub mod network;
pub mod optim;
pub mod replay;

pub use agent::{Action, ControllerConfig, ControllerError, DqnController};
pub use encoder::{StateEncoder, FEATURE_DIM};
pub use network::{ValueNetwork, ACTION_DIM};
pub use replay::{ReplayBuffer, Transition};
