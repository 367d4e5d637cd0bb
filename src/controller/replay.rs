//! Replay buffer for controller transitions.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::index::sample;

use super::encoder::FEATURE_DIM;

/// A single stored transition.
///
/// Rewards are sparse: nonzero only for the terminal transition of an
/// episode.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Encoded state the action was taken in.
    pub state: [f64; FEATURE_DIM],
    /// Action index (0 = Submit, 1 = Debate).
    pub action: usize,
    /// Reward credited to this step.
    pub reward: f64,
    /// Encoded successor state (equal to `state` on terminal steps).
    pub next_state: [f64; FEATURE_DIM],
    /// Whether this was the episode's final step.
    pub terminal: bool,
}

/// Bounded FIFO of transitions with uniform batch sampling.
///
/// When the buffer is full the oldest transition is evicted. Batches are
/// sampled uniformly at random without replacement.
#[derive(Debug)]
pub struct ReplayBuffer {
    transitions: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Creates an empty buffer holding at most `capacity` transitions.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay buffer capacity must be positive");
        Self {
            transitions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a transition, evicting the oldest at capacity.
    pub fn push(&mut self, transition: Transition) {
        if self.transitions.len() == self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    /// Samples `batch_size` distinct transitions uniformly at random.
    ///
    /// Returns `None` when fewer than `batch_size` transitions are stored.
    pub fn sample_batch(&self, batch_size: usize, rng: &mut StdRng) -> Option<Vec<&Transition>> {
        if self.transitions.len() < batch_size {
            return None;
        }
        let indices = sample(rng, self.transitions.len(), batch_size);
        Some(indices.iter().map(|i| &self.transitions[i]).collect())
    }

    /// Number of stored transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Returns true if no transitions are stored.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}
