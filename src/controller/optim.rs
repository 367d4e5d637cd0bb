//! Adam optimizer over the flat parameter vector.
//!
//! First/second-moment state is serializable so checkpoints can resume
//! training without resetting the optimizer.

use serde::{Deserialize, Serialize};

use super::network::Gradients;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPS: f64 = 1e-8;

/// Adam with the standard bias-corrected moment estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f64,
    /// First-moment estimates, one per parameter.
    m: Vec<f64>,
    /// Second-moment estimates, one per parameter.
    v: Vec<f64>,
    /// Completed step count.
    t: u64,
}

impl Adam {
    /// Creates an optimizer for `param_count` parameters.
    pub fn new(learning_rate: f64, param_count: usize) -> Self {
        Self {
            learning_rate,
            m: vec![0.0; param_count],
            v: vec![0.0; param_count],
            t: 0,
        }
    }

    /// Applies one update step to `params` in place.
    pub fn step(&mut self, params: &mut [f64], grads: &Gradients) {
        let g = grads.as_flat();
        debug_assert_eq!(params.len(), g.len());
        debug_assert_eq!(params.len(), self.m.len());

        self.t += 1;
        let bias1 = 1.0 - BETA1.powi(self.t as i32);
        let bias2 = 1.0 - BETA2.powi(self.t as i32);

        for i in 0..params.len() {
            self.m[i] = BETA1 * self.m[i] + (1.0 - BETA1) * g[i];
            self.v[i] = BETA2 * self.v[i] + (1.0 - BETA2) * g[i] * g[i];
            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;
            params[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + EPS);
        }
    }

    /// Number of completed steps.
    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Restores learning rate after deserialization if config changed.
    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }
}
