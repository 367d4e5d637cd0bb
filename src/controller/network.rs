//! Value network for the deliberation controller.
//!
//! A fixed-topology fully-connected regression network:
//! `input(6) → dense(64) → ReLU → dense(64) → ReLU → dense(2)`, no output
//! activation. Outputs are unbounded action values (index 0 = Submit,
//! index 1 = Debate). The two hidden layers use He-uniform initialization,
//! the output layer Glorot-uniform.
//!
//! The network is small enough that forward and backward passes are written
//! directly on `f64` slices; parameters flatten to a single vector in a
//! canonical order so the optimizer, soft target updates, and checkpoints all
//! share one representation.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::encoder::FEATURE_DIM;

/// Network input width, matching the state encoder.
pub const STATE_DIM: usize = FEATURE_DIM;
/// Network output width: one value per action.
pub const ACTION_DIM: usize = 2;
/// Width of both hidden layers.
pub const HIDDEN_DIM: usize = 64;

/// A dense layer with row-major weights (`w[out * in_dim + in]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Linear {
    w: Vec<f64>,
    b: Vec<f64>,
    in_dim: usize,
    out_dim: usize,
}

impl Linear {
    /// He-uniform initialization: `U(-√(6/fan_in), √(6/fan_in))`.
    fn he_uniform(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / in_dim as f64).sqrt();
        Self::uniform(in_dim, out_dim, limit, rng)
    }

    /// Glorot-uniform initialization: `U(-√(6/(fan_in+fan_out)), …)`.
    fn glorot_uniform(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_dim + out_dim) as f64).sqrt();
        Self::uniform(in_dim, out_dim, limit, rng)
    }

    fn uniform(in_dim: usize, out_dim: usize, limit: f64, rng: &mut StdRng) -> Self {
        let w = (0..in_dim * out_dim)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self {
            w,
            b: vec![0.0; out_dim],
            in_dim,
            out_dim,
        }
    }

    fn forward(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.in_dim);
        debug_assert_eq!(out.len(), self.out_dim);
        for (o, out_slot) in out.iter_mut().enumerate() {
            let row = &self.w[o * self.in_dim..(o + 1) * self.in_dim];
            let mut acc = self.b[o];
            for (wi, xi) in row.iter().zip(x) {
                acc += wi * xi;
            }
            *out_slot = acc;
        }
    }

    fn param_count(&self) -> usize {
        self.w.len() + self.b.len()
    }
}

/// Cached activations from one forward pass, consumed by backprop.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    input: [f64; STATE_DIM],
    z1: [f64; HIDDEN_DIM],
    h1: [f64; HIDDEN_DIM],
    z2: [f64; HIDDEN_DIM],
    h2: [f64; HIDDEN_DIM],
    /// Network output (action values).
    pub output: [f64; ACTION_DIM],
}

/// Accumulated parameter gradients, mirroring the flat parameter layout.
#[derive(Debug, Clone)]
pub struct Gradients {
    flat: Vec<f64>,
}

impl Gradients {
    /// Zero gradients sized for [`ValueNetwork`].
    pub fn zeros() -> Self {
        Self {
            flat: vec![0.0; ValueNetwork::param_count()],
        }
    }

    /// The gradients in canonical flat order.
    pub fn as_flat(&self) -> &[f64] {
        &self.flat
    }
}

/// The two-hidden-layer action-value network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueNetwork {
    l1: Linear,
    l2: Linear,
    l3: Linear,
}

impl ValueNetwork {
    /// Creates a freshly initialized network using `rng` for weight draws.
    pub fn new(rng: &mut StdRng) -> Self {
        Self {
            l1: Linear::he_uniform(STATE_DIM, HIDDEN_DIM, rng),
            l2: Linear::he_uniform(HIDDEN_DIM, HIDDEN_DIM, rng),
            l3: Linear::glorot_uniform(HIDDEN_DIM, ACTION_DIM, rng),
        }
    }

    /// Total number of scalar parameters.
    pub fn param_count() -> usize {
        STATE_DIM * HIDDEN_DIM
            + HIDDEN_DIM
            + HIDDEN_DIM * HIDDEN_DIM
            + HIDDEN_DIM
            + HIDDEN_DIM * ACTION_DIM
            + ACTION_DIM
    }

    /// Plain forward pass returning the action values.
    pub fn forward(&self, input: &[f64; STATE_DIM]) -> [f64; ACTION_DIM] {
        self.forward_trace(input).output
    }

    /// Forward pass that caches intermediate activations for [`Self::backward`].
    pub fn forward_trace(&self, input: &[f64; STATE_DIM]) -> ForwardTrace {
        let mut z1 = [0.0; HIDDEN_DIM];
        self.l1.forward(input, &mut z1);
        let mut h1 = z1;
        relu(&mut h1);

        let mut z2 = [0.0; HIDDEN_DIM];
        self.l2.forward(&h1, &mut z2);
        let mut h2 = z2;
        relu(&mut h2);

        let mut output = [0.0; ACTION_DIM];
        self.l3.forward(&h2, &mut output);

        ForwardTrace {
            input: *input,
            z1,
            h1,
            z2,
            h2,
            output,
        }
    }

    /// Accumulates parameter gradients for one sample into `grads`.
    ///
    /// `d_output` is ∂loss/∂output for this sample (zero for actions the loss
    /// does not touch).
    pub fn backward(&self, trace: &ForwardTrace, d_output: &[f64; ACTION_DIM], grads: &mut Gradients) {
        // Layout offsets within the flat gradient vector.
        let (o1w, o1b) = (0, STATE_DIM * HIDDEN_DIM);
        let o2w = o1b + HIDDEN_DIM;
        let o2b = o2w + HIDDEN_DIM * HIDDEN_DIM;
        let o3w = o2b + HIDDEN_DIM;
        let o3b = o3w + HIDDEN_DIM * ACTION_DIM;
        let g = &mut grads.flat;

        // Output layer.
        let mut d_h2 = [0.0; HIDDEN_DIM];
        for o in 0..ACTION_DIM {
            let d = d_output[o];
            if d == 0.0 {
                continue;
            }
            for j in 0..HIDDEN_DIM {
                g[o3w + o * HIDDEN_DIM + j] += d * trace.h2[j];
                d_h2[j] += d * self.l3.w[o * HIDDEN_DIM + j];
            }
            g[o3b + o] += d;
        }

        // Second hidden layer (through ReLU).
        let mut d_h1 = [0.0; HIDDEN_DIM];
        for o in 0..HIDDEN_DIM {
            if trace.z2[o] <= 0.0 {
                continue;
            }
            let d = d_h2[o];
            if d == 0.0 {
                continue;
            }
            for j in 0..HIDDEN_DIM {
                g[o2w + o * HIDDEN_DIM + j] += d * trace.h1[j];
                d_h1[j] += d * self.l2.w[o * HIDDEN_DIM + j];
            }
            g[o2b + o] += d;
        }

        // First hidden layer (through ReLU).
        for o in 0..HIDDEN_DIM {
            if trace.z1[o] <= 0.0 {
                continue;
            }
            let d = d_h1[o];
            if d == 0.0 {
                continue;
            }
            for j in 0..STATE_DIM {
                g[o1w + o * STATE_DIM + j] += d * trace.input[j];
            }
            g[o1b + o] += d;
        }
    }

    /// Flattens all parameters in canonical order
    /// (`l1.w, l1.b, l2.w, l2.b, l3.w, l3.b`).
    pub fn params_flat(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(Self::param_count());
        for layer in [&self.l1, &self.l2, &self.l3] {
            flat.extend_from_slice(&layer.w);
            flat.extend_from_slice(&layer.b);
        }
        flat
    }

    /// Overwrites all parameters from a flat vector in canonical order.
    ///
    /// Panics if `flat` has the wrong length; callers validate checkpoint
    /// payloads before reaching this point.
    pub fn set_params_flat(&mut self, flat: &[f64]) {
        assert_eq!(flat.len(), Self::param_count(), "parameter vector length");
        let mut cursor = 0;
        for layer in [&mut self.l1, &mut self.l2, &mut self.l3] {
            let w_len = layer.w.len();
            layer.w.copy_from_slice(&flat[cursor..cursor + w_len]);
            cursor += w_len;
            let b_len = layer.b.len();
            layer.b.copy_from_slice(&flat[cursor..cursor + b_len]);
            cursor += b_len;
        }
    }

    /// Soft-updates this network toward `policy`:
    /// `self ← τ · policy + (1 − τ) · self`.
    pub fn soft_update_from(&mut self, policy: &ValueNetwork, tau: f64) {
        let policy_flat = policy.params_flat();
        let mut flat = self.params_flat();
        for (t, p) in flat.iter_mut().zip(&policy_flat) {
            *t = tau * p + (1.0 - tau) * *t;
        }
        self.set_params_flat(&flat);
    }
}

fn relu(xs: &mut [f64]) {
    for x in xs {
        if *x < 0.0 {
            *x = 0.0;
        }
    }
}
