//! Language-model backend abstraction.
//!
//! Evaluators call the backend through this trait only, so the same panel
//! code runs against a production API client, a cache, or a test double. The
//! backend is responsible for constraining generation to the [`Critique`]
//! schema.

use async_trait::async_trait;
use thiserror::Error;

use crate::critique::Critique;

/// Errors surfaced by a backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The call itself failed (network, provider, timeout, cancellation).
    #[error("language model call failed: {0}")]
    Call(String),

    /// The model produced output that does not parse as a [`Critique`].
    #[error("language model output violated the critique schema: {0}")]
    MalformedOutput(#[from] serde_json::Error),
}

/// An abstract schema-constrained language model.
///
/// Implementations may batch, cache, or mock the underlying calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Runs one structured completion.
    async fn invoke(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f64,
    ) -> Result<Critique, BackendError>;
}
