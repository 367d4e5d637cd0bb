//! The evaluation panel.
//!
//! Every panel member implements [`Evaluate`]: given a subject and the
//! previous round's critiques, produce a structured [`Critique`]. Two
//! implementations exist — the language-model-backed [`Evaluator`] and the
//! offline [`MockEvaluator`] — constructed and cached by the
//! [`EvaluatorRegistry`].

pub mod backend;
pub mod evaluator;
pub mod mock;
pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

use crate::critique::Critique;
use crate::subject::Subject;

pub use backend::{BackendError, LanguageModel};
pub use evaluator::Evaluator;
pub use mock::MockEvaluator;
pub use registry::{EvaluatorRegistry, RegistryError};

/// Errors raised by a panel member.
///
/// Either kind aborts the enclosing episode; the training harness logs it and
/// moves on without storing transitions.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluator {role} backend call failed: {source}")]
    Backend {
        role: String,
        #[source]
        source: BackendError,
    },

    #[error("evaluator {role} returned an out-of-range {field}")]
    Schema { role: String, field: &'static str },
}

/// A role-bound panel member.
#[async_trait]
pub trait Evaluate: Send + Sync {
    /// The role this member is bound to.
    fn role(&self) -> &str;

    /// Produces a critique of `subject`.
    ///
    /// `previous_reviews` holds the most recent completed round's critiques
    /// (empty on the first round); implementations must not see critiques
    /// from their own in-flight round.
    async fn evaluate(
        &self,
        subject: &Subject,
        previous_reviews: &[Critique],
    ) -> Result<Critique, EvaluatorError>;
}
