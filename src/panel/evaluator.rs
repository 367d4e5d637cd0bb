//! Role-bound evaluators.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::backend::LanguageModel;
use super::{Evaluate, EvaluatorError};
use crate::critique::Critique;
use crate::subject::Subject;

/// Maximum characters of a prior rationale quoted into the history block.
const HISTORY_SNIPPET_LEN: usize = 300;

/// A single panel member, fully characterized by its role name, its
/// rubric-injected system prompt, and a sampling temperature.
///
/// Roles are configuration, not subclasses: every evaluator runs the same
/// flow and differs only in these three values.
pub struct Evaluator {
    role_name: String,
    system_prompt: String,
    temperature: f64,
    backend: Arc<dyn LanguageModel>,
}

impl Evaluator {
    pub fn new(
        role_name: impl Into<String>,
        system_prompt: impl Into<String>,
        temperature: f64,
        backend: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            role_name: role_name.into(),
            system_prompt: system_prompt.into(),
            temperature,
            backend,
        }
    }

    /// Formats prior critiques into the compact history block shown to the
    /// evaluator on debate rounds.
    fn format_history(reviews: &[Critique]) -> String {
        let mut text = String::new();
        for r in reviews {
            let mut snippet: String = r.thought_process.chars().take(HISTORY_SNIPPET_LEN).collect();
            if r.thought_process.chars().count() > HISTORY_SNIPPET_LEN {
                snippet.push_str("...");
            }
            text.push_str(&format!(
                "> [{}] score: {}\n  summary: {}\n",
                r.role, r.overall_score, snippet
            ));
        }
        text
    }
}

#[async_trait]
impl Evaluate for Evaluator {
    fn role(&self) -> &str {
        &self.role_name
    }

    /// Evaluates the subject, optionally against the previous round's panel
    /// opinions.
    ///
    /// The returned critique's `role` is always overwritten with this
    /// evaluator's bound role; a model that drifts cannot corrupt downstream
    /// bookkeeping. Backend failures and schema violations propagate as
    /// [`EvaluatorError`] — values are never silently substituted.
    async fn evaluate(
        &self,
        subject: &Subject,
        previous_reviews: &[Critique],
    ) -> Result<Critique, EvaluatorError> {
        debug!("[{}] evaluating {}", self.role_name, subject.subject_id);

        let context = subject.to_markdown_context();
        let user_prompt = if previous_reviews.is_empty() {
            context
        } else {
            format!(
                "[Previous round panel opinions — read carefully and reconsider]\n{}\n\n{}",
                Self::format_history(previous_reviews),
                context
            )
        };

        let mut critique = self
            .backend
            .invoke(&self.system_prompt, &user_prompt, self.temperature)
            .await
            .map_err(|source| EvaluatorError::Backend {
                role: self.role_name.clone(),
                source,
            })?;

        critique.role = self.role_name.clone();
        critique
            .validate()
            .map_err(|field| EvaluatorError::Schema {
                role: self.role_name.clone(),
                field,
            })?;
        Ok(critique)
    }
}
