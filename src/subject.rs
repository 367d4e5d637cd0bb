//! Evaluation subjects.
//!
//! A [`Subject`] is the immutable per-episode input to the panel: one or more
//! artifacts (the essay text, source code, a transcript, ...), optional
//! reference material, and the metadata the reward computation and rubric
//! selection depend on. Subjects are created by corpus loading and never
//! mutated inside the deliberation graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of content an [`Artifact`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    TextContent,
    SourceCode,
    Conversation,
    Document,
    Other,
}

impl ArtifactKind {
    /// Human-readable label used in the rendered prompt context.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactKind::TextContent => "Text",
            ArtifactKind::SourceCode => "Source Code",
            ArtifactKind::Conversation => "Conversation",
            ArtifactKind::Document => "Document",
            ArtifactKind::Other => "Other",
        }
    }
}

/// A single piece of assessable content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub content: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Metadata attached to a subject by the corpus loader.
///
/// `set_id` selects the rubric; `raw_max_score` and `original_score` are on
/// the corpus' raw scale and feed the reward's ground truth; `context` is the
/// task prompt shown to evaluators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectMetadata {
    pub set_id: i64,
    pub raw_max_score: f64,
    pub context: String,
    pub original_score: f64,
    /// Additional corpus-specific fields, preserved verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The immutable per-episode evaluation subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: String,
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_text: Option<String>,
    pub metadata: SubjectMetadata,
}

impl Subject {
    /// Ground truth rescaled from the corpus' raw range to `[0, target_max]`.
    ///
    /// A non-positive `raw_max_score` falls back to 10.0 so a malformed row
    /// cannot divide by zero.
    pub fn ground_truth(&self, target_max: f64) -> f64 {
        let max = if self.metadata.raw_max_score > 0.0 {
            self.metadata.raw_max_score
        } else {
            10.0
        };
        (self.metadata.original_score / max * target_max).clamp(0.0, target_max)
    }

    /// Renders the subject to the deterministic markdown context used to
    /// prompt evaluators.
    ///
    /// Section order is fixed: task context, reference text (when present),
    /// then each artifact in declaration order with its description and
    /// filename, content fenced.
    pub fn to_markdown_context(&self) -> String {
        let mut out = String::new();
        out.push_str("## Task Context\n");
        out.push_str(&self.metadata.context);
        out.push('\n');

        if let Some(reference) = &self.reference_text {
            out.push_str("\n## Reference Material\n");
            out.push_str(reference);
            out.push('\n');
        }

        for artifact in &self.artifacts {
            out.push_str(&format!(
                "\n## Artifact: {} ({})\n",
                artifact.filename,
                artifact.kind.label()
            ));
            if let Some(description) = &artifact.description {
                out.push_str(description);
                out.push('\n');
            }
            out.push_str("```\n");
            out.push_str(&artifact.content);
            if !artifact.content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }

        out
    }
}
