//! Labeled corpus loading.
//!
//! Reads the tab-separated essay corpus (ISO-8859-1, as distributed) together
//! with its metadata JSON (per-set score ranges, task prompts, and optional
//! source passages), and assembles [`Subject`]s on demand. Provides the
//! fixed-seed 80/20 train/test split the harness samples from.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use thiserror::Error;

use crate::subject::{Artifact, ArtifactKind, Subject, SubjectMetadata};

/// Seed for the shuffled train/test split.
const SPLIT_SEED: u64 = 42;

/// Fraction of the corpus used for training.
const TRAIN_FRACTION: f64 = 0.8;

/// Fallback maximum raw score for sets missing from the metadata.
const DEFAULT_MAX_SCORE: f64 = 10.0;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse corpus metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("failed to parse corpus table: {0}")]
    Table(#[from] csv::Error),

    #[error("corpus table is missing column {0:?}")]
    MissingColumn(&'static str),

    #[error("corpus holds no usable rows")]
    Empty,
}

/// Which side of the split to index into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

/// Per-set context from the metadata JSON, keyed by stringified set id.
#[derive(Debug, Default, Deserialize)]
pub struct CorpusMetadata {
    #[serde(default)]
    pub score_ranges: HashMap<String, f64>,
    #[serde(default)]
    pub prompts: HashMap<String, String>,
    #[serde(default)]
    pub source_texts: HashMap<String, Option<String>>,
}

/// One usable corpus row.
#[derive(Debug, Clone)]
struct EssayRecord {
    essay_id: String,
    essay_set: i64,
    essay: String,
    domain1_score: f64,
}

/// The loaded corpus.
#[derive(Debug)]
pub struct CorpusLoader {
    records: Vec<EssayRecord>,
    metadata: CorpusMetadata,
    target_max_score: f64,
}

impl CorpusLoader {
    /// Loads the corpus table and its metadata.
    ///
    /// Rows without a parseable `domain1_score` are dropped. The table is
    /// decoded as ISO-8859-1 (every byte maps to the code point of the same
    /// value).
    pub fn load(
        tsv_path: &Path,
        metadata_path: &Path,
        target_max_score: f64,
    ) -> Result<Self, CorpusError> {
        let metadata_text =
            fs::read_to_string(metadata_path).map_err(|source| CorpusError::Io {
                path: metadata_path.display().to_string(),
                source,
            })?;
        let metadata: CorpusMetadata = serde_json::from_str(&metadata_text)?;

        let raw = fs::read(tsv_path).map_err(|source| CorpusError::Io {
            path: tsv_path.display().to_string(),
            source,
        })?;
        let decoded: String = raw.iter().map(|&b| b as char).collect();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(decoded.as_bytes());

        let headers = reader.headers()?.clone();
        let column = |name: &'static str| -> Result<usize, CorpusError> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or(CorpusError::MissingColumn(name))
        };
        let id_col = column("essay_id")?;
        let set_col = column("essay_set")?;
        let essay_col = column("essay")?;
        let score_col = column("domain1_score")?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let score = match row.get(score_col).map(str::trim) {
                Some(s) if !s.is_empty() => match s.parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => continue,
                },
                _ => continue,
            };
            let (Some(essay_id), Some(set), Some(essay)) =
                (row.get(id_col), row.get(set_col), row.get(essay_col))
            else {
                continue;
            };
            let Ok(essay_set) = set.trim().parse::<i64>() else {
                continue;
            };
            records.push(EssayRecord {
                essay_id: essay_id.trim().to_string(),
                essay_set,
                essay: essay.to_string(),
                domain1_score: score,
            });
        }

        if records.is_empty() {
            return Err(CorpusError::Empty);
        }
        info!("loaded {} essays from {}", records.len(), tsv_path.display());

        Ok(Self {
            records,
            metadata,
            target_max_score,
        })
    }

    /// Number of usable rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when no rows were loaded (unreachable after a successful
    /// [`CorpusLoader::load`]).
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Row indices for one side of the fixed-seed 80/20 shuffled split.
    pub fn split_indices(&self, split: Split) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.records.len()).collect();
        let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
        indices.shuffle(&mut rng);
        let split_point = (self.records.len() as f64 * TRAIN_FRACTION) as usize;
        match split {
            Split::Train => indices[..split_point].to_vec(),
            Split::Test => indices[split_point..].to_vec(),
        }
    }

    /// Assembles the subject at `index` along with its normalized ground
    /// truth on the target score range.
    pub fn subject(&self, index: usize) -> (Subject, f64) {
        let record = &self.records[index];
        let set_key = record.essay_set.to_string();

        let max_score = self
            .metadata
            .score_ranges
            .get(&set_key)
            .copied()
            .unwrap_or(DEFAULT_MAX_SCORE);
        let prompt = self
            .metadata
            .prompts
            .get(&set_key)
            .cloned()
            .unwrap_or_else(|| "Unknown Topic".to_string());
        let source_text = self
            .metadata
            .source_texts
            .get(&set_key)
            .cloned()
            .flatten();

        let subject = Subject {
            subject_id: format!("Set{}_ID{}", record.essay_set, record.essay_id),
            artifacts: vec![Artifact {
                kind: ArtifactKind::TextContent,
                content: record.essay.clone(),
                filename: format!("essay_set_{}.txt", record.essay_set),
                description: Some(format!("Student Essay (Set {})", record.essay_set)),
            }],
            reference_text: source_text,
            metadata: SubjectMetadata {
                set_id: record.essay_set,
                raw_max_score: max_score,
                context: prompt,
                original_score: record.domain1_score,
                extra: BTreeMap::new(),
            },
        };
        let ground_truth = subject.ground_truth(self.target_max_score);
        (subject, ground_truth)
    }
}
