//! Per-episode metrics log.
//!
//! One CSV row per episode, including failed episodes (empty reward, reason
//! in the `note` column). The file is flushed after every row so a crashed
//! run leaves a usable log behind.

use std::fs::File;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to open metrics log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write metrics row: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush metrics log: {0}")]
    Flush(#[from] std::io::Error),
}

/// One episode's log line.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRow {
    pub episode: u64,
    /// Empty for failed episodes.
    pub reward: Option<f64>,
    /// Empty while the replay buffer is warming up.
    pub loss: Option<f64>,
    /// Debate rounds actually used.
    pub rounds: u32,
    pub epsilon: f64,
    pub gt: Option<f64>,
    pub pred: Option<f64>,
    /// Failure reason tag, empty on success.
    pub note: String,
}

/// CSV writer for [`MetricsRow`]s.
pub struct MetricsLog {
    writer: csv::Writer<File>,
}

impl MetricsLog {
    /// Creates (truncating) the log file; headers are written with the first
    /// row.
    pub fn create(path: &Path) -> Result<Self, MetricsError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| MetricsError::Open {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let file = File::create(path).map_err(|source| MetricsError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            writer: csv::Writer::from_writer(file),
        })
    }

    /// Appends one row and flushes.
    pub fn record(&mut self, row: &MetricsRow) -> Result<(), MetricsError> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        Ok(())
    }
}
