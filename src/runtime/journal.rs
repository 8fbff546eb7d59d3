//! Crash-safe run log.
//!
//! The journal is one pretty-printed JSON document holding the entire
//! [`Run`], rewritten after every state-changing step. A crash at any
//! point leaves the last consistent snapshot on disk.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;

use super::types::Run;

#[derive(Debug, Error, Diagnostic)]
pub enum JournalError {
    #[error("could not write run log {path}: {source}")]
    #[diagnostic(code(diaforge::journal::write))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read run log {path}: {source}")]
    #[diagnostic(code(diaforge::journal::read))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run log {path} is not valid JSON: {source}")]
    #[diagnostic(code(diaforge::journal::parse))]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode run state for {path}: {source}")]
    #[diagnostic(code(diaforge::journal::encode))]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Owns the on-disk location of one run's log.
#[derive(Clone, Debug)]
pub struct RunJournal {
    path: PathBuf,
}

impl RunJournal {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Conventional location: `<workdir>/<run_id>_log.json`.
    #[must_use]
    pub fn for_run(workdir: &Path, run_id: &str) -> Self {
        Self::new(workdir.join(format!("{run_id}_log.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the log with the current run state.
    pub fn save(&self, run: &Run) -> Result<(), JournalError> {
        let json = serde_json::to_string_pretty(run).map_err(|source| JournalError::Encode {
            path: self.path.display().to_string(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(|source| JournalError::Write {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(path = %self.path.display(), rounds = run.rounds.len(), "journal saved");
        Ok(())
    }

    /// Parse a log file back into a [`Run`].
    pub fn load(&self) -> Result<Run, JournalError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| JournalError::Read {
            path: self.path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| JournalError::Parse {
            path: self.path.display().to_string(),
            source,
        })
    }
}
