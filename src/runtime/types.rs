//! Persisted run entities.
//!
//! These are the serde shapes written to the run journal after every
//! state-changing step. They hold no I/O and no behavior beyond
//! construction and sealing; the orchestrator owns every mutation.

use serde::{Deserialize, Serialize};

use crate::cleanup::CleanupMode;
use crate::config::RunConfig;
use crate::model::ModelId;
use crate::render::RenderResult;

/// Snapshot of the configuration a run was started with, embedded in the
/// journal so a log file is self-describing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub generation_model: ModelId,
    pub fix_model: ModelId,
    pub critique_model: ModelId,
    pub cleanup_model: Option<ModelId>,
    pub max_fix_steps: u32,
    pub max_critique_rounds: u32,
    pub provide_fix_history: bool,
    pub provide_critique_history: bool,
    pub provide_data_for_critique: bool,
    pub temperature: f32,
}

impl From<&RunConfig> for ConfigSnapshot {
    fn from(config: &RunConfig) -> Self {
        Self {
            generation_model: config.generation_model.clone(),
            fix_model: config.fix_model.clone(),
            critique_model: config.critique_model.clone(),
            cleanup_model: match &config.cleanup {
                CleanupMode::Model(model) => Some(model.clone()),
                CleanupMode::FenceOnly => None,
            },
            max_fix_steps: config.max_fix_steps,
            max_critique_rounds: config.max_critique_rounds,
            provide_fix_history: config.share_fix_history,
            provide_critique_history: config.share_critique_history,
            provide_data_for_critique: config.include_data_for_critique,
            temperature: config.temperature,
        }
    }
}

/// What one renderer invocation did, flattened for the journal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRecord {
    pub command: String,
    pub outcome: String,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl From<&RenderResult> for RenderRecord {
    fn from(result: &RenderResult) -> Self {
        Self {
            command: result.command.clone(),
            outcome: result.outcome_label().to_string(),
            error: result.failure_text(),
            elapsed_ms: result.elapsed.as_millis() as u64,
        }
    }
}

/// One iteration of the fix loop. An attempt exists only because a render
/// of its input failed; its own render may have succeeded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAttempt {
    /// The source whose render failed and triggered this attempt.
    pub failing_source: String,
    /// The renderer error the fix prompt quoted.
    pub error: String,
    /// Verbatim model response, before cleanup.
    pub raw_response: String,
    /// The cleaned candidate that was written and re-rendered.
    pub cleaned_source: String,
    pub render: RenderRecord,
}

/// One critique/improve exchange, replayed on later improve calls when
/// critique history sharing is enabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CritiqueHistoryItem {
    pub diagram_source: String,
    pub critique: String,
    /// Verbatim improve-stage response, before cleanup.
    pub raw_response: String,
    pub improved_source: String,
}

/// One generate-or-improve / fix / render / critique cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub index: u32,
    pub initial_source: String,
    pub fixes: Vec<FixAttempt>,
    pub final_source: String,
    pub rendered_image: String,
    pub critique: Option<String>,
    pub failure_reason: Option<String>,
    pub elapsed_ms: u64,
}

impl Round {
    #[must_use]
    pub fn begin(index: u32, initial_source: String) -> Self {
        Self {
            index,
            initial_source,
            fixes: Vec::new(),
            final_source: String::new(),
            rendered_image: String::new(),
            critique: None,
            failure_reason: None,
            elapsed_ms: 0,
        }
    }

    #[must_use]
    pub fn failed(index: u32, reason: impl Into<String>) -> Self {
        Self {
            failure_reason: Some(reason.into()),
            ..Self::begin(index, String::new())
        }
    }
}

/// The top-level record of one synthesis session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub config: ConfigSnapshot,
    pub rounds: Vec<Round>,
    pub total_time_ms: u64,
}

impl Run {
    #[must_use]
    pub fn new(id: impl Into<String>, config: ConfigSnapshot) -> Self {
        Self {
            id: id.into(),
            config,
            rounds: Vec::new(),
            total_time_ms: 0,
        }
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.rounds
            .iter()
            .find_map(|r| r.failure_reason.as_deref())
    }

    /// Human-readable end-of-run summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("Diagram Generation Results\n");
        out.push_str("--------------------------\n");
        out.push_str(&format!("Run ID: {}\n", self.id));
        out.push_str(&format!("Total time: {}ms\n", self.total_time_ms));
        out.push_str(&format!(
            "Models: generate={} fix={} critique={}\n",
            self.config.generation_model, self.config.fix_model, self.config.critique_model
        ));
        for round in &self.rounds {
            out.push_str(&format!(
                "\nRound {}:\n  fixes: {}\n  time: {}ms\n",
                round.index,
                round.fixes.len(),
                round.elapsed_ms
            ));
            if let Some(reason) = &round.failure_reason {
                out.push_str(&format!("  failed: {reason}\n"));
            }
            if !round.rendered_image.is_empty() {
                out.push_str(&format!("  rendered: {}\n", round.rendered_image));
            }
        }
        out
    }
}
