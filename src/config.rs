//! Run configuration and one-shot setup validation.
//!
//! A [`RunConfig`] is built by the CLI (or directly by tests) and handed
//! to the orchestrator. Everything that can fail before the first model
//! call fails here: unknown model prefixes are rejected when the ids are
//! parsed, and [`RunConfig::ensure_ready`] checks credentials, the
//! renderer binary, and the working directory exactly once.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;
use tracing::info;

use crate::cleanup::CleanupMode;
use crate::model::{ModelId, ProviderFamily};
use crate::render::{RenderError, Renderer};

pub const DEFAULT_MAX_FIX_STEPS: u32 = 4;
pub const DEFAULT_MAX_CRITIQUE_ROUNDS: u32 = 4;
pub const DEFAULT_CRITIQUE_RETRIES: u32 = 1;

#[derive(Debug, Error, Diagnostic)]
pub enum SetupError {
    #[error("source file {path} does not exist")]
    #[diagnostic(code(diaforge::setup::missing_source))]
    MissingSource { path: String },

    #[error("missing credential {var} for model {model}")]
    #[diagnostic(
        code(diaforge::setup::missing_credential),
        help("Export the variable or add it to a .env file in the working directory.")
    )]
    MissingCredential { var: &'static str, model: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Renderer(#[from] RenderError),

    #[error("could not prepare working directory {path}: {source}")]
    #[diagnostic(code(diaforge::setup::workdir))]
    Workdir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything one synthesis run needs to know up front.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub generation_model: ModelId,
    pub fix_model: ModelId,
    pub critique_model: ModelId,
    pub cleanup: CleanupMode,
    pub max_fix_steps: u32,
    pub max_critique_rounds: u32,
    pub critique_retries: u32,
    pub share_fix_history: bool,
    pub share_critique_history: bool,
    pub include_data_for_critique: bool,
    pub temperature: f32,
    pub workdir: PathBuf,
    pub renderer: Renderer,
    /// Write prompt/response transcripts under `workdir/prompts`.
    pub record_transcripts: bool,
}

impl RunConfig {
    /// A config with the stock budgets and flags; callers override fields
    /// directly afterwards.
    #[must_use]
    pub fn new(
        generation_model: ModelId,
        fix_model: ModelId,
        critique_model: ModelId,
        cleanup: CleanupMode,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generation_model,
            fix_model,
            critique_model,
            cleanup,
            max_fix_steps: DEFAULT_MAX_FIX_STEPS,
            max_critique_rounds: DEFAULT_MAX_CRITIQUE_ROUNDS,
            critique_retries: DEFAULT_CRITIQUE_RETRIES,
            share_fix_history: true,
            share_critique_history: true,
            include_data_for_critique: true,
            temperature: 0.0,
            workdir: workdir.into(),
            renderer: Renderer::default(),
            record_transcripts: true,
        }
    }

    #[must_use]
    pub fn diagrams_dir(&self) -> PathBuf {
        self.workdir.join("diagrams")
    }

    #[must_use]
    pub fn prompts_dir(&self) -> PathBuf {
        self.workdir.join("prompts")
    }

    /// Every distinct provider family this run will call.
    #[must_use]
    pub fn families(&self) -> Vec<ProviderFamily> {
        let mut models = vec![
            &self.generation_model,
            &self.fix_model,
            &self.critique_model,
        ];
        if let CleanupMode::Model(model) = &self.cleanup {
            models.push(model);
        }
        let mut families: Vec<ProviderFamily> = models.iter().map(|m| m.family()).collect();
        families.sort_by_key(|f| f.credential_var());
        families.dedup();
        families
    }

    /// Check credentials for every selected family against the process
    /// environment. Run once at startup, never mid-stream.
    pub fn validate_credentials(&self) -> Result<(), SetupError> {
        for family in self.families() {
            let var = family.credential_var();
            if std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true) {
                let model = self
                    .models_of(family)
                    .first()
                    .map(|m| m.name().to_string())
                    .unwrap_or_default();
                return Err(SetupError::MissingCredential { var, model });
            }
        }
        Ok(())
    }

    fn models_of(&self, family: ProviderFamily) -> Vec<&ModelId> {
        let mut models = vec![
            &self.generation_model,
            &self.fix_model,
            &self.critique_model,
        ];
        if let CleanupMode::Model(model) = &self.cleanup {
            models.push(model);
        }
        models.retain(|m| m.family() == family);
        models
    }

    /// Full pre-flight: credentials, renderer binary, directory layout.
    pub async fn ensure_ready(&self) -> Result<(), SetupError> {
        self.validate_credentials()?;
        let version = self.renderer.probe().await?;
        info!(renderer = %self.renderer.binary(), %version, "renderer available");
        for dir in [&self.workdir, &self.diagrams_dir(), &self.prompts_dir()] {
            std::fs::create_dir_all(dir).map_err(|source| SetupError::Workdir {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Rough token estimate used only for the oversized-source advisory.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Read the source text, rejecting missing paths with a setup error.
pub fn read_source(path: &Path) -> Result<String, SetupError> {
    std::fs::read_to_string(path).map_err(|_| SetupError::MissingSource {
        path: path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig::new(
            ModelId::parse("gpt-4o").unwrap(),
            ModelId::parse("gpt-4o").unwrap(),
            ModelId::parse("gemini-2.0-flash").unwrap(),
            CleanupMode::Model(ModelId::parse("claude-3-5-haiku-20241022").unwrap()),
            "/tmp/out",
        )
    }

    #[test]
    fn families_are_deduplicated_across_stages() {
        let families = config().families();
        assert_eq!(families.len(), 3);
        assert!(families.contains(&ProviderFamily::OpenAi));
        assert!(families.contains(&ProviderFamily::Gemini));
        assert!(families.contains(&ProviderFamily::Anthropic));

        let mut single = config();
        single.critique_model = ModelId::parse("gpt-4o").unwrap();
        single.cleanup = CleanupMode::FenceOnly;
        assert_eq!(single.families(), vec![ProviderFamily::OpenAi]);
    }

    #[test]
    fn directory_layout_hangs_off_the_workdir() {
        let config = config();
        assert_eq!(config.diagrams_dir(), PathBuf::from("/tmp/out/diagrams"));
        assert_eq!(config.prompts_dir(), PathBuf::from("/tmp/out/prompts"));
    }

    #[test]
    fn token_estimate_is_char_based() {
        assert_eq!(estimate_tokens(&"x".repeat(4000)), 1000);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn missing_source_file_is_a_setup_error() {
        let err = read_source(Path::new("/nonexistent/input.txt")).unwrap_err();
        assert!(matches!(err, SetupError::MissingSource { .. }));
    }
}
