//! Subprocess wrapper around the `d2` renderer.
//!
//! Rendering a candidate diagram is the pipeline's ground truth: a source
//! is valid exactly when `d2` accepts it. A rejected diagram is a normal
//! [`RenderOutcome`], not an error; only infrastructure problems (missing
//! binary, spawn failures) surface as [`RenderError`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// `d2` prints this on stderr when a render actually produced output.
/// A clean exit without it still counts as a failure.
pub const SUCCESS_MARKER: &str = "success";

pub const DEFAULT_THEME: &str = "300";
pub const DEFAULT_LAYOUT: &str = "dagre";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error, Diagnostic)]
pub enum RenderError {
    #[error("could not run renderer `{binary}`: {source}")]
    #[diagnostic(
        code(diaforge::render::spawn),
        help("Is d2 installed and on PATH? See https://d2lang.com for install steps.")
    )]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("renderer `{binary}` did not respond to --version")]
    #[diagnostic(code(diaforge::render::unavailable))]
    Unavailable { binary: String },
}

/// Classification of a completed renderer invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Success,
    Failed { error: String },
    TimedOut,
}

/// Everything observed from one renderer invocation.
#[derive(Clone, Debug)]
pub struct RenderResult {
    pub outcome: RenderOutcome,
    pub image_path: PathBuf,
    pub command: String,
    pub elapsed: Duration,
}

impl RenderResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RenderOutcome::Success)
    }

    /// The failure text a fix prompt should quote, if any.
    #[must_use]
    pub fn failure_text(&self) -> Option<String> {
        match &self.outcome {
            RenderOutcome::Success => None,
            RenderOutcome::Failed { error } => Some(error.clone()),
            RenderOutcome::TimedOut => Some("renderer timed out".to_string()),
        }
    }

    #[must_use]
    pub fn outcome_label(&self) -> &'static str {
        match self.outcome {
            RenderOutcome::Success => "success",
            RenderOutcome::Failed { .. } => "failed",
            RenderOutcome::TimedOut => "timed out",
        }
    }
}

/// Renders diagram sources to PNG via the `d2` CLI.
#[derive(Clone, Debug)]
pub struct Renderer {
    binary: String,
    theme: String,
    layout: String,
    timeout: Duration,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            binary: "d2".to_string(),
            theme: DEFAULT_THEME.to_string(),
            layout: DEFAULT_LAYOUT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Renderer {
    #[must_use]
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    #[must_use]
    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Confirm the renderer binary exists and answers `--version`.
    pub async fn probe(&self) -> Result<String, RenderError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|source| RenderError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(RenderError::Unavailable {
                binary: self.binary.clone(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Render `source_path` to `image_path`, classifying the outcome.
    ///
    /// A run past the timeout is killed and reported as
    /// [`RenderOutcome::TimedOut`].
    #[instrument(skip(self), fields(binary = %self.binary))]
    pub async fn render(
        &self,
        source_path: &Path,
        image_path: &Path,
    ) -> Result<RenderResult, RenderError> {
        let command_line = format!(
            "{} --theme={} -l {} {} {}",
            self.binary,
            self.theme,
            self.layout,
            source_path.display(),
            image_path.display()
        );
        debug!(command = %command_line, "invoking renderer");

        let mut command = Command::new(&self.binary);
        command
            .arg(format!("--theme={}", self.theme))
            .arg("-l")
            .arg(&self.layout)
            .arg(source_path)
            .arg(image_path)
            .kill_on_drop(true);

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, command.output()).await {
            // Dropping the output future kills the child via kill_on_drop.
            Err(_) => RenderOutcome::TimedOut,
            Ok(Err(source)) => {
                return Err(RenderError::Spawn {
                    binary: self.binary.clone(),
                    source,
                });
            }
            Ok(Ok(output)) => classify(
                output.status.success(),
                &String::from_utf8_lossy(&output.stderr),
            ),
        };

        Ok(RenderResult {
            outcome,
            image_path: image_path.to_path_buf(),
            command: command_line,
            elapsed: started.elapsed(),
        })
    }
}

fn classify(exited_cleanly: bool, stderr: &str) -> RenderOutcome {
    if exited_cleanly && stderr.contains(SUCCESS_MARKER) {
        RenderOutcome::Success
    } else {
        let error = stderr.trim();
        let error = if error.is_empty() {
            "renderer produced no diagnostics".to_string()
        } else {
            error.to_string()
        };
        RenderOutcome::Failed { error }
    }
}
