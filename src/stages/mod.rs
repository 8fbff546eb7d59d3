//! The pipeline stages: generate, fix, critique, improve.
//!
//! Each stage is a free async function over a shared [`StageContext`],
//! which bundles the model client, the cleaner, transcript recording, and
//! progress emission. Stages never touch the journal; they return their
//! results and the orchestrator owns all run-state mutation.

pub mod critique;
pub mod fix;
pub mod generate;
pub mod improve;
pub mod prompts;

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;

use crate::cleanup::{Cleaner, CleanupError};
use crate::event_bus::{Event, EventEmitter, Stage};
use crate::providers::{self, ChatRequest, ModelClient, ProviderError, TranscriptWriter};
use crate::render::RenderError;
use crate::vision::VisionError;

pub use critique::critique;
pub use fix::{FixOutcome, FixRequest, check_and_fix};
pub use generate::{GenerateInput, generate};
pub use improve::{ImproveRequest, improve};

/// Anything a stage can fail with. The orchestrator converts these into a
/// failed round exactly once, at the top level.
#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cleanup(#[from] CleanupError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Vision(#[from] VisionError),

    #[error("could not write {path}: {source}")]
    #[diagnostic(code(diaforge::stage::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shared plumbing handed to every stage call.
#[derive(Clone)]
pub struct StageContext {
    pub client: Arc<dyn ModelClient>,
    pub cleaner: Cleaner,
    pub transcripts: TranscriptWriter,
    pub emitter: EventEmitter,
    pub temperature: f32,
}

impl StageContext {
    /// Stream a request to completion: transcript before and after,
    /// token-count ticks while draining.
    pub async fn call(
        &self,
        stage: Stage,
        call_id: &str,
        request: ChatRequest,
    ) -> Result<String, ProviderError> {
        let request = request.with_temperature(self.temperature);
        debug!(stage = stage.label(), call_id, model = %request.model, "model call");
        self.transcripts.record_prompt(call_id, &request);
        let stream = self.client.stream(request).await?;
        let mut count: u64 = 0;
        let emitter = &self.emitter;
        let response = providers::drain(stream, |_| {
            count += 1;
            emitter.emit(Event::Tokens { stage, count });
        })
        .await?;
        self.transcripts.record_response(call_id, &response);
        Ok(response)
    }

    /// Normalize raw model output into bare diagram source.
    pub async fn clean(&self, raw: &str) -> Result<String, CleanupError> {
        self.emitter.emit(Event::stage(Stage::Cleanup, "cleaning model output"));
        self.cleaner.clean(self.client.as_ref(), raw).await
    }
}

pub(crate) fn write_file(path: &std::path::Path, content: &str) -> Result<(), StageError> {
    std::fs::write(path, content).map_err(|source| StageError::Io {
        path: path.display().to_string(),
        source,
    })
}
