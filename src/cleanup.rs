//! Normalizes raw model output into bare diagram source.
//!
//! Models wrap diagram source in markdown fences, add commentary, or
//! both. The primary path asks a cheap model to extract the source; the
//! deterministic fence extractor backs it up and also runs standalone
//! when model cleanup is disabled. In model mode any failure (a dead
//! provider, a truncated reply) degrades to the raw input so cleanup
//! never blocks a round; only fence-only mode can fail outright.

use futures_util::StreamExt;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::message::Message;
use crate::model::ModelId;
use crate::providers::{ChatRequest, ModelClient};

const EXTRACTION_SYSTEM_PROMPT: &str = "You are a code extraction tool. The user message contains \
a response from another model that includes d2 diagram source, possibly wrapped in markdown \
fences or surrounded by commentary. Reply with only the d2 source code itself. Do not add \
fences, explanations, or any other text.";

#[derive(Debug, Error, Diagnostic)]
pub enum CleanupError {
    /// Raised only in fence-only mode; model mode keeps the raw input
    /// instead of failing.
    #[error("model output opens a code fence that never closes")]
    #[diagnostic(
        code(diaforge::cleanup::unterminated_fence),
        help("The response was likely truncated; a higher max token limit may help.")
    )]
    UnterminatedFence,
}

/// How raw model output gets normalized.
#[derive(Clone, Debug)]
pub enum CleanupMode {
    /// Ask `model` to extract the source; fall back to fence extraction
    /// if that call fails.
    Model(ModelId),
    /// Deterministic fence extraction only, no extra model call.
    FenceOnly,
}

#[derive(Clone, Debug)]
pub struct Cleaner {
    mode: CleanupMode,
}

impl Cleaner {
    #[must_use]
    pub fn new(mode: CleanupMode) -> Self {
        Self { mode }
    }

    /// Normalize `raw` into bare diagram source.
    ///
    /// Already-clean input passes through unchanged, so cleaning is
    /// idempotent. In model mode this cannot fail: when the model call
    /// errors or its reply has no extractable block, the raw input is
    /// kept as-is rather than failing the round.
    #[instrument(skip_all, fields(bytes = raw.len()))]
    pub async fn clean(
        &self,
        client: &dyn ModelClient,
        raw: &str,
    ) -> Result<String, CleanupError> {
        match &self.mode {
            CleanupMode::FenceOnly => extract_fenced(raw),
            CleanupMode::Model(model) => match self.clean_via_model(client, model, raw).await {
                Ok(text) => match extract_fenced(&text) {
                    Ok(cleaned) => Ok(cleaned),
                    Err(e) => {
                        warn!(error = %e, "cleanup model reply was malformed, keeping raw output");
                        Ok(raw.trim().to_string())
                    }
                },
                Err(e) => {
                    warn!(error = %e, "model cleanup failed, keeping raw output");
                    Ok(raw.trim().to_string())
                }
            },
        }
    }

    async fn clean_via_model(
        &self,
        client: &dyn ModelClient,
        model: &ModelId,
        raw: &str,
    ) -> Result<String, crate::providers::ProviderError> {
        debug!(model = %model, "extracting source via cleanup model");
        let request = ChatRequest::new(model.clone(), vec![Message::user(raw)])
            .with_system(EXTRACTION_SYSTEM_PROMPT);
        let mut stream = client.stream(request).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

/// Pull diagram source out of markdown-fenced text.
///
/// With no fences the trimmed input is returned as-is. With fences, the
/// first complete block wins, except that a block tagged `d2` is
/// preferred over untagged or differently tagged ones.
pub fn extract_fenced(raw: &str) -> Result<String, CleanupError> {
    let mut blocks: Vec<(String, String)> = Vec::new();
    let mut open_tag: Option<String> = None;
    let mut body = String::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        match &open_tag {
            None if trimmed.starts_with("```") => {
                open_tag = Some(trimmed.trim_start_matches('`').trim().to_lowercase());
                body.clear();
            }
            None => {}
            Some(tag) if trimmed.starts_with("```") => {
                blocks.push((tag.clone(), body.trim().to_string()));
                open_tag = None;
            }
            Some(_) => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }

    if open_tag.is_some() {
        return Err(CleanupError::UnterminatedFence);
    }
    if blocks.is_empty() {
        return Ok(raw.trim().to_string());
    }
    let chosen = blocks
        .iter()
        .find(|(tag, _)| tag == "d2")
        .unwrap_or(&blocks[0]);
    Ok(chosen.1.clone())
}
