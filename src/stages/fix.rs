//! The bounded render/fix loop.
//!
//! The diagram is first rendered exactly as given. On failure, each
//! iteration asks the fix model to repair the source, cleans the answer,
//! writes it out, and re-renders; the new error seeds the next iteration.
//! With history sharing on, prior attempts replay as alternating turns so
//! the model can see which fixes already failed instead of oscillating
//! between two bad ones.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use super::{StageContext, StageError, prompts, write_file};
use crate::event_bus::{Event, Stage};
use crate::message::Message;
use crate::model::ModelId;
use crate::providers::ChatRequest;
use crate::render::Renderer;
use crate::runtime::types::{FixAttempt, RenderRecord};

/// One fix-loop invocation over a written diagram file.
#[derive(Clone, Copy, Debug)]
pub struct FixRequest<'a> {
    pub source: &'a str,
    pub source_path: &'a Path,
    /// Round id, e.g. `diagram_00`; also the stem for working files.
    pub diagram_id: &'a str,
    pub round: u32,
    pub budget: u32,
    pub share_history: bool,
}

/// Discriminated result of the loop, carrying the attempt list either way.
#[derive(Debug)]
pub enum FixOutcome {
    Rendered {
        source: String,
        source_path: PathBuf,
        image_path: PathBuf,
        attempts: Vec<FixAttempt>,
    },
    Exhausted {
        attempts: Vec<FixAttempt>,
    },
}

impl FixOutcome {
    #[must_use]
    pub fn attempts(&self) -> &[FixAttempt] {
        match self {
            FixOutcome::Rendered { attempts, .. } | FixOutcome::Exhausted { attempts } => attempts,
        }
    }
}

/// Render the diagram and, if the renderer rejects it, repair it within
/// the attempt budget. Returns at the first clean render.
#[instrument(skip_all, fields(id = request.diagram_id, budget = request.budget))]
pub async fn check_and_fix(
    ctx: &StageContext,
    renderer: &Renderer,
    model: &ModelId,
    workdir: &Path,
    diagrams_dir: &Path,
    request: FixRequest<'_>,
) -> Result<FixOutcome, StageError> {
    let mut attempts: Vec<FixAttempt> = Vec::new();

    ctx.emitter.emit(Event::stage_in_round(
        Stage::Render,
        request.round,
        format!("checking diagram ({})", request.diagram_id),
    ));
    let image_path = diagrams_dir.join(format!("{}.png", request.diagram_id));
    let first = renderer.render(request.source_path, &image_path).await?;
    ctx.emitter.emit(Event::Render {
        id: request.diagram_id.to_string(),
        outcome: first.outcome_label().to_string(),
        elapsed_ms: first.elapsed.as_millis() as u64,
    });

    if first.is_success() {
        info!(id = request.diagram_id, "diagram rendered without fixes");
        return Ok(FixOutcome::Rendered {
            source: request.source.to_string(),
            source_path: request.source_path.to_path_buf(),
            image_path: first.image_path,
            attempts,
        });
    }

    let mut current_source = request.source.to_string();
    let mut current_error = first
        .failure_text()
        .unwrap_or_else(|| "renderer produced no diagnostics".to_string());

    for attempt_index in 0..request.budget {
        ctx.emitter.emit(Event::fix_attempt(
            request.round,
            attempt_index + 1,
            "fixing diagram",
        ));
        warn!(
            id = request.diagram_id,
            attempt = attempt_index + 1,
            error = %current_error,
            "render failed, attempting fix"
        );

        let mut messages = Vec::new();
        if request.share_history {
            for attempt in &attempts {
                messages.push(Message::user(prompts::fix(&attempt.error, None)));
                messages.push(Message::assistant(prompts::fenced_reply(
                    &attempt.cleaned_source,
                )));
            }
        }
        let tagged = prompts::line_tag(&current_source);
        messages.push(Message::user(prompts::fix(&current_error, Some(&tagged))));

        let call_id = format!("{}_fix_{attempt_index}", request.diagram_id);
        let raw = ctx
            .call(Stage::Fix, &call_id, ChatRequest::new(model.clone(), messages))
            .await?;
        let cleaned = ctx.clean(&raw).await?;

        let candidate_path = workdir.join(format!("{call_id}.d2"));
        write_file(&candidate_path, &cleaned)?;
        let candidate_image = diagrams_dir.join(format!("{call_id}.png"));
        let render = renderer.render(&candidate_path, &candidate_image).await?;
        ctx.emitter.emit(Event::Render {
            id: call_id.clone(),
            outcome: render.outcome_label().to_string(),
            elapsed_ms: render.elapsed.as_millis() as u64,
        });

        let succeeded = render.is_success();
        let next_error = render.failure_text();
        attempts.push(FixAttempt {
            failing_source: current_source.clone(),
            error: current_error.clone(),
            raw_response: raw,
            cleaned_source: cleaned.clone(),
            render: RenderRecord::from(&render),
        });

        if succeeded {
            info!(id = %call_id, attempts = attempts.len(), "fix rendered cleanly");
            return Ok(FixOutcome::Rendered {
                source: cleaned,
                source_path: candidate_path,
                image_path: render.image_path,
                attempts,
            });
        }
        current_source = cleaned;
        current_error =
            next_error.unwrap_or_else(|| "renderer produced no diagnostics".to_string());
    }

    warn!(
        id = request.diagram_id,
        budget = request.budget,
        "fix budget exhausted"
    );
    Ok(FixOutcome::Exhausted { attempts })
}
