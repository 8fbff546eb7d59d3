//! Vision critique of a successfully rendered diagram.
//!
//! The only stage with automatic error-triggered retry: vision calls hit
//! rate limits and transient network failures more than the text stages,
//! so provider errors are retried within a small budget before
//! propagating. Content is never judged here, only transport.

use std::path::Path;

use tracing::{instrument, warn};

use super::{StageContext, StageError, prompts};
use crate::event_bus::{Event, Stage};
use crate::message::Message;
use crate::model::ModelId;
use crate::providers::ChatRequest;
use crate::vision;

/// Ask the vision model for an actionable critique of the rendered image.
///
/// `retries` is the number of extra calls allowed after the first, so the
/// stage makes at most `retries + 1` provider calls.
#[instrument(skip_all, fields(model = %model, round))]
pub async fn critique(
    ctx: &StageContext,
    model: &ModelId,
    image_path: &Path,
    subject: &str,
    data: Option<&str>,
    retries: u32,
    round: u32,
) -> Result<String, StageError> {
    ctx.emitter.emit(Event::stage_in_round(
        Stage::Critique,
        round,
        "getting feedback on diagram",
    ));

    let attachment = vision::attachment_for(image_path, model.family())?;
    let prompt = prompts::critique(subject, data);

    let mut last_error = None;
    for attempt in 0..=retries {
        let request = ChatRequest::new(model.clone(), vec![Message::user(prompt.clone())])
            .with_image(attachment.clone());
        let call_id = format!("critique_{round:02}_{attempt}");
        match ctx.call(Stage::Critique, &call_id, request).await {
            Ok(text) => {
                ctx.emitter.emit(Event::stage_in_round(
                    Stage::Critique,
                    round,
                    "got feedback on diagram",
                ));
                return Ok(text);
            }
            Err(e) => {
                warn!(attempt, retries, error = %e, "critique call failed");
                last_error = Some(e);
            }
        }
    }
    // Loop body ran at least once, so an error is always present here.
    Err(StageError::Provider(last_error.expect("retry loop ran")))
}
