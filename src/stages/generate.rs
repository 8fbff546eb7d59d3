//! Initial diagram generation. Runs exactly once per run.

use tracing::instrument;

use super::{StageContext, StageError, prompts};
use crate::event_bus::{Event, Stage};
use crate::message::Message;
use crate::model::ModelId;
use crate::providers::ChatRequest;

/// What the generation prompt is built from.
#[derive(Clone, Copy, Debug)]
pub struct GenerateInput<'a> {
    pub data: &'a str,
    pub data_description: &'a str,
    pub subject: &'a str,
}

/// Produce the first cleaned diagram source from the raw input data.
#[instrument(skip_all, fields(model = %model))]
pub async fn generate(
    ctx: &StageContext,
    model: &ModelId,
    input: GenerateInput<'_>,
) -> Result<String, StageError> {
    ctx.emitter
        .emit(Event::stage(Stage::Generate, "generating diagram"));

    let prompt = prompts::generation(input.data, input.data_description, input.subject);
    let request = ChatRequest::new(model.clone(), vec![Message::user(prompt)])
        .with_system(prompts::GENERATION_SYSTEM_PROMPT);
    let raw = ctx.call(Stage::Generate, "initial_diagram", request).await?;

    let cleaned = ctx.clean(&raw).await?;
    ctx.emitter
        .emit(Event::stage(Stage::Generate, "diagram generated"));
    Ok(cleaned)
}
