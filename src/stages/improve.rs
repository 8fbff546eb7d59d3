//! Applies a critique to the current diagram.

use tracing::instrument;

use super::{StageContext, StageError, prompts};
use crate::event_bus::{Event, Stage};
use crate::message::Message;
use crate::model::ModelId;
use crate::providers::ChatRequest;
use crate::runtime::types::CritiqueHistoryItem;

/// One improve invocation. `history` is empty when critique-history
/// sharing is disabled.
#[derive(Clone, Copy, Debug)]
pub struct ImproveRequest<'a> {
    pub source: &'a str,
    pub critique: &'a str,
    pub subject: &'a str,
    pub data: Option<&'a str>,
    pub history: &'a [CritiqueHistoryItem],
    /// Round id, used for the transcript call id.
    pub diagram_id: &'a str,
    pub round: u32,
}

/// Rework the diagram according to the critique.
///
/// Prior exchanges replay as alternating user/assistant turns; only the
/// live turn carries the input data. Returns the cleaned improved source
/// together with the history item for this exchange, raw response kept
/// verbatim. The caller owns appending it to the shared history.
#[instrument(skip_all, fields(model = %model, round = request.round))]
pub async fn improve(
    ctx: &StageContext,
    model: &ModelId,
    request: ImproveRequest<'_>,
) -> Result<(String, CritiqueHistoryItem), StageError> {
    ctx.emitter.emit(Event::stage_in_round(
        Stage::Improve,
        request.round,
        "improving diagram with critique",
    ));

    let mut messages = Vec::with_capacity(request.history.len() * 2 + 1);
    for item in request.history {
        messages.push(Message::user(prompts::improve(
            request.subject,
            &item.critique,
            Some(&item.diagram_source),
            None,
        )));
        messages.push(Message::assistant(prompts::improved_reply(
            &item.improved_source,
        )));
    }
    messages.push(Message::user(prompts::improve(
        request.subject,
        request.critique,
        Some(request.source),
        request.data,
    )));

    let call_id = format!("critique_improvement_{}", request.diagram_id);
    let raw = ctx
        .call(Stage::Improve, &call_id, ChatRequest::new(model.clone(), messages))
        .await?;
    let cleaned = ctx.clean(&raw).await?;

    ctx.emitter.emit(Event::stage_in_round(
        Stage::Improve,
        request.round,
        "new diagram generated from critique",
    ));
    let item = CritiqueHistoryItem {
        diagram_source: request.source.to_string(),
        critique: request.critique.to_string(),
        raw_response: raw,
        improved_source: cleaned.clone(),
    };
    Ok((cleaned, item))
}
