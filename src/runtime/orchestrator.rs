//! The sequential run loop.
//!
//! `maxRounds = N` drives rounds `0..=N`: each round runs the fix/render
//! check and, except in the final round, critique and improve. The loop
//! ends early when the fix budget is exhausted or a stage errors; either
//! way the reason lands on a failed round and the journal holds the last
//! consistent state. Stages are never issued concurrently because each
//! one's input is the previous one's output.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::journal::{JournalError, RunJournal};
use super::types::{ConfigSnapshot, CritiqueHistoryItem, Round, Run};
use crate::cleanup::Cleaner;
use crate::config::RunConfig;
use crate::event_bus::{Event, EventEmitter};
use crate::providers::{ModelClient, TranscriptWriter};
use crate::stages::{
    self, FixOutcome, FixRequest, GenerateInput, ImproveRequest, StageContext, StageError,
};

/// Only infrastructure failures abort a run with an error; stage failures
/// are recorded on the run itself.
#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Journal(#[from] JournalError),
}

/// Internal error channel for the drive loop: stage failures become a
/// failed round, journal failures abort the run.
#[derive(Debug, Error)]
enum DriveFailure {
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

/// The text a synthesis run works from.
#[derive(Clone, Debug)]
pub struct RunInput {
    pub data: String,
    pub data_description: String,
    pub subject: String,
}

pub struct Orchestrator {
    config: RunConfig,
    ctx: StageContext,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: RunConfig, client: Arc<dyn ModelClient>, emitter: EventEmitter) -> Self {
        let transcripts = if config.record_transcripts {
            TranscriptWriter::new(config.prompts_dir())
        } else {
            TranscriptWriter::disabled()
        };
        let ctx = StageContext {
            client,
            cleaner: Cleaner::new(config.cleanup.clone()),
            transcripts,
            emitter,
            temperature: config.temperature,
        };
        Self { config, ctx }
    }

    /// Execute one full synthesis run.
    ///
    /// Always returns the run record on Ok; inspect
    /// [`Run::failure_reason`] to tell success from failure.
    #[instrument(skip_all, fields(run_id))]
    pub async fn run(&self, input: RunInput) -> Result<Run, RunError> {
        let run_id = Uuid::new_v4().to_string()[..8].to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        let journal = RunJournal::for_run(&self.config.workdir, &run_id);
        self.ctx.emitter.emit(Event::diagnostic(
            "run",
            format!(
                "run {run_id} starting, outputs in {}",
                self.config.workdir.display()
            ),
        ));

        let mut run = Run::new(&run_id, ConfigSnapshot::from(&self.config));
        journal.save(&run)?;

        let started = Instant::now();
        match self.drive(&mut run, &journal, &input).await {
            Ok(()) => {}
            Err(DriveFailure::Stage(e)) => {
                error!(error = %e, "run aborted by stage error");
                let index = run.rounds.len() as u32;
                run.rounds.push(Round::failed(index, e.to_string()));
                journal.save(&run)?;
            }
            Err(DriveFailure::Journal(e)) => return Err(e.into()),
        }
        run.total_time_ms = started.elapsed().as_millis() as u64;
        journal.save(&run)?;

        self.ctx.emitter.emit(Event::diagnostic(
            "run",
            format!("run {run_id} finished, log at {}", journal.path().display()),
        ));
        info!(
            rounds = run.rounds.len(),
            total_ms = run.total_time_ms,
            failed = run.failure_reason().is_some(),
            "run complete"
        );
        Ok(run)
    }

    async fn drive(
        &self,
        run: &mut Run,
        journal: &RunJournal,
        input: &RunInput,
    ) -> Result<(), DriveFailure> {
        let config = &self.config;
        let generate_input = GenerateInput {
            data: &input.data,
            data_description: &input.data_description,
            subject: &input.subject,
        };
        let initial =
            stages::generate(&self.ctx, &config.generation_model, generate_input).await?;

        let mut current_source = initial;
        let mut current_path = config.workdir.join("initial_diagram.d2");
        stages::write_file(&current_path, &current_source).map_err(DriveFailure::Stage)?;

        let diagrams_dir = config.diagrams_dir();
        let mut critique_history: Vec<CritiqueHistoryItem> = Vec::new();

        for round_index in 0..=config.max_critique_rounds {
            let round_started = Instant::now();
            let diagram_id = format!("diagram_{round_index:02}");
            let slot = run.rounds.len();
            run.rounds
                .push(Round::begin(round_index, current_source.clone()));
            journal.save(run)?;

            let fix_request = FixRequest {
                source: &current_source,
                source_path: &current_path,
                diagram_id: &diagram_id,
                round: round_index,
                budget: config.max_fix_steps,
                share_history: config.share_fix_history,
            };
            let outcome = stages::check_and_fix(
                &self.ctx,
                &config.renderer,
                &config.fix_model,
                &config.workdir,
                &diagrams_dir,
                fix_request,
            )
            .await?;

            let (source, source_path, image_path) = match outcome {
                FixOutcome::Exhausted { attempts } => {
                    let round = &mut run.rounds[slot];
                    round.fixes = attempts;
                    round.failure_reason = Some("failed to fix diagram".to_string());
                    round.elapsed_ms = round_started.elapsed().as_millis() as u64;
                    journal.save(run)?;
                    return Ok(());
                }
                FixOutcome::Rendered {
                    source,
                    source_path,
                    image_path,
                    attempts,
                } => {
                    let round = &mut run.rounds[slot];
                    round.fixes = attempts;
                    round.final_source = source.clone();
                    round.rendered_image = image_path.display().to_string();
                    (source, source_path, image_path)
                }
            };
            journal.save(run)?;

            current_source = source;
            current_path = source_path;

            // The final round will not be improved, so asking for a
            // critique would waste a vision call.
            if round_index == config.max_critique_rounds {
                run.rounds[slot].elapsed_ms = round_started.elapsed().as_millis() as u64;
                journal.save(run)?;
                break;
            }

            let data_for_critique = config
                .include_data_for_critique
                .then_some(input.data.as_str());
            let critique = stages::critique(
                &self.ctx,
                &config.critique_model,
                &image_path,
                &input.subject,
                data_for_critique,
                config.critique_retries,
                round_index,
            )
            .await?;
            run.rounds[slot].critique = Some(critique.clone());
            journal.save(run)?;

            let history: &[CritiqueHistoryItem] = if config.share_critique_history {
                &critique_history
            } else {
                &[]
            };
            let improve_request = ImproveRequest {
                source: &current_source,
                critique: &critique,
                subject: &input.subject,
                data: data_for_critique,
                history,
                diagram_id: &diagram_id,
                round: round_index,
            };
            let (improved, history_item) =
                stages::improve(&self.ctx, &config.generation_model, improve_request).await?;
            critique_history.push(history_item);

            current_path = config.workdir.join(format!("{diagram_id}_improved.d2"));
            stages::write_file(&current_path, &improved).map_err(DriveFailure::Stage)?;
            current_source = improved;

            run.rounds[slot].elapsed_ms = round_started.elapsed().as_millis() as u64;
            journal.save(run)?;
        }
        Ok(())
    }
}
