mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diaforge::cleanup::CleanupMode;
use diaforge::config::RunConfig;
use diaforge::event_bus::EventEmitter;
use diaforge::model::ModelId;
use diaforge::render::Renderer;
use diaforge::runtime::{Orchestrator, RunInput, RunJournal};

fn run_config(workdir: &Path, renderer_binary: &Path, max_rounds: u32) -> RunConfig {
    let mut config = RunConfig::new(
        ModelId::parse("gpt-4o").unwrap(),
        ModelId::parse("gpt-4o").unwrap(),
        ModelId::parse("gemini-1.5-pro").unwrap(),
        CleanupMode::FenceOnly,
        workdir,
    );
    config.max_critique_rounds = max_rounds;
    config.max_fix_steps = 2;
    config.record_transcripts = false;
    config.renderer = Renderer::new(
        renderer_binary.display().to_string(),
        Duration::from_secs(5),
    );
    std::fs::create_dir_all(config.diagrams_dir()).unwrap();
    config
}

fn input() -> RunInput {
    RunInput {
        data: "alpha feeds beta".to_string(),
        data_description: "a short note".to_string(),
        subject: "information flow".to_string(),
    }
}

#[tokio::test]
async fn full_run_produces_max_rounds_plus_one_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = common::ok_renderer(dir.path());
    let client = Arc::new(common::ScriptedClient::new(vec![
        Ok("```d2\na -> b\n```"),
        Ok("tighten the layout"),
        Ok("```d2\na -> b: v2\n```"),
        Ok("align the labels"),
        Ok("```d2\na -> b: v3\n```"),
    ]));
    let config = run_config(dir.path(), &renderer, 2);
    let orchestrator = Orchestrator::new(config, client.clone(), EventEmitter::disconnected());

    let run = orchestrator.run(input()).await.unwrap();

    assert_eq!(run.id.len(), 8);
    assert!(run.failure_reason().is_none());
    assert_eq!(run.rounds.len(), 3);

    // Critique on every round but the last.
    assert_eq!(run.rounds[0].critique.as_deref(), Some("tighten the layout"));
    assert_eq!(run.rounds[1].critique.as_deref(), Some("align the labels"));
    assert!(run.rounds[2].critique.is_none());

    // Each improved source becomes the next round's starting point.
    assert_eq!(run.rounds[0].final_source, "a -> b");
    assert_eq!(run.rounds[1].initial_source, "a -> b: v2");
    assert_eq!(run.rounds[2].initial_source, "a -> b: v3");
    assert!(run.rounds.iter().all(|r| r.fixes.is_empty()));

    // 1 generate + 2 rounds of (critique + improve).
    assert_eq!(client.calls(), 5);

    // Working files are self-describing.
    assert!(dir.path().join("initial_diagram.d2").exists());
    assert!(dir.path().join("diagram_00_improved.d2").exists());
    assert!(dir.path().join("diagram_01_improved.d2").exists());
}

#[tokio::test]
async fn journal_on_disk_matches_the_returned_run() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = common::ok_renderer(dir.path());
    let client = Arc::new(common::ScriptedClient::new(vec![
        Ok("```d2\na -> b\n```"),
        Ok("tighten"),
        Ok("```d2\na -> b: v2\n```"),
    ]));
    let config = run_config(dir.path(), &renderer, 1);
    let orchestrator = Orchestrator::new(config, client, EventEmitter::disconnected());

    let run = orchestrator.run(input()).await.unwrap();

    let journal = RunJournal::for_run(dir.path(), &run.id);
    assert!(journal.path().exists());
    let loaded = journal.load().unwrap();
    assert_eq!(loaded, run);
    assert_eq!(loaded.config.max_critique_rounds, 1);
}

#[tokio::test]
async fn critique_history_replays_prior_exchanges_in_improve_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = common::ok_renderer(dir.path());
    let client = Arc::new(common::ScriptedClient::new(vec![
        Ok("```d2\na -> b\n```"),
        Ok("first critique"),
        Ok("```d2\na -> b: v2\n```"),
        Ok("second critique"),
        Ok("```d2\na -> b: v3\n```"),
    ]));
    let config = run_config(dir.path(), &renderer, 2);
    let orchestrator = Orchestrator::new(config, client.clone(), EventEmitter::disconnected());

    orchestrator.run(input()).await.unwrap();

    let requests = client.requests();
    // Call order: generate, critique, improve, critique, improve.
    let second_improve = &requests[4].messages;
    assert_eq!(second_improve.len(), 3);
    assert!(second_improve[0].content.contains("first critique"));
    assert!(second_improve[0].content.contains("a -> b"));
    assert!(second_improve[1].content.contains("Improved diagram:"));
    assert!(second_improve[1].content.contains("a -> b: v2"));
    assert!(second_improve[2].content.contains("second critique"));
    // Only the live turn carries the data.
    assert!(!second_improve[0].content.contains("alpha feeds beta"));
    assert!(second_improve[2].content.contains("alpha feeds beta"));
}

#[tokio::test]
async fn critique_history_disabled_keeps_improve_prompts_to_the_live_turn() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = common::ok_renderer(dir.path());
    let client = Arc::new(common::ScriptedClient::new(vec![
        Ok("```d2\na -> b\n```"),
        Ok("first critique"),
        Ok("```d2\na -> b: v2\n```"),
        Ok("second critique"),
        Ok("```d2\na -> b: v3\n```"),
    ]));
    let mut config = run_config(dir.path(), &renderer, 2);
    config.share_critique_history = false;
    let orchestrator = Orchestrator::new(config, client.clone(), EventEmitter::disconnected());

    orchestrator.run(input()).await.unwrap();

    let requests = client.requests();
    // Call order: generate, critique, improve, critique, improve.
    let second_improve = &requests[4].messages;
    assert_eq!(second_improve.len(), 1);
    assert!(second_improve[0].content.contains("second critique"));
    assert!(!second_improve[0].content.contains("first critique"));
}

#[tokio::test]
async fn fix_exhaustion_fails_the_round_and_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = common::failing_renderer(dir.path());
    let client = Arc::new(common::ScriptedClient::new(vec![
        Ok("```d2\na -> b\n```"),
        Ok("```d2\nfix one\n```"),
        Ok("```d2\nfix two\n```"),
    ]));
    let config = run_config(dir.path(), &renderer, 3);
    let orchestrator = Orchestrator::new(config, client.clone(), EventEmitter::disconnected());

    let run = orchestrator.run(input()).await.unwrap();

    assert_eq!(run.rounds.len(), 1);
    assert_eq!(run.rounds[0].fixes.len(), 2);
    assert_eq!(run.failure_reason(), Some("failed to fix diagram"));
    // generate + two fix attempts, no critique or improve.
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn stage_error_is_recorded_as_a_failed_round() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = common::ok_renderer(dir.path());
    let client = Arc::new(common::ScriptedClient::new(vec![Err("rate limited")]));
    let config = run_config(dir.path(), &renderer, 2);
    let orchestrator = Orchestrator::new(config, client, EventEmitter::disconnected());

    let run = orchestrator.run(input()).await.unwrap();

    assert_eq!(run.rounds.len(), 1);
    let reason = run.failure_reason().unwrap();
    assert!(reason.contains("rate limited"));
}

#[tokio::test]
async fn critique_retry_recovers_from_one_transient_failure() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = common::ok_renderer(dir.path());
    let client = Arc::new(common::ScriptedClient::new(vec![
        Ok("```d2\na -> b\n```"),
        Err("transient vision error"),
        Ok("recovered critique"),
        Ok("```d2\na -> b: v2\n```"),
    ]));
    let config = run_config(dir.path(), &renderer, 1);
    let orchestrator = Orchestrator::new(config, client.clone(), EventEmitter::disconnected());

    let run = orchestrator.run(input()).await.unwrap();

    assert!(run.failure_reason().is_none());
    assert_eq!(run.rounds[0].critique.as_deref(), Some("recovered critique"));
    // generate + failed critique + retried critique + improve.
    assert_eq!(client.calls(), 4);
}

#[tokio::test]
async fn critique_failures_beyond_the_retry_budget_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = common::ok_renderer(dir.path());
    let client = Arc::new(common::ScriptedClient::new(vec![
        Ok("```d2\na -> b\n```"),
        Err("down"),
        Err("still down"),
    ]));
    let config = run_config(dir.path(), &renderer, 1);
    let orchestrator = Orchestrator::new(config, client.clone(), EventEmitter::disconnected());

    let run = orchestrator.run(input()).await.unwrap();

    assert_eq!(client.calls(), 3);
    let reason = run.failure_reason().unwrap();
    assert!(reason.contains("still down"));
    // The completed render on round 0 is preserved alongside the failure.
    assert!(!run.rounds[0].rendered_image.is_empty());
}
