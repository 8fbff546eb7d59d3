//! # diaforge
//!
//! Iterative diagram synthesis: turn unstructured source text into a
//! rendered d2 diagram by looping a generative model, the deterministic
//! `d2` renderer, and a vision-capable critique model until the diagram
//! renders cleanly and the round budget is spent.
//!
//! The pipeline is strictly sequential: generation feeds the fix loop,
//! a clean render feeds critique, critique feeds improve, and the
//! improved source re-enters the fix loop for the next round. Every
//! state change is journaled to a single JSON log so a crashed run keeps
//! its last consistent snapshot.
//!
//! ## Quick tour
//!
//! - [`config::RunConfig`] selects the models, budgets, and flags.
//! - [`providers::ProviderClient`] streams completions from OpenAI,
//!   Anthropic, or Gemini, resolved once from the model-id prefix.
//! - [`render::Renderer`] wraps the `d2` binary with a hard deadline.
//! - [`runtime::Orchestrator`] drives the rounds and owns the journal.
//!
//! ```no_run
//! use std::sync::Arc;
//! use diaforge::cleanup::CleanupMode;
//! use diaforge::config::RunConfig;
//! use diaforge::event_bus::EventEmitter;
//! use diaforge::model::ModelId;
//! use diaforge::providers::ProviderClient;
//! use diaforge::runtime::{Orchestrator, RunInput};
//!
//! # async fn demo() -> miette::Result<()> {
//! let config = RunConfig::new(
//!     ModelId::parse("claude-3-5-sonnet-20240620")?,
//!     ModelId::parse("claude-3-5-sonnet-20240620")?,
//!     ModelId::parse("gemini-1.5-pro")?,
//!     CleanupMode::Model(ModelId::parse("claude-3-haiku-20240307")?),
//!     "out",
//! );
//! config.ensure_ready().await?;
//! let orchestrator = Orchestrator::new(
//!     config,
//!     Arc::new(ProviderClient::from_env()),
//!     EventEmitter::disconnected(),
//! );
//! let run = orchestrator
//!     .run(RunInput {
//!         data: "...".into(),
//!         data_description: "an article".into(),
//!         subject: "information flow".into(),
//!     })
//!     .await?;
//! println!("{}", run.summary());
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod config;
pub mod event_bus;
pub mod message;
pub mod model;
pub mod providers;
pub mod render;
pub mod runtime;
pub mod stages;
pub mod vision;
