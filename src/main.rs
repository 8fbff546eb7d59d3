use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use diaforge::cleanup::CleanupMode;
use diaforge::config::{self, RunConfig};
use diaforge::event_bus::EventBus;
use diaforge::model::ModelId;
use diaforge::providers::ProviderClient;
use diaforge::render::Renderer;
use diaforge::runtime::{Orchestrator, RunInput};

/// Generate a d2 diagram from a text file by iterating generation,
/// rendering, and vision critique.
#[derive(Parser, Debug)]
#[command(name = "diaforge", version, about)]
struct Cli {
    /// Source text file to diagram.
    source: PathBuf,

    /// Output directory; defaults to a timestamped directory in the cwd.
    output_dir: Option<PathBuf>,

    /// Model used for initial generation and improvement.
    #[arg(long, default_value = "claude-3-5-sonnet-20240620")]
    generation_model: String,

    /// Model used by the fix loop; defaults to the generation model.
    #[arg(long)]
    fix_model: Option<String>,

    /// Vision model used to critique rendered diagrams.
    #[arg(long, default_value = "gemini-1.5-pro")]
    critique_model: String,

    /// Cheap model used to normalize model output into bare d2 source.
    #[arg(long, default_value = "claude-3-haiku-20240307")]
    cleanup_model: String,

    /// What the diagram should cover.
    #[arg(long, default_value = "information flow")]
    subject: String,

    /// Short description of what the source data is.
    #[arg(long, default_value = "unstructured text")]
    data_description: String,

    /// Render/fix attempts per round.
    #[arg(long, default_value_t = config::DEFAULT_MAX_FIX_STEPS)]
    max_fix_steps: u32,

    /// Critique/improve rounds after the initial one.
    #[arg(long, default_value_t = config::DEFAULT_MAX_CRITIQUE_ROUNDS)]
    max_critique_rounds: u32,

    /// Do not replay prior fix attempts in fix prompts.
    #[arg(long)]
    no_fix_history: bool,

    /// Do not replay prior critique exchanges in improve prompts.
    #[arg(long)]
    no_critique_history: bool,

    /// Do not include the source data in critique prompts.
    #[arg(long)]
    no_data_for_critique: bool,

    /// Use deterministic fence extraction instead of the cleanup model.
    #[arg(long)]
    no_model_cleanup: bool,

    /// Renderer binary.
    #[arg(long, default_value = "d2")]
    renderer: String,

    /// Hard deadline per renderer invocation, in seconds.
    #[arg(long, default_value_t = 60)]
    render_timeout_secs: u64,

    /// Sampling temperature for every model call.
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let generation_model = ModelId::parse(&cli.generation_model)?;
    let fix_model = match &cli.fix_model {
        Some(name) => ModelId::parse(name)?,
        None => generation_model.clone(),
    };
    let critique_model = ModelId::parse(&cli.critique_model)?;
    let cleanup = if cli.no_model_cleanup {
        CleanupMode::FenceOnly
    } else {
        CleanupMode::Model(ModelId::parse(&cli.cleanup_model)?)
    };

    let data = config::read_source(&cli.source)?;
    let estimate = config::estimate_tokens(&data);
    if estimate > 100_000 {
        warn!(
            estimated_tokens = estimate,
            "source text is very large; generation quality and cost will suffer"
        );
    }

    let workdir = cli.output_dir.unwrap_or_else(|| {
        PathBuf::from(format!(
            "diaforge_{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ))
    });

    let mut run_config = RunConfig::new(
        generation_model,
        fix_model,
        critique_model,
        cleanup,
        workdir,
    );
    run_config.max_fix_steps = cli.max_fix_steps;
    run_config.max_critique_rounds = cli.max_critique_rounds;
    run_config.share_fix_history = !cli.no_fix_history;
    run_config.share_critique_history = !cli.no_critique_history;
    run_config.include_data_for_critique = !cli.no_data_for_critique;
    run_config.temperature = cli.temperature;
    run_config.renderer = Renderer::new(
        cli.renderer,
        Duration::from_secs(cli.render_timeout_secs),
    );

    run_config.ensure_ready().await?;

    let bus = EventBus::default();
    bus.listen();
    let orchestrator = Orchestrator::new(
        run_config,
        Arc::new(ProviderClient::from_env()),
        bus.emitter(),
    );
    let run = orchestrator
        .run(RunInput {
            data,
            data_description: cli.data_description,
            subject: cli.subject,
        })
        .await?;
    bus.shutdown().await;

    println!("{}", run.summary());
    if run.failure_reason().is_some() {
        std::process::exit(1);
    }
    Ok(())
}
