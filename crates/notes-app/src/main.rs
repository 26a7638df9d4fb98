//! `notes` binary - composition root.
//!
//! 1. Load configuration (file, then env vars, then CLI flags)
//! 2. Build the backend factory
//! 3. Run the chosen subcommand: the monitoring API, the benchmark harness,
//!    a one-shot health probe or a stats dump

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use notes_api::AppState;
use notes_bench::{BenchmarkHarness, Report, Workload};
use notes_core::config::NotesConfig;
use notes_core::error::NotesError;
use notes_core::types::BackendKind;
use notes_storage::{BackendFactory, ConfigBackendFactory};

use cli::{CliArgs, Command};

/// Config file, then env vars, then flags. A missing or unreadable file is
/// reported once logging is up.
fn load_config(cli: &CliArgs, path: &Path) -> (NotesConfig, Option<NotesError>) {
    let (mut config, load_error) = match NotesConfig::load(path) {
        Ok(config) => (config, None),
        Err(e) => (NotesConfig::default(), Some(e)),
    };
    config.apply_env();
    cli.apply_to(&mut config);
    (config, load_error)
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

async fn run_bench(config: &NotesConfig, factory: Arc<dyn BackendFactory>) -> Result<(), NotesError> {
    let backends = NotesConfig::parse_backends(&config.bench.backends)?;
    let harness = BenchmarkHarness::new(
        factory,
        Workload::from_config(&config.bench),
        config.bench.phase_timeout(),
    );

    let results = harness.run(&backends).await;
    if results.len() < backends.len() {
        tracing::warn!(
            requested = backends.len(),
            completed = results.len(),
            "Some backends produced no result"
        );
    }

    let report = Report::new(results);
    let artifacts = report.write_artifacts(&PathBuf::from(&config.bench.output_dir))?;
    println!("{}", artifacts.json.display());
    println!("{}", artifacts.html.display());
    println!("{}", artifacts.metrics.display());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), NotesError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();
    let config_file = cli.resolve_config_path();
    let (config, load_error) = load_config(&cli, &config_file);

    init_tracing(&config.general.log_level);
    tracing::info!("Starting notes v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    let config = Arc::new(config);
    let factory: Arc<dyn BackendFactory> = Arc::new(ConfigBackendFactory::new(Arc::clone(&config)));

    match &cli.command {
        Command::Serve { .. } => {
            let state = AppState::new(config.as_ref().clone(), factory)?;
            tracing::info!(
                backend = %state.selector.current_kind().await,
                "Active backend selected"
            );
            notes_api::start_server(&config, state).await?;
        }
        Command::Bench(_) => run_bench(&config, factory).await?,
        Command::Health => {
            let state = AppState::new(config.as_ref().clone(), factory)?;
            let results = state.monitor.health_all().await;
            state.selector.shutdown().await?;
            print_json(&results)?;
        }
        Command::Stats { db } => {
            let state = AppState::new(config.as_ref().clone(), factory)?;
            let kind = db
                .as_deref()
                .map(str::parse::<BackendKind>)
                .transpose()?;
            let stats = state.monitor.stats(kind).await;
            state.selector.shutdown().await?;
            print_json(&stats?)?;
        }
    }

    Ok(())
}
