mod analysis;
mod classifier;
mod config;
mod driver;
mod error;
mod mutation;
mod outcome;
mod process;
mod reducer;
mod rewriter;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{CliOverrides, Config};
use crate::driver::BatchDriver;
use crate::error::BackfillError;

#[derive(Parser)]
#[command(name = "mutmut-backfill")]
#[command(version)]
#[command(about = "Backfill mutation testing results for generated test suites")]
struct Cli {
    /// Root directory containing the experiment directories
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Only process experiments whose path contains run_<ID>
    #[arg(long, value_name = "ID")]
    run_id: Option<String>,

    /// Process this one experiment directory, even if it already has results
    #[arg(long, conflicts_with = "run_id")]
    experiment_dir: Option<PathBuf>,

    /// Mutation tool workspace shared by all experiments
    #[arg(long)]
    workspace_dir: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// List what would be processed without running anything
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            results_dir: self.results_dir.clone(),
            workspace_dir: self.workspace_dir.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: &Cli, config: &Config) -> Result<(), BackfillError> {
    let driver = BatchDriver::new(config, cli.dry_run);

    match &cli.experiment_dir {
        Some(dir) => driver.run_single(dir).await?,
        None => driver.run_batch(cli.run_id.as_deref()).await?,
    };

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            config.apply_overrides(&cli.overrides());
            config
        }
        Err(e) => {
            init_logging(cli.log_level.as_deref().unwrap_or("info"));
            tracing::error!("{}", BackfillError::from(e));
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.general.log_level);
    tracing::info!(
        "Config path: {}",
        cli.config
            .clone()
            .or_else(Config::default_config_path)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );
    tracing::info!("Results directory: {}", config.paths.results_dir.display());

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
