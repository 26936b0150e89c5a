//! Histoscope CLI

mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use hx_agg::NormFactorRegistry;
use hx_core::FitResults;
use hx_fit::{CancelToken, FitClient, PollOptions};
use hx_model::Workspace;

#[derive(Parser)]
#[command(name = "histoscope")]
#[command(about = "Histoscope - explore HistFactory workspaces")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-channel, per-process yield table
    Yields {
        /// Input workspace (pyhf JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Fit results JSON; adds post-fit columns
        #[arg(long)]
        fit_results: Option<PathBuf>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Stacked yields per channel
    Stacks {
        /// Input workspace (pyhf JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Rescale each stack so its top is 100
        #[arg(long, conflicts_with = "per_bin")]
        normalized: bool,

        /// Emit one stack per bin, with observed data alongside
        #[arg(long)]
        per_bin: bool,

        /// Fit results JSON; per-bin stacks become post-fit
        #[arg(long, requires = "per_bin")]
        fit_results: Option<PathBuf>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-systematic uncertainty summary with quadrature envelopes
    Uncertainty {
        /// Input workspace (pyhf JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Submit the workspace to a fit service and poll for results
    Fit {
        /// Input workspace (pyhf JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Base URL of the fit service
        #[arg(long)]
        url: String,

        /// Poll interval in seconds
        #[arg(long, default_value = "10")]
        interval_secs: u64,

        /// Maximum number of polls before giving up
        #[arg(long, default_value = "360")]
        max_polls: usize,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Yields { input, fit_results, output } => {
            let ws = load_workspace(&input)?;
            let registry = NormFactorRegistry::from_workspace(&ws);
            let fit = fit_results.map(|path| load_fit_results(&path)).transpose()?;
            let artifact = report::yields_artifact(&ws, &registry, fit.as_ref())?;
            emit(output.as_deref(), &artifact)
        }
        Commands::Stacks { input, normalized, per_bin, fit_results, output } => {
            let ws = load_workspace(&input)?;
            let registry = NormFactorRegistry::from_workspace(&ws);
            if per_bin {
                let fit = fit_results.map(|path| load_fit_results(&path)).transpose()?;
                let artifact = report::binwise_stacks_artifact(&ws, &registry, fit.as_ref())?;
                emit(output.as_deref(), &artifact)
            } else {
                let artifact = report::stacks_artifact(&ws, &registry, normalized)?;
                emit(output.as_deref(), &artifact)
            }
        }
        Commands::Uncertainty { input, output } => {
            let ws = load_workspace(&input)?;
            let registry = NormFactorRegistry::from_workspace(&ws);
            let artifact = report::uncertainty_artifact(&ws, &registry)?;
            emit(output.as_deref(), &artifact)
        }
        Commands::Fit { input, url, interval_secs, max_polls, output } => {
            let ws = load_workspace(&input)?;
            let options = PollOptions {
                interval: std::time::Duration::from_secs(interval_secs),
                max_polls,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            let fit = runtime.block_on(run_fit(&ws, &url, &options))?;
            emit(output.as_deref(), &fit)
        }
    }
}

async fn run_fit(ws: &Workspace, url: &str, options: &PollOptions) -> Result<FitResults> {
    let client = FitClient::new(url);
    let cancel = CancelToken::new();
    let result_id = client.submit(ws).await?;
    tracing::info!(%result_id, "polling fit service");
    Ok(client.wait_for_results(&result_id, options, &cancel).await?)
}

fn load_workspace(path: &std::path::Path) -> Result<Workspace> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workspace {}", path.display()))?;
    hx_model::parse_workspace(&json)
        .with_context(|| format!("invalid workspace {}", path.display()))
}

fn load_fit_results(path: &std::path::Path) -> Result<FitResults> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fit results {}", path.display()))?;
    let fit: FitResults = serde_json::from_str(&json)
        .with_context(|| format!("invalid fit results {}", path.display()))?;
    fit.validate()?;
    Ok(fit)
}

fn emit<T: Serialize>(output: Option<&std::path::Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
