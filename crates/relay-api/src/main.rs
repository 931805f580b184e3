//! magnet-relay entry point.
//!
//! Binary name: `magnet-relay`
//!
//! Parses CLI arguments, loads configuration, installs tracing, then
//! dispatches to the requested command.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use relay_infra::config::{load, load_dotenv, resolve_data_dir};
use relay_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need configuration.
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "magnet-relay", &mut std::io::stdout());
        return Ok(());
    }

    let dotenv = load_dotenv();
    let config = load(resolve_data_dir()).await?;

    let (log_dir, enable_otel) = match &cli.command {
        Commands::Run { otel, .. } => (Some(config.log_dir.clone()), *otel),
        _ => (None, false),
    };
    let _tracing = init_tracing(&TracingOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        json: cli.json,
        log_dir,
        enable_otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Loading ran before the subscriber existed.
    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "ignoring .env"),
    }
    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    let result = match cli.command {
        Commands::Run { http, .. } => cli::run::run(config, http).await,
        Commands::Config => cli::config::show_config(&config, cli.json),
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}
