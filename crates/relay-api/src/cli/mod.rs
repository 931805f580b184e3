//! CLI command definitions for the `magnet-relay` binary.

pub mod config;
pub mod run;

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Fetch torrents from magnet links sent in chat and deliver the files back.
#[derive(Parser)]
#[command(name = "magnet-relay", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Only log warnings and errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the bot.
    Run {
        /// Also serve the status API on this address (e.g. 127.0.0.1:8080).
        #[arg(long, env = "MAGNET_RELAY_HTTP")]
        http: Option<SocketAddr>,

        /// Export spans to stdout through OpenTelemetry.
        #[arg(long, env = "MAGNET_RELAY_OTEL")]
        otel: bool,
    },

    /// Print the resolved configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_http() {
        let cli = Cli::try_parse_from(["magnet-relay", "-vv", "run", "--http", "127.0.0.1:8080"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run { http, otel } => {
                assert_eq!(http, Some("127.0.0.1:8080".parse().unwrap()));
                assert!(!otel);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_config_json() {
        let cli = Cli::try_parse_from(["magnet-relay", "config", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(Cli::try_parse_from(["magnet-relay", "run", "--http", "nowhere"]).is_err());
    }
}
