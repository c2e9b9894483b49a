//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Parley - negotiation between claims-processing agents.
#[derive(Parser, Debug, Clone)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run every negotiation in a scenario file on the in-process runtime.
    Simulate(SimulateArgs),

    /// Check a scenario file without running it.
    Validate {
        /// Scenario file (TOML).
        scenario: PathBuf,
    },
}

/// Arguments for the simulate command.
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Scenario file (TOML).
    pub scenario: PathBuf,

    /// Seconds to wait for all negotiations before giving up.
    #[arg(short, long, env = "PARLEY_SIMULATION_TIMEOUT", default_value_t = 60)]
    pub timeout: u64,

    /// Print only the negotiation outcomes, not the final agent state.
    #[arg(long)]
    pub outcomes_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_with_defaults() {
        let cli = Cli::parse_from(["parley", "simulate", "claims.toml"]);
        assert_eq!(cli.format, Format::Table);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.scenario, PathBuf::from("claims.toml"));
                assert_eq!(args.timeout, 60);
                assert!(!args.outcomes_only);
            }
            Commands::Validate { .. } => panic!("expected simulate"),
        }
    }

    #[test]
    fn parses_validate_with_json() {
        let cli = Cli::parse_from(["parley", "--format", "json", "validate", "claims.toml"]);
        assert_eq!(cli.format, Format::Json);
        assert!(matches!(cli.command, Commands::Validate { .. }));
    }
}
