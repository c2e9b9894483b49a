//! Parley CLI binary entrypoint.

use std::io;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_cli::cli::{Cli, Commands};
use parley_cli::output::{OutputFormat, ValidationSummary};
use parley_cli::{Scenario, simulate};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Simulate(args) => {
            let scenario = Scenario::from_file(&args.scenario)
                .with_context(|| format!("loading {}", args.scenario.display()))?;
            let report = simulate(&scenario, Duration::from_secs(args.timeout), !args.outcomes_only)
                .await
                .context("simulation failed")?;
            format.write(&mut stdout, &report)?;
        }
        Commands::Validate { scenario: path } => {
            let scenario =
                Scenario::from_file(&path).with_context(|| format!("validating {}", path.display()))?;
            let summary = ValidationSummary {
                scenario: path.display().to_string(),
                agents: scenario.agents.len(),
                negotiations: scenario.negotiations.len(),
            };
            format.write(&mut stdout, &summary)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_missing_file_fails() {
        let cli = Cli::parse_from(["parley", "validate", "/nonexistent/scenario.toml"]);
        let err = run(cli).await.unwrap_err();
        assert!(format!("{err:#}").contains("failed to read scenario"));
    }

    #[tokio::test]
    async fn validate_bundled_scenario() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/claims_triage.toml");
        let cli = Cli::parse_from(["parley", "--format", "json", "validate", path]);
        assert!(run(cli).await.is_ok());
    }
}
