//! # parley-cli
//!
//! Parley command-line interface.
//!
//! Provides commands for:
//! - Validating scenario files
//! - Simulating a scenario's negotiations on the in-process runtime
//!
//! A scenario is a TOML file listing agents (resources, expertise, starting
//! trust) and the negotiations they open. See [`scenario`] for the format.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod error;
pub mod output;
pub mod scenario;
pub mod simulate;

pub use cli::{Cli, Commands, Format, SimulateArgs};
pub use error::CliError;
pub use output::{OutputFormat, SimulationReport, TableDisplay, ValidationSummary};
pub use scenario::Scenario;
pub use simulate::simulate;
