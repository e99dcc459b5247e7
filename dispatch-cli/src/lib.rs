//! Command-line interface for offline dispatch planning.
//!
//! `dispatch solve <plan.json>` reads a JSON-encoded
//! [`SolveRequest`](dispatch_core::SolveRequest), plans routes with the
//! insertion solver over an OSRM-backed travel cost provider and prints the
//! resulting [`SolveResponse`](dispatch_core::SolveResponse) as JSON.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod solve;

pub use error::CliError;

use solve::{SolveArgs, run_solve};

pub(crate) const ARG_SOLVE_REQUEST: &str = "request";
pub(crate) const ARG_SOLVE_OSRM_BASE_URL: &str = "osrm-base-url";
pub(crate) const ARG_SOLVE_MAX_IMPROVEMENT_PASSES: &str = "max-improvement-passes";
pub(crate) const ARG_SOLVE_SOFT_TIME_WINDOWS: &str = "soft-time-windows";
pub(crate) const ENV_SOLVE_REQUEST: &str = "DISPATCH_CMDS_SOLVE_REQUEST_PATH";

/// Run the dispatch CLI with the current process arguments and environment.
///
/// # Errors
/// Returns [`CliError`] when arguments fail to parse, configuration cannot be
/// resolved, the request is unreadable or invalid, or the solve fails.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Solve(args) => run_solve(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "dispatch",
    about = "Offline planning utilities for cylinder delivery routes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan routes for a JSON solve request.
    Solve(SolveArgs),
}

#[cfg(test)]
mod tests;
