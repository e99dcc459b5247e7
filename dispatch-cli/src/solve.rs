//! Solve command implementation for the dispatch CLI.

use std::fs::File;
use std::io::{BufReader, Write};

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use dispatch_core::{SolveRequest, SolveResponse, Solver};
use dispatch_data::routing::{
    HttpGeoCostProvider, HttpGeoCostProviderConfig, RetryPolicy, RetryingGeoCostProvider,
};
use dispatch_solver::{InsertionSolver, InsertionSolverConfig};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_SOLVE_MAX_IMPROVEMENT_PASSES, ARG_SOLVE_OSRM_BASE_URL, ARG_SOLVE_REQUEST,
    ARG_SOLVE_SOFT_TIME_WINDOWS, CliError, ENV_SOLVE_REQUEST,
};

/// CLI arguments for the `solve` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Plan delivery routes for a JSON-encoded SolveRequest. \
                 Travel costs come from an OSRM table service; transient \
                 routing failures are retried with capped backoff.",
    about = "Plan routes for a solve request"
)]
#[ortho_config(prefix = "DISPATCH")]
pub(crate) struct SolveArgs {
    /// Path to a JSON file containing a SolveRequest.
    #[arg(value_name = "plan.json")]
    #[serde(default)]
    pub(crate) request_path: Option<Utf8PathBuf>,
    /// Base URL for the OSRM server (e.g. "http://localhost:5000").
    #[arg(long = ARG_SOLVE_OSRM_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) osrm_base_url: Option<String>,
    /// Upper bound on local-search passes after construction.
    #[arg(long = ARG_SOLVE_MAX_IMPROVEMENT_PASSES, value_name = "passes")]
    #[serde(default)]
    pub(crate) max_improvement_passes: Option<u32>,
    /// Allow late service with a penalty instead of leaving stops unassigned.
    #[arg(
        long = ARG_SOLVE_SOFT_TIME_WINDOWS,
        value_name = "bool",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    #[serde(default)]
    pub(crate) soft_time_windows: Option<bool>,
}

impl SolveArgs {
    pub(crate) fn into_config(self) -> Result<SolveConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SolveConfig::try_from(merged)
    }
}

/// Resolved `solve` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SolveConfig {
    /// Path to the JSON request file.
    pub(crate) request_path: Utf8PathBuf,
    /// Base URL for the OSRM table service.
    pub(crate) osrm_base_url: String,
    /// Solver tuning.
    pub(crate) solver: InsertionSolverConfig,
    /// Forces soft windows on; `false` keeps the request's own setting.
    pub(crate) soft_time_windows: bool,
}

impl SolveConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        Self::require_existing(&self.request_path, ARG_SOLVE_REQUEST)
    }

    fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => Ok(()),
            Ok(_) => Err(CliError::SourcePathNotFile {
                field,
                path: path.to_path_buf(),
            }),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingSourceFile {
                    field,
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(CliError::InspectSourcePath {
                field,
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl TryFrom<SolveArgs> for SolveConfig {
    type Error = CliError;

    fn try_from(args: SolveArgs) -> Result<Self, Self::Error> {
        let request_path = args.request_path.ok_or(CliError::MissingArgument {
            field: ARG_SOLVE_REQUEST,
            env: ENV_SOLVE_REQUEST,
        })?;

        let osrm_base_url = args
            .osrm_base_url
            .unwrap_or_else(|| HttpGeoCostProviderConfig::default().base_url);
        let mut solver = InsertionSolverConfig::default();
        if let Some(passes) = args.max_improvement_passes {
            solver = solver.with_max_improvement_passes(passes);
        }

        Ok(Self {
            request_path,
            osrm_base_url,
            solver,
            soft_time_windows: args.soft_time_windows.unwrap_or(false),
        })
    }
}

/// Builds a solver instance for the current solve invocation.
pub(crate) trait SolveSolverBuilder {
    fn build(&self, config: &SolveConfig) -> Result<Box<dyn Solver>, CliError>;
}

pub(crate) struct DefaultSolveSolverBuilder;

impl SolveSolverBuilder for DefaultSolveSolverBuilder {
    fn build(&self, config: &SolveConfig) -> Result<Box<dyn Solver>, CliError> {
        let provider =
            HttpGeoCostProvider::new(config.osrm_base_url.clone()).map_err(|source| {
                CliError::BuildGeoCostProvider {
                    base_url: config.osrm_base_url.clone(),
                    source,
                }
            })?;
        let retrying = RetryingGeoCostProvider::new(provider, RetryPolicy::default());
        Ok(Box::new(InsertionSolver::with_config(
            retrying,
            config.solver,
        )))
    }
}

pub(crate) fn run_solve(args: SolveArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_solve_with(args, &DefaultSolveSolverBuilder, &mut stdout)
}

pub(crate) fn run_solve_with(
    args: SolveArgs,
    builder: &dyn SolveSolverBuilder,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let response = execute_solve(&config, builder)?;
    write_solve_response(writer, &response)
}

fn execute_solve(
    config: &SolveConfig,
    builder: &dyn SolveSolverBuilder,
) -> Result<SolveResponse, CliError> {
    let mut request = load_solve_request(&config.request_path)?;
    if config.soft_time_windows {
        request.constraints.soft_time_windows = true;
    }
    request.validate_detailed().map_err(|source| {
        for rejection in &source.stops {
            log::warn!("stop {} rejected: {}", rejection.stop_id, rejection.reason);
        }
        for rejection in &source.vehicles {
            log::warn!("vehicle rejected: {rejection:?}");
        }
        CliError::InvalidSolveRequest {
            path: config.request_path.clone(),
            source,
        }
    })?;

    let solver = builder.build(config)?;
    let response = solver
        .solve(&request)
        .map_err(|source| CliError::Solve { source })?;
    log::info!(
        "planned {} route(s), {} stop(s) unassigned, total cost {}",
        response.routes.len(),
        response.unassigned.len(),
        response.total_cost()
    );
    Ok(response)
}

/// Loads a JSON-encoded [`SolveRequest`] from disk.
pub(crate) fn load_solve_request(path: &Utf8Path) -> Result<SolveRequest, CliError> {
    let file = File::open(path).map_err(|source| CliError::OpenSolveRequest {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CliError::ParseSolveRequest {
        path: path.to_path_buf(),
        source,
    })
}

fn write_solve_response(writer: &mut dyn Write, response: &SolveResponse) -> Result<(), CliError> {
    let payload =
        serde_json::to_string_pretty(response).map_err(CliError::SerialiseSolveResponse)?;
    writer
        .write_all(payload.as_bytes())
        .and_then(|()| writer.write_all(b"\n"))
        .map_err(CliError::WriteSolveOutput)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SolveConfig, CliError> {
    let merged = SolveArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SolveConfig::try_from(merged)
}
