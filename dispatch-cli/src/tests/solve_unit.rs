//! Focused unit tests covering solve CLI configuration and request parsing.

use super::helpers::{morning_request, request_workspace, write_request, write_utf8};
use super::*;
use crate::solve::{
    DefaultSolveSolverBuilder, SolveArgs, SolveConfig, SolveSolverBuilder,
    config_from_layers_for_test, load_solve_request,
};
use dispatch_data::routing::ProviderBuildError;
use dispatch_solver::InsertionSolverConfig;
use ortho_config::MergeComposer;
use rstest::rstest;
use serde_json::json;

fn config_for(request_path: camino::Utf8PathBuf) -> SolveConfig {
    SolveConfig {
        request_path,
        osrm_base_url: "http://localhost:5000".to_owned(),
        solver: InsertionSolverConfig::default(),
        soft_time_windows: false,
    }
}

#[rstest]
fn converting_solve_without_request_errors() {
    let err = SolveConfig::try_from(SolveArgs::default()).expect_err("missing request");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_SOLVE_REQUEST);
            assert_eq!(env, ENV_SOLVE_REQUEST);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn solve_config_fills_in_defaults() {
    let args = SolveArgs {
        request_path: Some("plan.json".into()),
        ..SolveArgs::default()
    };

    let config = SolveConfig::try_from(args).expect("config should build");
    assert_eq!(config.request_path, "plan.json");
    assert_eq!(config.osrm_base_url, "http://localhost:5000");
    assert_eq!(config.solver, InsertionSolverConfig::default());
    assert!(!config.soft_time_windows);
}

#[rstest]
fn solve_config_applies_overrides() {
    let args = SolveArgs {
        request_path: Some("plan.json".into()),
        osrm_base_url: Some("http://osrm.internal:5000".to_owned()),
        max_improvement_passes: Some(3),
        soft_time_windows: Some(true),
    };

    let config = SolveConfig::try_from(args).expect("config should build");
    assert_eq!(config.osrm_base_url, "http://osrm.internal:5000");
    assert_eq!(config.solver.max_improvement_passes, 3);
    assert!(config.soft_time_windows);
}

#[rstest]
#[case::flag_alone(&["dispatch", "solve", "plan.json", "--soft-time-windows"], Some(true))]
#[case::explicit_false(&["dispatch", "solve", "plan.json", "--soft-time-windows", "false"], Some(false))]
#[case::absent(&["dispatch", "solve", "plan.json"], None)]
fn soft_time_windows_flag_parses(#[case] argv: &[&str], #[case] expected: Option<bool>) {
    let cli = Cli::try_parse_from(argv).expect("arguments should parse");
    let Command::Solve(args) = cli.command;
    assert_eq!(args.soft_time_windows, expected);
}

#[rstest]
fn validate_sources_reports_missing_request() {
    let (_tmp, request_path) = request_workspace();

    let err = config_for(request_path.clone())
        .validate_sources()
        .expect_err("missing request should fail validation");
    match err {
        CliError::MissingSourceFile { field, path } => {
            assert_eq!(field, ARG_SOLVE_REQUEST);
            assert_eq!(path, request_path);
        }
        other => panic!("expected MissingSourceFile, found {other:?}"),
    }
}

#[rstest]
fn validate_sources_reports_not_file() {
    let (_tmp, request_path) = request_workspace();
    std::fs::create_dir(&request_path).expect("request directory");

    let err = config_for(request_path.clone())
        .validate_sources()
        .expect_err("directory should fail validation");
    match err {
        CliError::SourcePathNotFile { field, path } => {
            assert_eq!(field, ARG_SOLVE_REQUEST);
            assert_eq!(path, request_path);
        }
        other => panic!("expected SourcePathNotFile, found {other:?}"),
    }
}

#[rstest]
fn load_solve_request_decodes_json() {
    let (_tmp, request_path) = request_workspace();
    let request = morning_request();
    write_request(&request_path, &request);

    let decoded = load_solve_request(&request_path).expect("request should decode");
    assert_eq!(decoded, request);
}

#[rstest]
fn load_solve_request_rejects_invalid_json() {
    let (_tmp, request_path) = request_workspace();
    write_utf8(&request_path, b"{ not valid json");

    let err = load_solve_request(&request_path).expect_err("invalid json should error");
    match err {
        CliError::ParseSolveRequest { path, .. } => assert_eq!(path, request_path),
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn load_solve_request_io_error_returns_open_error() {
    let (_tmp, request_path) = request_workspace();

    let err = load_solve_request(&request_path).expect_err("missing request should error");
    match err {
        CliError::OpenSolveRequest { path, .. } => assert_eq!(path, request_path),
        other => panic!("expected OpenSolveRequest, found {other:?}"),
    }
}

#[rstest]
fn default_builder_rejects_malformed_base_url() {
    let mut config = config_for("plan.json".into());
    config.osrm_base_url = "not a url".to_owned();

    let Err(err) = DefaultSolveSolverBuilder.build(&config) else {
        panic!("malformed URL should not build a solver");
    };
    match err {
        CliError::BuildGeoCostProvider { base_url, source } => {
            assert_eq!(base_url, "not a url");
            assert!(matches!(source, ProviderBuildError::InvalidBaseUrl { .. }));
        }
        other => panic!("expected BuildGeoCostProvider, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_maps_configuration_errors() {
    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "request_path": 42 }));

    let err = config_from_layers_for_test(composer.layers())
        .expect_err("invalid config layer should map to CliError::Configuration");
    match err {
        CliError::Configuration(_) => {}
        other => panic!("expected CliError::Configuration, found {other:?}"),
    }
}

#[rstest]
fn merge_layers_honours_precedence() {
    let mut composer = MergeComposer::new();
    composer.push_file(
        json!({
            "request_path": "from-file.json",
            "osrm_base_url": "http://from-file:5000",
            "max_improvement_passes": 7,
        }),
        None,
    );
    composer.push_environment(json!({
        "request_path": "from-env.json",
        "max_improvement_passes": 11,
    }));
    composer.push_cli(json!({
        "max_improvement_passes": 2,
        "soft_time_windows": true,
    }));

    let config =
        config_from_layers_for_test(composer.layers()).expect("merged config should build");
    assert_eq!(config.request_path, "from-env.json");
    assert_eq!(config.osrm_base_url, "http://from-file:5000");
    assert_eq!(config.solver.max_improvement_passes, 2);
    assert!(config.soft_time_windows);
}
