//! Tests for the `InsertionSolver`.

use std::sync::atomic::AtomicBool;

use super::*;
use dispatch_core::test_support::{
    PlanarGeoCostProvider, UnitGeoCostProvider, stop_at, vehicle_with,
};
use dispatch_core::{
    CylinderSize, EmergencyId, EmergencyKind, EmergencyPriority, EmergencyRequest, GeoCostError,
    Load, NeverCancelled, StopId, TimeWindow,
};
use rstest::rstest;

use crate::test_support::{FixedMatrixGeoCostProvider, morning_scenario};

const HOUR: u64 = 3_600;

fn origin() -> Coord<f64> {
    Coord { x: 0.0, y: 0.0 }
}

#[rstest]
fn urgent_stop_with_tight_window_is_served_first() {
    let solver = InsertionSolver::new(PlanarGeoCostProvider::default());
    let response = solver
        .solve(&morning_scenario(6))
        .expect("solve should succeed");

    assert!(response.unassigned.is_empty());
    let route = response.routes.first().expect("one route");
    let first = route.stops.first().expect("first stop");
    assert_eq!(first.id, StopId(3));
    let arrival = route.visit(StopId(3)).expect("visit for C").arrival;
    assert!(arrival <= Duration::from_secs(9 * HOUR + 1_800));
    assert!(route.feasible);
    assert!(route.respects_capacity(&Load::single(CylinderSize::KG_20, 6)));
}

#[rstest]
fn overflowing_demand_leaves_least_constrained_stop_unassigned() {
    let solver = InsertionSolver::new(PlanarGeoCostProvider::default());
    let response = solver
        .solve(&morning_scenario(5))
        .expect("solve should succeed");

    assert_eq!(
        response.unassigned,
        vec![UnassignedStop {
            stop_id: StopId(2),
            reason: UnassignedReason::NoCapacity,
        }]
    );
    let route = response.routes.first().expect("one route");
    assert_eq!(route.stops.first().map(|stop| stop.id), Some(StopId(3)));
}

#[rstest]
fn empty_stops_yield_empty_response() {
    let mut request = SolveRequest::new(origin());
    request.vehicles.push(vehicle_with(1, 5, TimeWindow::all_day()));
    let response = InsertionSolver::new(UnitGeoCostProvider)
        .solve(&request)
        .expect("empty solve succeeds");
    assert!(response.routes.is_empty());
    assert!(response.unassigned.is_empty());
}

#[rstest]
fn empty_fleet_marks_every_stop_without_querying_costs() {
    let mut request = SolveRequest::new(origin());
    request.stops = vec![
        stop_at(1, 1.0, 0.0, 1, TimeWindow::all_day()),
        stop_at(2, 2.0, 0.0, 1, TimeWindow::all_day()),
    ];
    // A zero-sized matrix would fail any real query.
    let solver = InsertionSolver::new(FixedMatrixGeoCostProvider::from_seconds(Vec::new()));
    let response = solver.solve(&request).expect("solve should succeed");
    assert!(response.routes.is_empty());
    assert!(
        response
            .unassigned
            .iter()
            .all(|stop| stop.reason == UnassignedReason::NoCapacity)
    );
    assert_eq!(response.unassigned.len(), 2);
}

#[rstest]
fn invalid_stops_are_rejected_before_solving() {
    let mut request = SolveRequest::new(origin());
    request.vehicles.push(vehicle_with(1, 5, TimeWindow::all_day()));
    request.stops.push(stop_at(1, 1.0, 0.0, 1, TimeWindow::from_hours(10, 8)));
    let err = InsertionSolver::new(UnitGeoCostProvider)
        .solve(&request)
        .expect_err("inverted window must be rejected");
    assert!(matches!(err, SolveError::Validation(ref rejected) if rejected.stops.len() == 1));
}

#[rstest]
fn provider_failure_surfaces_as_transport_error() {
    let mut request = SolveRequest::new(origin());
    request.vehicles.push(vehicle_with(1, 5, TimeWindow::all_day()));
    request.stops.push(stop_at(1, 1.0, 0.0, 1, TimeWindow::all_day()));
    let solver = InsertionSolver::new(FixedMatrixGeoCostProvider::from_seconds(vec![vec![0]]));
    let err = solver.solve(&request).expect_err("matrix too small");
    assert_eq!(
        err,
        SolveError::Transport(GeoCostError::DimensionMismatch {
            expected: 2,
            actual: 1
        })
    );
}

#[rstest]
fn cancelled_solve_discards_result() {
    let solver = InsertionSolver::new(PlanarGeoCostProvider::default());
    let cancelled = AtomicBool::new(true);
    let err = solver
        .solve_with_cancel(&morning_scenario(6), &cancelled)
        .expect_err("cancelled solve must fail");
    assert_eq!(err, SolveError::Cancelled);
}

#[rstest]
#[case(false, None)]
#[case(true, Some(Duration::from_secs(1_860)))]
fn late_service_depends_on_window_mode(#[case] soft: bool, #[case] lateness: Option<Duration>) {
    let mut request = SolveRequest::new(origin());
    request.vehicles.push(vehicle_with(1, 5, TimeWindow::from_hours(8, 18)));
    request.stops.push(stop_at(
        1,
        1.0,
        0.0,
        1,
        TimeWindow::new(Duration::from_secs(7 * HOUR), Duration::from_secs(7 * HOUR + 1_800)),
    ));
    request.constraints.soft_time_windows = soft;
    let response = InsertionSolver::new(UnitGeoCostProvider)
        .solve(&request)
        .expect("solve should succeed");

    match lateness {
        None => assert_eq!(
            response.unassigned,
            vec![UnassignedStop {
                stop_id: StopId(1),
                reason: UnassignedReason::TimeWindow,
            }]
        ),
        Some(expected) => {
            let route = response.routes.first().expect("soft route");
            let violation = route
                .visit(StopId(1))
                .and_then(|visit| visit.violation)
                .expect("violation reported");
            assert_eq!(violation.lateness, expected);
            assert_eq!(violation.penalty, 18_600);
            assert!(!route.feasible);
            assert_eq!(response.diagnostics.total_penalty, 18_600);
        }
    }
}

#[rstest]
fn repeated_solves_agree_on_cost() {
    let mut request = SolveRequest::new(origin());
    request.vehicles = vec![
        vehicle_with(1, 4, TimeWindow::all_day()),
        vehicle_with(2, 4, TimeWindow::all_day()),
    ];
    request.stops = [(1.0, 6.0), (2.0, 5.0), (3.0, 4.0), (4.0, 3.0), (5.0, 2.0), (6.0, 1.0)]
        .into_iter()
        .zip(1..)
        .map(|((x, y), id)| stop_at(id, x, y, 1, TimeWindow::all_day()))
        .collect();
    let solver = InsertionSolver::new(PlanarGeoCostProvider::default());
    let first = solver.solve(&request).expect("first solve");
    let second = solver.solve(&request).expect("second solve");
    assert_eq!(first.total_cost(), second.total_cost());
    assert_eq!(first.routes, second.routes);
}

#[rstest]
fn pass_budget_alone_decides_the_plan() {
    let mut request = SolveRequest::new(origin());
    request.vehicles = vec![
        vehicle_with(1, 3, TimeWindow::all_day()),
        vehicle_with(2, 3, TimeWindow::all_day()),
    ];
    request.stops = [(5.0, 1.0), (-2.0, 4.0), (3.0, -3.0), (1.0, 1.0), (-4.0, -1.0), (2.0, 6.0)]
        .into_iter()
        .zip(1..)
        .map(|((x, y), id)| stop_at(id, x, y, 1, TimeWindow::all_day()))
        .collect();
    let config = InsertionSolverConfig::default()
        .with_max_improvement_passes(2)
        .with_time_budget(Duration::from_secs(60));
    let solve = || {
        InsertionSolver::with_config(PlanarGeoCostProvider::default(), config)
            .solve(&request)
            .expect("solve succeeds")
    };
    let reference = solve();
    assert!(reference.diagnostics.improvement_passes <= 2);
    for _ in 0..2 {
        let again = solve();
        assert_eq!(again.routes, reference.routes);
        assert_eq!(again.unassigned, reference.unassigned);
    }
}

fn gas_leak(deadline_hours: u64) -> Stop {
    EmergencyRequest::new(
        EmergencyId(1),
        EmergencyKind::GasLeak,
        EmergencyPriority::Critical,
        Coord { x: 2.0, y: 0.0 },
        Duration::from_secs(9 * HOUR),
        Duration::from_secs(deadline_hours * HOUR),
    )
    .to_stop(Duration::from_secs(9 * HOUR))
}

#[rstest]
fn emergency_is_inserted_into_existing_route() {
    let vehicle = vehicle_with(1, 5, TimeWindow::from_hours(10, 18));
    let remaining = vec![
        stop_at(1, 1.0, 0.0, 1, TimeWindow::all_day()),
        stop_at(2, 3.0, 0.0, 1, TimeWindow::all_day()),
    ];
    let emergency = gas_leak(11);
    let solver = InsertionSolver::new(UnitGeoCostProvider);
    let insertion = solver
        .insert_into_route(
            origin(),
            &vehicle,
            &remaining,
            &emergency,
            SolveConstraints::default(),
            &NeverCancelled,
        )
        .expect("insertion should not fail")
        .expect("emergency fits");
    assert!(insertion.route.position_of(emergency.id).is_some());
    assert!(insertion.dropped.is_empty());
    assert_eq!(insertion.route.stops.len(), 3);
}

#[rstest]
fn emergency_past_its_deadline_is_not_inserted() {
    let vehicle = vehicle_with(1, 5, TimeWindow::from_hours(10, 18));
    let emergency = EmergencyRequest::new(
        EmergencyId(2),
        EmergencyKind::GasLeak,
        EmergencyPriority::Critical,
        Coord { x: 2.0, y: 0.0 },
        Duration::from_secs(9 * HOUR),
        Duration::from_secs(9 * HOUR + 1_800),
    )
    .to_stop(Duration::from_secs(9 * HOUR));
    let solver = InsertionSolver::new(UnitGeoCostProvider);
    let insertion = solver
        .insert_into_route(
            origin(),
            &vehicle,
            &[],
            &emergency,
            SolveConstraints::default(),
            &NeverCancelled,
        )
        .expect("insertion should not fail");
    assert!(insertion.is_none());
}

#[rstest]
fn config_builders_override_defaults() {
    let config = InsertionSolverConfig::default()
        .with_max_improvement_passes(3)
        .with_time_budget(Duration::from_millis(50))
        .with_lateness_penalty_per_second(1);
    assert_eq!(config.max_improvement_passes, 3);
    assert_eq!(config.time_budget, Duration::from_millis(50));
    assert_eq!(config.lateness_penalty_per_second, 1);
    let solver = InsertionSolver::with_config(UnitGeoCostProvider, config);
    assert_eq!(solver.config(), &config);
}
