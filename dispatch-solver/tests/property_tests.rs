//! Property-based tests for the insertion solver.
//!
//! # Invariants tested
//!
//! - **Capacity:** every prefix of every route fits the vehicle, per size.
//! - **Time windows:** with hard windows every service starts inside its
//!   window; with soft windows lateness is reported with its magnitude.
//! - **Pinned stops:** urgent and critical stops are only unassigned when
//!   their window or the fleet's capacity leaves no alternative.
//! - **Determinism:** solving the same request twice gives the same cost.
//! - **Accounting:** every stop is either routed once or reported once.

mod proptest_support;

use dispatch_core::test_support::PlanarGeoCostProvider;
use dispatch_core::{Load, Solver, UnassignedReason};
use dispatch_solver::InsertionSolver;
use proptest::prelude::*;

use proptest_support::{assert_every_stop_accounted_for, capacity_of, request_strategy};

fn solver() -> InsertionSolver<PlanarGeoCostProvider> {
    InsertionSolver::new(PlanarGeoCostProvider::default())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: cumulative demand never exceeds capacity on any prefix.
    #[test]
    fn routes_respect_capacity(request in request_strategy(1..=12, 1..=3)) {
        let response = solver().solve(&request).expect("solve should succeed");
        for route in &response.routes {
            let capacity = capacity_of(&request, route).expect("route vehicle exists");
            prop_assert!(
                route.respects_capacity(capacity),
                "route for {} overloads {:?}",
                route.vehicle_id,
                capacity
            );
        }
    }

    /// Property: hard windows are met; soft lateness equals arrival minus latest.
    #[test]
    fn time_windows_hold_or_are_reported(request in request_strategy(1..=12, 1..=3)) {
        let soft = request.constraints.soft_time_windows;
        let response = solver().solve(&request).expect("solve should succeed");
        for route in &response.routes {
            for (stop, visit) in route.stops.iter().zip(&route.visits) {
                prop_assert_eq!(stop.id, visit.stop_id);
                prop_assert!(visit.arrival >= stop.window.earliest);
                let lateness = visit.arrival.saturating_sub(stop.window.latest);
                match visit.violation {
                    Some(violation) => {
                        prop_assert!(soft, "violation reported with hard windows");
                        prop_assert_eq!(violation.lateness, lateness);
                    }
                    None => prop_assert!(lateness.is_zero()),
                }
            }
        }
    }

    /// Property: every stop is routed once or reported once.
    #[test]
    fn every_stop_is_accounted_for(request in request_strategy(0..=12, 0..=3)) {
        let response = solver().solve(&request).expect("solve should succeed");
        assert_every_stop_accounted_for(&request, &response)?;
    }

    /// Property: repeated solves of the same request agree on cost.
    #[test]
    fn solving_is_deterministic(request in request_strategy(1..=10, 1..=3)) {
        let first = solver().solve(&request).expect("first solve");
        let second = solver().solve(&request).expect("second solve");
        prop_assert_eq!(first.total_cost(), second.total_cost());
        prop_assert_eq!(first.routes, second.routes);
    }

    /// Property: with one vehicle, a pinned stop reported as lacking capacity
    /// really does not fit in the room the route leaves.
    #[test]
    fn pinned_stops_only_dropped_for_cause(request in request_strategy(1..=10, 1..=1)) {
        let response = solver().solve(&request).expect("solve should succeed");
        let capacity = &request.vehicles.first().expect("one vehicle").capacity;
        let used = response
            .routes
            .first()
            .map_or_else(Load::new, |route| route.total_load());
        for unassigned in &response.unassigned {
            let stop = request
                .stops
                .iter()
                .find(|stop| stop.id == unassigned.stop_id)
                .expect("unassigned stop comes from the request");
            if stop.is_pinned() && unassigned.reason == UnassignedReason::NoCapacity {
                prop_assert!(
                    !used.plus(&stop.demand).fits_within(capacity),
                    "pinned stop {} dropped although {:?} remained",
                    stop.id,
                    used.remaining(capacity)
                );
            }
        }
    }
}
