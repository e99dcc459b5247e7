//! Proptest strategies for solver property-based tests.
//!
//! The generators only produce requests that pass validation: windows are
//! ordered, demand is non-negative and every vehicle carries something.

use std::collections::HashSet;
use std::time::Duration;

use dispatch_core::{
    CylinderSize, Load, PlannedRoute, Priority, SolveRequest, SolveResponse, Stop, StopId,
    TimeWindow, Vehicle, VehicleId,
};
use geo::Coord;
use proptest::prelude::*;

const HOUR: u64 = 3_600;

/// Strategy for a request with `stops` and `vehicles` in the given ranges.
pub fn request_strategy(
    stops: std::ops::RangeInclusive<usize>,
    vehicles: std::ops::RangeInclusive<usize>,
) -> impl Strategy<Value = SolveRequest> {
    (
        proptest::collection::vec(stop_strategy(), stops),
        proptest::collection::vec(capacity_strategy(), vehicles),
        any::<bool>(),
    )
        .prop_map(|(stops, capacities, soft)| {
            let mut request = SolveRequest::new(Coord { x: 0.0, y: 0.0 });
            request.stops = stops
                .into_iter()
                .zip(1..)
                .map(|(mut stop, id)| {
                    stop.id = StopId(id);
                    stop
                })
                .collect();
            request.vehicles = capacities
                .into_iter()
                .zip(1..)
                .map(|(capacity, id)| {
                    Vehicle::new(VehicleId(id), capacity, TimeWindow::from_hours(6, 20))
                })
                .collect();
            request.constraints.soft_time_windows = soft;
            request
        })
}

fn stop_strategy() -> impl Strategy<Value = Stop> {
    (
        -10_i32..=10,
        -10_i32..=10,
        0_i64..=3,
        0_i64..=1,
        6_u64..=16,
        1_u64..=4,
        prop_oneof![
            4 => Just(Priority::Normal),
            1 => Just(Priority::Urgent),
            1 => Just(Priority::Critical),
        ],
    )
        .prop_map(|(x, y, small, large, opens, width, priority)| {
            let demand = Load::single(CylinderSize::KG_20, small).with(CylinderSize::KG_45, large);
            let window = TimeWindow::new(
                Duration::from_secs(opens * HOUR),
                Duration::from_secs((opens + width) * HOUR),
            );
            Stop::new(
                StopId(0),
                Coord {
                    x: f64::from(x),
                    y: f64::from(y),
                },
                demand,
                window,
            )
            .with_priority(priority)
            .with_service_duration(Duration::from_secs(300))
        })
}

fn capacity_strategy() -> impl Strategy<Value = Load> {
    (1_i64..=12, 0_i64..=4)
        .prop_map(|(small, large)| Load::single(CylinderSize::KG_20, small).with(CylinderSize::KG_45, large))
}

/// Capacity of the vehicle driving `route`.
#[must_use]
pub fn capacity_of<'r>(request: &'r SolveRequest, route: &PlannedRoute) -> Option<&'r Load> {
    request
        .vehicles
        .iter()
        .find(|vehicle| vehicle.id == route.vehicle_id)
        .map(|vehicle| &vehicle.capacity)
}

/// Fail unless every stop appears exactly once across routes and unassigned.
pub fn assert_every_stop_accounted_for(
    request: &SolveRequest,
    response: &SolveResponse,
) -> Result<(), TestCaseError> {
    let mut seen = HashSet::new();
    let placed = response
        .routes
        .iter()
        .flat_map(|route| route.stops.iter().map(|stop| stop.id));
    let dropped = response.unassigned.iter().map(|stop| stop.stop_id);
    for id in placed.chain(dropped) {
        prop_assert!(seen.insert(id), "stop {id} reported twice");
    }
    prop_assert_eq!(seen.len(), request.stops.len());
    Ok(())
}
