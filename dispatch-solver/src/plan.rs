//! Working solution shared by construction and improvement.

use std::time::Duration;

use dispatch_core::{Diagnostics, PlannedRoute, SolveResponse, UnassignedStop};

use crate::instance::Instance;
use crate::schedule::Evaluation;

/// Sequence and schedule for one vehicle slot.
#[derive(Debug, Clone)]
pub(crate) struct RouteState {
    pub(crate) slot: usize,
    pub(crate) sequence: Vec<usize>,
    pub(crate) schedule: Evaluation,
}

impl RouteState {
    pub(crate) const fn cost(&self) -> u64 {
        self.schedule.cost()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// One route state per vehicle slot plus the stops nobody could take.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub(crate) routes: Vec<RouteState>,
    pub(crate) unassigned: Vec<UnassignedStop>,
}

impl Plan {
    /// Every vehicle idle, nothing assigned yet.
    pub(crate) fn idle(instance: &Instance<'_>) -> Self {
        let routes = (0..instance.slots().len())
            .map(|slot| RouteState {
                slot,
                sequence: Vec::new(),
                schedule: Evaluation::idle(
                    instance
                        .vehicle(slot)
                        .map_or(Duration::ZERO, |vehicle| vehicle.shift.earliest),
                ),
            })
            .collect();
        Self {
            routes,
            unassigned: Vec::new(),
        }
    }

    pub(crate) fn total_cost(&self) -> u64 {
        self.routes
            .iter()
            .fold(0_u64, |acc, route| acc.saturating_add(route.cost()))
    }

    /// Materialise the plan as a response; idle vehicles are omitted.
    pub(crate) fn into_response(
        self,
        instance: &Instance<'_>,
        mut diagnostics: Diagnostics,
    ) -> SolveResponse {
        let routes: Vec<PlannedRoute> = self
            .routes
            .into_iter()
            .filter(|route| !route.is_empty())
            .filter_map(|route| planned_route(instance, route))
            .collect();
        diagnostics.total_distance_m = routes
            .iter()
            .fold(0_u64, |acc, route| acc.saturating_add(route.total_distance_m));
        diagnostics.total_penalty = routes
            .iter()
            .fold(0_u64, |acc, route| acc.saturating_add(route.total_penalty));
        SolveResponse {
            routes,
            unassigned: self.unassigned,
            diagnostics,
        }
    }
}

fn planned_route(instance: &Instance<'_>, route: RouteState) -> Option<PlannedRoute> {
    let slot = instance.slot(route.slot)?;
    let stops = route
        .sequence
        .iter()
        .zip(0_u32..)
        .filter_map(|(&index, position)| {
            instance.stop(index).map(|stop| {
                let mut placed = stop.clone();
                placed.sequence = Some(position);
                placed
            })
        })
        .collect();
    let feasible = route
        .schedule
        .visits
        .iter()
        .all(|visit| visit.violation.is_none());
    Some(PlannedRoute {
        vehicle_id: slot.id,
        stops,
        visits: route.schedule.visits,
        start_time: route.schedule.start,
        end_time: route.schedule.end,
        total_distance_m: route.schedule.distance_m,
        total_penalty: route.schedule.penalty,
        feasible,
    })
}
