//! Planned and live delivery routes.
//!
//! A [`PlannedRoute`] is what a solver produces for one vehicle: the ordered
//! stops plus a [`Visit`] schedule describing when each stop is served and
//! what the vehicle carries afterwards. The dispatch store wraps it in a
//! [`Route`] carrying an identifier and a lifecycle [`RouteStatus`].

use std::time::Duration;

use crate::{Load, RouteId, Stop, StopId, VehicleId};

/// How far a visit starts beyond its window when windows are soft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeWindowViolation {
    /// Service start minus the window's latest bound.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub lateness: Duration,
    /// Cost charged for the lateness.
    pub penalty: u64,
}

/// Scheduled service of one stop.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Visit {
    /// Stop being served.
    pub stop_id: StopId,
    /// Service start time.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub arrival: Duration,
    /// Time spent waiting for the window to open.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub wait: Duration,
    /// Time the vehicle leaves the stop.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub departure: Duration,
    /// Cumulative cylinders delivered once this visit completes.
    pub load_after: Load,
    /// Set when service starts after the window closes.
    #[cfg_attr(feature = "serde", serde(default))]
    pub violation: Option<TimeWindowViolation>,
}

/// A solver-produced route for a single vehicle.
///
/// `stops` and `visits` are parallel: `visits[i]` schedules `stops[i]`.
/// `feasible` is `false` only when soft time windows produced violations.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlannedRoute {
    /// Vehicle driving the route.
    pub vehicle_id: VehicleId,
    /// Stops in visiting order, each with `sequence` set.
    pub stops: Vec<Stop>,
    /// Schedule for each stop.
    pub visits: Vec<Visit>,
    /// Time the vehicle leaves its start location.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub start_time: Duration,
    /// Time the vehicle arrives back at the depot.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub end_time: Duration,
    /// Total driven distance in metres, depot return included.
    pub total_distance_m: u64,
    /// Sum of lateness penalties.
    pub total_penalty: u64,
    /// `false` when any visit violates its window.
    pub feasible: bool,
}

impl PlannedRoute {
    /// A route that visits nothing.
    #[must_use]
    pub const fn empty(vehicle_id: VehicleId, start_time: Duration) -> Self {
        Self {
            vehicle_id,
            stops: Vec::new(),
            visits: Vec::new(),
            start_time,
            end_time: start_time,
            total_distance_m: 0,
            total_penalty: 0,
            feasible: true,
        }
    }

    /// Elapsed time from departure to depot return.
    #[must_use]
    pub const fn total_duration(&self) -> Duration {
        self.end_time.saturating_sub(self.start_time)
    }

    /// Total cylinders delivered along the route.
    #[must_use]
    pub fn total_load(&self) -> Load {
        self.stops
            .iter()
            .fold(Load::new(), |acc, stop| acc.plus(&stop.demand))
    }

    /// Position of `stop` within the route.
    #[must_use]
    pub fn position_of(&self, stop: StopId) -> Option<usize> {
        self.stops.iter().position(|candidate| candidate.id == stop)
    }

    /// Scheduled visit for `stop`.
    #[must_use]
    pub fn visit(&self, stop: StopId) -> Option<&Visit> {
        self.visits.iter().find(|visit| visit.stop_id == stop)
    }

    /// `true` when every prefix of the route fits within `capacity`.
    #[must_use]
    pub fn respects_capacity(&self, capacity: &Load) -> bool {
        let mut carried = Load::new();
        self.stops.iter().all(|stop| {
            carried = carried.plus(&stop.demand);
            carried.fits_within(capacity)
        })
    }
}

/// Lifecycle of a route held by the dispatch store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RouteStatus {
    /// Planned but not yet released to the driver.
    #[default]
    Draft,
    /// Released to the driver.
    Published,
    /// The driver has started the route.
    InProgress,
    /// Every stop reached a terminal state.
    Completed,
    /// Abandoned before completion.
    Aborted,
}

impl RouteStatus {
    /// `true` while the route may still change.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Draft | Self::Published | Self::InProgress)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Published | Self::Aborted)
                | (Self::Published, Self::InProgress | Self::Aborted)
                | (Self::InProgress, Self::Completed | Self::Aborted)
        )
    }
}

/// A route owned by the dispatch store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    /// Store-assigned identifier.
    pub id: RouteId,
    /// Lifecycle status.
    pub status: RouteStatus,
    /// Stops and schedule.
    pub plan: PlannedRoute,
}

impl Route {
    /// Wrap a planned route as a new draft.
    #[must_use]
    pub const fn draft(id: RouteId, plan: PlannedRoute) -> Self {
        Self {
            id,
            status: RouteStatus::Draft,
            plan,
        }
    }

    /// Vehicle assigned to the route.
    #[must_use]
    pub const fn vehicle_id(&self) -> VehicleId {
        self.plan.vehicle_id
    }

    /// Look up a stop on the route.
    #[must_use]
    pub fn stop(&self, id: StopId) -> Option<&Stop> {
        self.plan.stops.iter().find(|stop| stop.id == id)
    }

    /// Stops that still need a visit, in route order.
    pub fn open_stops(&self) -> impl Iterator<Item = &Stop> + '_ {
        self.plan.stops.iter().filter(|stop| stop.status.is_open())
    }

    /// `true` when every stop is delivered, cancelled or failed.
    #[must_use]
    pub fn all_stops_settled(&self) -> bool {
        self.plan.stops.iter().all(|stop| {
            stop.status.is_terminal() || stop.status == crate::StopStatus::Failed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CylinderSize, TimeWindow};
    use geo::Coord;
    use rstest::rstest;

    fn stop(id: u64, qty: i64) -> Stop {
        Stop::new(
            StopId(id),
            Coord { x: 0.0, y: 0.0 },
            Load::single(CylinderSize::KG_20, qty),
            TimeWindow::all_day(),
        )
    }

    #[rstest]
    fn capacity_checked_on_every_prefix() {
        let mut plan = PlannedRoute::empty(VehicleId(1), Duration::ZERO);
        plan.stops = vec![stop(1, 3), stop(2, 3)];
        assert!(plan.respects_capacity(&Load::single(CylinderSize::KG_20, 6)));
        assert!(!plan.respects_capacity(&Load::single(CylinderSize::KG_20, 5)));
    }

    #[rstest]
    #[case(RouteStatus::Draft, RouteStatus::Published, true)]
    #[case(RouteStatus::Published, RouteStatus::InProgress, true)]
    #[case(RouteStatus::InProgress, RouteStatus::Completed, true)]
    #[case(RouteStatus::Completed, RouteStatus::InProgress, false)]
    #[case(RouteStatus::Draft, RouteStatus::Completed, false)]
    fn route_transitions(#[case] from: RouteStatus, #[case] to: RouteStatus, #[case] ok: bool) {
        assert_eq!(from.can_transition_to(to), ok);
    }

    #[rstest]
    fn empty_route_has_zero_duration() {
        let plan = PlannedRoute::empty(VehicleId(1), Duration::from_secs(3600));
        assert_eq!(plan.total_duration(), Duration::ZERO);
        assert!(plan.total_load().is_empty());
    }
}
