//! Solver boundary: requests, responses, per-item outcomes and errors.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use geo::Coord;
use thiserror::Error;

use crate::{GeoCostError, PlannedRoute, Stop, StopId, Vehicle, VehicleId};

/// Constraints applied to every route of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveConstraints {
    /// Upper bound on departure-to-return time; `None` leaves only the shift.
    #[cfg_attr(feature = "serde", serde(default, with = "optional_secs"))]
    pub max_route_duration: Option<Duration>,
    /// Permit late service with a recorded penalty instead of rejecting it.
    #[cfg_attr(feature = "serde", serde(default))]
    pub soft_time_windows: bool,
}

/// Everything a solver needs for one planning cycle.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use dispatch_core::{SolveConstraints, SolveRequest};
///
/// let request = SolveRequest::new(Coord { x: 0.0, y: 0.0 });
/// assert!(request.stops.is_empty());
/// assert_eq!(request.constraints, SolveConstraints::default());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveRequest {
    /// Shared depot for vehicles without a home depot.
    pub depot: Coord<f64>,
    /// Stops to place.
    #[cfg_attr(feature = "serde", serde(default))]
    pub stops: Vec<Stop>,
    /// Available fleet.
    #[cfg_attr(feature = "serde", serde(default))]
    pub vehicles: Vec<Vehicle>,
    /// Route-wide constraints.
    #[cfg_attr(feature = "serde", serde(default))]
    pub constraints: SolveConstraints,
}

impl SolveRequest {
    /// An empty request around `depot`.
    #[must_use]
    pub const fn new(depot: Coord<f64>) -> Self {
        Self {
            depot,
            stops: Vec::new(),
            vehicles: Vec::new(),
            constraints: SolveConstraints {
                max_route_duration: None,
                soft_time_windows: false,
            },
        }
    }

    /// Validate the request, reporting every offending stop and vehicle.
    ///
    /// # Errors
    /// Returns [`SolveRequestValidationError`] listing each rejection.
    pub fn validate_detailed(&self) -> Result<(), SolveRequestValidationError> {
        let mut seen = BTreeSet::new();
        let stops: Vec<StopRejection> = self
            .stops
            .iter()
            .filter_map(|stop| {
                let reason = if seen.insert(stop.id) {
                    StopRejection::check(stop)
                } else {
                    Some(RejectionReason::DuplicateStop)
                };
                reason.map(|reason| StopRejection {
                    stop_id: stop.id,
                    reason,
                })
            })
            .collect();
        let vehicles: Vec<VehicleRejection> = self
            .vehicles
            .iter()
            .filter_map(VehicleRejection::check)
            .collect();
        if stops.is_empty() && vehicles.is_empty() {
            Ok(())
        } else {
            Err(SolveRequestValidationError { stops, vehicles })
        }
    }
}

/// Why a stop was rejected before solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RejectionReason {
    /// `earliest > latest`.
    InvalidWindow,
    /// Negative or missing demand.
    InvalidDemand,
    /// The stop id appears more than once.
    DuplicateStop,
    /// The id falls in the range kept for emergency stops.
    ReservedId,
}

impl RejectionReason {
    /// Wire code for the reason.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidWindow => "INVALID_WINDOW",
            Self::InvalidDemand => "INVALID_DEMAND",
            Self::DuplicateStop => "DUPLICATE_STOP",
            Self::ReservedId => "RESERVED_ID",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A stop refused by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StopRejection {
    /// Offending stop.
    pub stop_id: StopId,
    /// Reason code.
    pub reason: RejectionReason,
}

impl StopRejection {
    /// Check a single stop in isolation.
    ///
    /// Zero demand is accepted: the stop may be a pickup or inspection.
    #[must_use]
    pub fn check(stop: &Stop) -> Option<RejectionReason> {
        if !stop.window.is_valid() {
            Some(RejectionReason::InvalidWindow)
        } else if stop.demand.has_negative() {
            Some(RejectionReason::InvalidDemand)
        } else {
            None
        }
    }
}

/// A vehicle refused by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum VehicleRejection {
    /// Capacity is empty or negative.
    InvalidCapacity {
        /// Offending vehicle.
        vehicle_id: VehicleId,
    },
    /// Shift ends before it starts.
    InvalidShift {
        /// Offending vehicle.
        vehicle_id: VehicleId,
    },
}

impl VehicleRejection {
    /// Check a single vehicle in isolation.
    #[must_use]
    pub fn check(vehicle: &Vehicle) -> Option<Self> {
        if !vehicle.capacity.is_positive() {
            Some(Self::InvalidCapacity {
                vehicle_id: vehicle.id,
            })
        } else if !vehicle.shift.is_valid() {
            Some(Self::InvalidShift {
                vehicle_id: vehicle.id,
            })
        } else {
            None
        }
    }
}

/// Validation failures for a [`SolveRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} stop(s) and {} vehicle(s) rejected", stops.len(), vehicles.len())]
pub struct SolveRequestValidationError {
    /// Rejected stops, in request order.
    pub stops: Vec<StopRejection>,
    /// Rejected vehicles, in request order.
    pub vehicles: Vec<VehicleRejection>,
}

/// Why a valid stop could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum UnassignedReason {
    /// No vehicle has room for the demand.
    NoCapacity,
    /// No route reaches the stop inside its window.
    TimeWindow,
    /// Every feasible insertion breaks the route duration or shift limit.
    MaxRouteDuration,
}

impl UnassignedReason {
    /// Wire code for the reason.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NoCapacity => "NO_CAPACITY",
            Self::TimeWindow => "TIME_WINDOW",
            Self::MaxRouteDuration => "MAX_ROUTE_DURATION",
        }
    }
}

impl std::fmt::Display for UnassignedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A stop left out of every route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnassignedStop {
    /// Stop that could not be placed.
    pub stop_id: StopId,
    /// Dominant reason.
    pub reason: UnassignedReason,
}

/// Solver statistics for one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostics {
    /// Wall-clock solve time.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub solve_time: Duration,
    /// Local-search passes run.
    pub improvement_passes: u32,
    /// Improving moves applied.
    pub moves_applied: u32,
    /// Sum of route distances in metres.
    pub total_distance_m: u64,
    /// Sum of lateness penalties.
    pub total_penalty: u64,
}

/// Result of a successful solve.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolveResponse {
    /// One route per vehicle that received stops, in vehicle id order.
    pub routes: Vec<PlannedRoute>,
    /// Stops that could not be placed.
    pub unassigned: Vec<UnassignedStop>,
    /// Solver statistics.
    pub diagnostics: Diagnostics,
}

impl SolveResponse {
    /// Objective value: distance plus lateness penalty.
    #[must_use]
    pub fn total_cost(&self) -> u64 {
        self.routes.iter().fold(0_u64, |acc, route| {
            acc.saturating_add(route.total_distance_m)
                .saturating_add(route.total_penalty)
        })
    }

    /// Route serving `stop`, if any.
    #[must_use]
    pub fn route_for(&self, stop: StopId) -> Option<&PlannedRoute> {
        self.routes
            .iter()
            .find(|route| route.position_of(stop).is_some())
    }
}

/// Errors returned by [`Solver::solve`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// The request was malformed; nothing was solved.
    #[error("invalid request: {0}")]
    Validation(#[from] SolveRequestValidationError),
    /// Travel costs could not be fetched.
    #[error("travel costs unavailable: {0}")]
    Transport(#[from] GeoCostError),
    /// The solve was abandoned; any partial result was discarded.
    #[error("solve cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag polled by long-running solves.
pub trait CancelSignal: Sync {
    /// `true` once the caller no longer wants the result.
    fn is_cancelled(&self) -> bool;
}

/// A [`CancelSignal`] that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl CancelSignal for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl CancelSignal for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

/// Turn stops and vehicles into feasible routes.
///
/// Solvers must be `Send + Sync` so they can run on blocking worker threads.
pub trait Solver: Send + Sync {
    /// Solve a request, polling `cancel` between phases and moves.
    ///
    /// # Errors
    /// See [`SolveError`].
    fn solve_with_cancel(
        &self,
        request: &SolveRequest,
        cancel: &dyn CancelSignal,
    ) -> Result<SolveResponse, SolveError>;

    /// Solve a request to completion.
    ///
    /// # Errors
    /// See [`SolveError`].
    fn solve(&self, request: &SolveRequest) -> Result<SolveResponse, SolveError> {
        self.solve_with_cancel(request, &NeverCancelled)
    }
}

#[cfg(feature = "serde")]
mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}
