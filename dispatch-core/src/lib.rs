//! Core domain types for the cylinder dispatch engine.
//!
//! The crate holds the vocabulary shared by the solver, the routing
//! providers and the live dispatch engine: stops with demand and time
//! windows, vehicles with per-size capacity, planned routes, tracking
//! events, emergency requests and alerts. It also defines the narrow
//! boundary traits the rest of the workspace plugs into:
//!
//! - [`GeoCostProvider`] supplies travel durations and distances.
//! - [`Solver`] turns stops and vehicles into feasible routes.
//! - [`AlertSink`] receives unmet-SLA and failure conditions.
//! - [`Clock`] reports the current time of the planning day.
//!
//! Times of day are [`Duration`](std::time::Duration) offsets from the start
//! of the planning day; locations are [`geo::Coord`] values with
//! `x = longitude` and `y = latitude`.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod alert;
pub mod clock;
pub mod emergency;
pub mod geo_cost;
mod ids;
mod load;
mod route;
pub mod solver;
mod stop;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
mod time;
pub mod tracking;
mod vehicle;

pub use alert::{Alert, AlertCode, AlertSink, LogAlertSink, Severity};
pub use clock::{Clock, SystemClock};
pub use emergency::{EmergencyKind, EmergencyPriority, EmergencyRequest, EmergencyStatus};
pub use geo_cost::{CostMatrix, GeoCostError, GeoCostProvider};
pub use ids::{DriverId, EmergencyId, EventId, RouteId, StopId, SubscriberId, VehicleId};
pub use load::{CylinderSize, Load};
pub use route::{PlannedRoute, Route, RouteStatus, TimeWindowViolation, Visit};
pub use solver::{
    CancelSignal, Diagnostics, NeverCancelled, RejectionReason, SolveConstraints, SolveError,
    SolveRequest, SolveRequestValidationError, SolveResponse, Solver, StopRejection,
    UnassignedReason, UnassignedStop, VehicleRejection,
};
pub use stop::{Priority, Stop, StopStatus};
pub use time::TimeWindow;
#[cfg(feature = "serde")]
pub use time::serde_secs;
#[cfg(feature = "serde")]
pub use tracking::EventEnvelope;
pub use tracking::{EventKind, TrackingEvent, TrackingPayload};
pub use vehicle::Vehicle;
