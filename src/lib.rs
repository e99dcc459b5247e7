//! Facade crate for the cylinder dispatch and route engine.
//!
//! This crate re-exports the core domain types and exposes the solver, the
//! OSRM travel cost provider and the live dispatch engine behind feature
//! flags.

#![forbid(unsafe_code)]

pub use dispatch_core::{
    Alert, AlertCode, AlertSink, CancelSignal, Clock, CostMatrix, CylinderSize, Diagnostics,
    DriverId, EmergencyId, EmergencyKind, EmergencyPriority, EmergencyRequest, EmergencyStatus,
    EventId, EventKind, GeoCostError, GeoCostProvider, Load, LogAlertSink, NeverCancelled,
    PlannedRoute, Priority, RejectionReason, Route, RouteId, RouteStatus, Severity,
    SolveConstraints, SolveError, SolveRequest, SolveRequestValidationError, SolveResponse,
    Solver, Stop, StopId, StopRejection, StopStatus, SubscriberId, SystemClock, TimeWindow,
    TrackingEvent, TrackingPayload, UnassignedReason, UnassignedStop, Vehicle, VehicleId,
    VehicleRejection, Visit,
};

#[cfg(feature = "solver")]
pub use dispatch_solver::{InsertionSolver, InsertionSolverConfig, RouteInsertion};

#[cfg(feature = "http-provider")]
pub use dispatch_data::routing::{
    HttpGeoCostProvider, HttpGeoCostProviderConfig, ProviderBuildError, RetryPolicy,
    RetryingGeoCostProvider,
};

#[cfg(feature = "engine")]
pub use dispatch_engine::{
    AssignOutcome, CoordinatorConfig, CoordinatorError, Delivery, DispatchCoordinator,
    DispatchStore, DriverMessage, EmergencyQueue, LiveTracker, SubscriptionFilter,
    SubscriptionHandle,
};
