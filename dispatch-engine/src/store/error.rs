use dispatch_core::{RouteId, RouteStatus, StopId, StopStatus};
use thiserror::Error;

/// Errors returned by [`DispatchStore`](super::DispatchStore) mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No route with this id is held.
    #[error("unknown route {0}")]
    UnknownRoute(RouteId),
    /// The route does not contain the stop.
    #[error("{route_id} has no stop {stop_id}")]
    UnknownStop {
        /// Route searched.
        route_id: RouteId,
        /// Missing stop.
        stop_id: StopId,
    },
    /// The route was replaced after the caller read it; re-fetch and retry.
    #[error("{route_id} is at revision {actual}, caller read revision {expected}")]
    StaleRoute {
        /// Route concerned.
        route_id: RouteId,
        /// Revision the caller based its change on.
        expected: u64,
        /// Current revision.
        actual: u64,
    },
    /// The stop cannot move between these states.
    #[error("{stop_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// Stop concerned.
        stop_id: StopId,
        /// Current status.
        from: StopStatus,
        /// Requested status.
        to: StopStatus,
    },
    /// The route cannot move between these lifecycle states.
    #[error("{route_id} cannot move from {from:?} to {to:?}")]
    InvalidRouteTransition {
        /// Route concerned.
        route_id: RouteId,
        /// Current status.
        from: RouteStatus,
        /// Requested status.
        to: RouteStatus,
    },
}
