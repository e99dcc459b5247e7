//! Real-time tracking events and their wire envelope.
//!
//! Events are immutable once created. Each carries the commit index the
//! dispatch store assigned within its route, which subscribers use to check
//! per-route ordering, and a globally unique [`EventId`] for de-duplication.

use std::time::Duration;

use geo::Coord;

use crate::{
    DriverId, EmergencyId, EmergencyKind, EventId, RouteId, RouteStatus, StopId, StopStatus,
};

/// Discriminant of a [`TrackingPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EventKind {
    /// Driver position update.
    LocationPing,
    /// Stop moved between non-terminal states.
    StopStatusChanged,
    /// Stop delivered.
    StopCompleted,
    /// Projected arrival falls behind the stop window.
    DelayDetected,
    /// Emergency stop injected into the route.
    EmergencyRaised,
    /// Route created.
    RoutePublished,
    /// Route re-optimised; earlier snapshots are stale.
    RouteReplaced,
    /// Route lifecycle change.
    RouteStatusChanged,
}

impl EventKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocationPing => "location_ping",
            Self::StopStatusChanged => "stop_status_changed",
            Self::StopCompleted => "stop_completed",
            Self::DelayDetected => "delay_detected",
            Self::EmergencyRaised => "emergency_raised",
            Self::RoutePublished => "route_published",
            Self::RouteReplaced => "route_replaced",
            Self::RouteStatusChanged => "route_status_changed",
        }
    }
}

/// Kind-specific content of a [`TrackingEvent`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum TrackingPayload {
    /// Driver position update.
    LocationPing {
        /// Reported position.
        position: Coord<f64>,
    },
    /// Stop moved between states other than delivery.
    StopStatusChanged {
        /// Previous status.
        from: StopStatus,
        /// New status.
        to: StopStatus,
    },
    /// Stop delivered.
    StopCompleted,
    /// Projected arrival is later than the stop window allows.
    DelayDetected {
        /// Projected service start.
        #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
        projected_arrival: Duration,
        /// Amount past the window's latest bound.
        #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
        delay: Duration,
    },
    /// Emergency stop injected into the route.
    EmergencyRaised {
        /// Originating request.
        emergency_id: EmergencyId,
        /// Emergency category.
        emergency_kind: EmergencyKind,
    },
    /// Route created.
    RoutePublished {
        /// Revision of the new route.
        revision: u64,
    },
    /// Route re-optimised.
    RouteReplaced {
        /// Revision after replacement.
        revision: u64,
    },
    /// Route lifecycle change.
    RouteStatusChanged {
        /// New status.
        status: RouteStatus,
    },
}

impl TrackingPayload {
    /// Discriminant of the payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::LocationPing { .. } => EventKind::LocationPing,
            Self::StopStatusChanged { .. } => EventKind::StopStatusChanged,
            Self::StopCompleted => EventKind::StopCompleted,
            Self::DelayDetected { .. } => EventKind::DelayDetected,
            Self::EmergencyRaised { .. } => EventKind::EmergencyRaised,
            Self::RoutePublished { .. } => EventKind::RoutePublished,
            Self::RouteReplaced { .. } => EventKind::RouteReplaced,
            Self::RouteStatusChanged { .. } => EventKind::RouteStatusChanged,
        }
    }
}

/// One committed change on a route.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackingEvent {
    /// Globally unique id; consumers de-duplicate on it.
    pub id: EventId,
    /// Route the event belongs to.
    pub route_id: RouteId,
    /// Stop concerned, if any.
    pub stop_id: Option<StopId>,
    /// Driver of the route at commit time.
    pub driver_id: Option<DriverId>,
    /// Per-route commit order, starting at 1.
    pub commit_index: u64,
    /// Commit time.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub timestamp: Duration,
    /// Kind-specific content.
    pub payload: TrackingPayload,
}

impl TrackingEvent {
    /// Discriminant of the payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Wire shape of a tracking event: `{type, routeId, stopId?, timestamp, payload}`.
///
/// `eventId` and `commitIndex` travel alongside so remote consumers can
/// de-duplicate and verify ordering.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Route id.
    pub route_id: RouteId,
    /// Stop id, omitted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<StopId>,
    /// Commit time in seconds.
    #[serde(with = "crate::serde_secs")]
    pub timestamp: Duration,
    /// Kind-specific content.
    pub payload: TrackingPayload,
    /// Event id.
    pub event_id: EventId,
    /// Per-route commit index.
    pub commit_index: u64,
}

#[cfg(feature = "serde")]
impl From<&TrackingEvent> for EventEnvelope {
    fn from(event: &TrackingEvent) -> Self {
        Self {
            kind: event.kind(),
            route_id: event.route_id,
            stop_id: event.stop_id,
            timestamp: event.timestamp,
            payload: event.payload.clone(),
            event_id: event.id,
            commit_index: event.commit_index,
        }
    }
}
