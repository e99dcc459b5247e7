//! Driver message ingestion.
//!
//! Messages from driver devices are a closed [`DriverMessage`] union. The
//! [`IngestTable`] maps each [`MessageKind`] to one [`IngestHandler`], so
//! every handler can be exercised on its own and a deployment can swap a
//! single handler without touching the others.

mod handlers;

use std::collections::BTreeMap;
use std::time::Duration;

use dispatch_core::{Clock, GeoCostProvider, RouteId, StopId, StopStatus};
use geo::Coord;
use thiserror::Error;

pub use handlers::{DelayReportHandler, LocationHandler, StatusHandler};

use crate::store::{DispatchStore, StoreError};

/// A message received from a driver device.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverMessage {
    /// Periodic vehicle position.
    LocationPing {
        /// Route being driven.
        route_id: RouteId,
        /// Reported position.
        position: Coord<f64>,
    },
    /// The driver reached a stop.
    StopArrived {
        /// Route being driven.
        route_id: RouteId,
        /// Stop reached.
        stop_id: StopId,
    },
    /// The delivery was handed over.
    StopCompleted {
        /// Route being driven.
        route_id: RouteId,
        /// Stop served.
        stop_id: StopId,
    },
    /// The delivery could not be made.
    StopFailed {
        /// Route being driven.
        route_id: RouteId,
        /// Stop concerned.
        stop_id: StopId,
        /// Free-text explanation from the driver.
        reason: String,
    },
    /// The driver expects to be late.
    DelayReport {
        /// Route being driven.
        route_id: RouteId,
        /// Stop that will be late.
        stop_id: StopId,
        /// Expected delay against the plan.
        delay: Duration,
    },
}

/// Discriminant of [`DriverMessage`], used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageKind {
    /// [`DriverMessage::LocationPing`].
    LocationPing,
    /// [`DriverMessage::StopArrived`].
    StopArrived,
    /// [`DriverMessage::StopCompleted`].
    StopCompleted,
    /// [`DriverMessage::StopFailed`].
    StopFailed,
    /// [`DriverMessage::DelayReport`].
    DelayReport,
}

impl DriverMessage {
    /// Dispatch key of the message.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::LocationPing { .. } => MessageKind::LocationPing,
            Self::StopArrived { .. } => MessageKind::StopArrived,
            Self::StopCompleted { .. } => MessageKind::StopCompleted,
            Self::StopFailed { .. } => MessageKind::StopFailed,
            Self::DelayReport { .. } => MessageKind::DelayReport,
        }
    }

    /// Route the message concerns.
    #[must_use]
    pub const fn route_id(&self) -> RouteId {
        match self {
            Self::LocationPing { route_id, .. }
            | Self::StopArrived { route_id, .. }
            | Self::StopCompleted { route_id, .. }
            | Self::StopFailed { route_id, .. }
            | Self::DelayReport { route_id, .. } => *route_id,
        }
    }
}

/// Tuning for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestConfig {
    /// Projected lateness against the plan that raises a delay event.
    pub delay_threshold: Duration,
    /// Attempts at a status update when the route keeps being replaced.
    pub stale_retry_attempts: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delay_threshold: Duration::from_secs(5 * 60),
            stale_retry_attempts: 3,
        }
    }
}

impl IngestConfig {
    /// Override the delay threshold.
    #[must_use]
    pub const fn with_delay_threshold(mut self, threshold: Duration) -> Self {
        self.delay_threshold = threshold;
        self
    }
}

/// Collaborators available to a handler.
#[derive(Clone, Copy)]
pub struct IngestContext<'a> {
    /// Route state.
    pub store: &'a DispatchStore,
    /// Travel times for ETA projection.
    pub geo: &'a dyn GeoCostProvider,
    /// Current time of day.
    pub clock: &'a dyn Clock,
    /// Thresholds.
    pub config: &'a IngestConfig,
}

impl std::fmt::Debug for IngestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestContext")
            .field("store", self.store)
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

/// What a handled message changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The message was recorded with no further consequence.
    Recorded,
    /// A stop moved to a new status.
    StatusChanged {
        /// Route concerned.
        route_id: RouteId,
        /// Stop concerned.
        stop_id: StopId,
        /// New status.
        status: StopStatus,
    },
    /// A stop is projected to be late.
    DelayDetected {
        /// Route concerned.
        route_id: RouteId,
        /// Stop that will be late.
        stop_id: StopId,
        /// Projected lateness against the plan.
        delay: Duration,
    },
}

/// Errors from ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The store refused the change.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// No handler is registered for the message kind.
    #[error("no handler registered for {0:?} messages")]
    Unhandled(MessageKind),
    /// The route was replaced on every attempt.
    #[error("{route_id} was replaced during each of {attempts} update attempt(s)")]
    StaleAfterRetries {
        /// Route concerned.
        route_id: RouteId,
        /// Attempts made.
        attempts: u32,
    },
}

/// Handles one kind of driver message.
pub trait IngestHandler: Send + Sync {
    /// Apply `message` through `ctx`.
    ///
    /// # Errors
    /// See [`IngestError`].
    fn handle(
        &self,
        ctx: &IngestContext<'_>,
        message: &DriverMessage,
    ) -> Result<IngestOutcome, IngestError>;

    /// Release any per-route state once the route has left the store.
    fn forget_route(&self, _route_id: RouteId) {}
}

/// Dispatch table from message kind to handler.
pub struct IngestTable {
    handlers: BTreeMap<MessageKind, Box<dyn IngestHandler>>,
}

impl std::fmt::Debug for IngestTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestTable")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for IngestTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl IngestTable {
    /// A table with no handlers.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// The stock handler for every message kind.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with_handler(MessageKind::LocationPing, LocationHandler::default())
            .with_handler(
                MessageKind::StopArrived,
                StatusHandler::new(StopStatus::Arrived),
            )
            .with_handler(
                MessageKind::StopCompleted,
                StatusHandler::new(StopStatus::Delivered),
            )
            .with_handler(
                MessageKind::StopFailed,
                StatusHandler::new(StopStatus::Failed),
            )
            .with_handler(MessageKind::DelayReport, DelayReportHandler)
    }

    /// Register or replace the handler for `kind`.
    #[must_use]
    pub fn with_handler(mut self, kind: MessageKind, handler: impl IngestHandler + 'static) -> Self {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    /// Route `message` to its handler.
    ///
    /// # Errors
    /// [`IngestError::Unhandled`] when no handler is registered, otherwise
    /// whatever the handler reports.
    pub fn dispatch(
        &self,
        ctx: &IngestContext<'_>,
        message: &DriverMessage,
    ) -> Result<IngestOutcome, IngestError> {
        let kind = message.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(IngestError::Unhandled(kind))?;
        handler.handle(ctx, message)
    }

    /// Tell every handler that `route_id` is gone.
    pub fn forget_route(&self, route_id: RouteId) {
        for handler in self.handlers.values() {
            handler.forget_route(route_id);
        }
    }
}
