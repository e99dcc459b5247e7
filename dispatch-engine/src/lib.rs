//! Live dispatch engine for cylinder delivery routes.
//!
//! The engine keeps the authoritative state of every route on the road and
//! reacts to what happens after a plan is published:
//!
//! - [`DispatchStore`] owns routes and commits each change as a revisioned
//!   snapshot plus a [`TrackingEvent`](dispatch_core::TrackingEvent).
//! - [`LiveTracker`] fans events out to subscribers with per-subscriber
//!   outboxes, replay on reconnect and heartbeat expiry.
//! - [`EmergencyQueue`] orders emergency requests by priority and age.
//! - [`IngestTable`] applies driver messages through one handler per kind.
//! - [`DispatchCoordinator`] wires these together with the solver, running
//!   planning cycles and emergency insertion on Tokio's blocking pool.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod coordinator;
mod emergency;
mod ingest;
mod store;
mod tracker;

pub use coordinator::{
    AssignOutcome, BackgroundTasks, CoordinatorConfig, CoordinatorError, DispatchCoordinator,
    PlanReport, SharedGeoCostProvider, SubmitReport,
};
pub use emergency::{EmergencyQueue, EmergencyQueueConfig, QueueError, QueueTicket};
pub use ingest::{
    DelayReportHandler, DriverMessage, IngestConfig, IngestContext, IngestError, IngestHandler,
    IngestOutcome, IngestTable, LocationHandler, MessageKind, StatusHandler,
};
pub use store::{ChangeListener, DispatchStore, RouteSnapshot, StoreError};
pub use tracker::{
    CloseReason, Cursors, Delivery, LiveTracker, SubscriptionFilter, SubscriptionHandle,
    TrackerConfig, TrackerError,
};
