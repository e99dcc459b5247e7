//! Priority queue of emergency requests.
//!
//! Pending requests are ordered by priority tier (critical first), then by
//! creation time, then by id. A request leaves the ordering once assigned but
//! stays queryable until the queue is dropped, so its lifecycle can still be
//! completed or cancelled. Every operation takes a single short lock and does
//! no I/O while holding it.
//!
//! # Examples
//! ```
//! use std::time::Duration;
//!
//! use dispatch_core::{EmergencyId, EmergencyKind, EmergencyPriority, EmergencyRequest};
//! use dispatch_engine::EmergencyQueue;
//! use geo::Coord;
//!
//! let queue = EmergencyQueue::default();
//! let at = |minutes: u64| Duration::from_secs(minutes * 60);
//! let origin = Coord { x: 0.0, y: 0.0 };
//! queue.enqueue(EmergencyRequest::new(
//!     EmergencyId(1), EmergencyKind::UrgentDelivery, EmergencyPriority::High,
//!     origin, at(0), at(120),
//! ))?;
//! let ticket = queue.enqueue(EmergencyRequest::new(
//!     EmergencyId(2), EmergencyKind::GasLeak, EmergencyPriority::Critical,
//!     origin, at(5), at(35),
//! ))?;
//! assert_eq!(ticket.position, 1);
//! assert_eq!(queue.peek_next().map(|r| r.id), Some(EmergencyId(2)));
//! # Ok::<(), dispatch_engine::QueueError>(())
//! ```

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use dispatch_core::{
    EmergencyId, EmergencyPriority, EmergencyRequest, EmergencyStatus, RouteId, VehicleId,
};
use parking_lot::Mutex;
use thiserror::Error;

/// Tuning for [`EmergencyQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyQueueConfig {
    /// Expected time to handle one request; drives ticket estimates.
    pub handling_estimate: Duration,
}

impl Default for EmergencyQueueConfig {
    fn default() -> Self {
        Self {
            handling_estimate: Duration::from_secs(15 * 60),
        }
    }
}

impl EmergencyQueueConfig {
    /// Override the per-request handling estimate.
    #[must_use]
    pub const fn with_handling_estimate(mut self, estimate: Duration) -> Self {
        self.handling_estimate = estimate;
        self
    }
}

/// Errors from queue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No request has this id.
    #[error("unknown emergency request {0}")]
    UnknownRequest(EmergencyId),
    /// A request with this id was already enqueued.
    #[error("emergency request {0} is already queued")]
    Duplicate(EmergencyId),
    /// The lifecycle forbids the requested move.
    #[error("emergency request {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// Request concerned.
        id: EmergencyId,
        /// Current status.
        from: EmergencyStatus,
        /// Requested status.
        to: EmergencyStatus,
    },
}

/// Receipt returned to the dispatcher on enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTicket {
    /// Request id.
    pub id: EmergencyId,
    /// One-based position among pending requests.
    pub position: usize,
    /// Rough wait until the request is handled.
    pub estimated_handling: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<EmergencyPriority>,
    created_at: Duration,
    id: EmergencyId,
}

impl QueueKey {
    const fn of(request: &EmergencyRequest) -> Self {
        Self {
            priority: Reverse(request.priority),
            created_at: request.created_at,
            id: request.id,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: BTreeSet<QueueKey>,
    requests: HashMap<EmergencyId, EmergencyRequest>,
}

impl QueueState {
    fn transition(
        &mut self,
        id: EmergencyId,
        to: EmergencyStatus,
    ) -> Result<&mut EmergencyRequest, QueueError> {
        let request = self
            .requests
            .get_mut(&id)
            .ok_or(QueueError::UnknownRequest(id))?;
        let from = request.status;
        if !from.can_transition_to(to) {
            return Err(QueueError::InvalidTransition { id, from, to });
        }
        if from == EmergencyStatus::Pending {
            self.pending.remove(&QueueKey::of(request));
        }
        request.status = to;
        Ok(request)
    }

    fn position(&self, id: EmergencyId) -> Option<usize> {
        self.pending
            .iter()
            .position(|key| key.id == id)
            .map(|index| index + 1)
    }
}

/// Mutex-guarded emergency priority queue.
#[derive(Debug, Default)]
pub struct EmergencyQueue {
    config: EmergencyQueueConfig,
    state: Mutex<QueueState>,
}

impl EmergencyQueue {
    /// Empty queue.
    #[must_use]
    pub fn new(config: EmergencyQueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Add a request. Its status is reset to pending.
    ///
    /// # Errors
    /// [`QueueError::Duplicate`] when the id is already known.
    pub fn enqueue(&self, mut request: EmergencyRequest) -> Result<QueueTicket, QueueError> {
        let id = request.id;
        let mut state = self.state.lock();
        if state.requests.contains_key(&id) {
            return Err(QueueError::Duplicate(id));
        }
        request.status = EmergencyStatus::Pending;
        state.pending.insert(QueueKey::of(&request));
        log::info!(
            "queued {id} ({}, {:?}) due by {:?}",
            request.kind,
            request.priority,
            request.deadline
        );
        state.requests.insert(id, request);
        let position = state.position(id).unwrap_or(state.pending.len());
        Ok(QueueTicket {
            id,
            position,
            estimated_handling: self
                .config
                .handling_estimate
                .saturating_mul(u32::try_from(position).unwrap_or(u32::MAX)),
        })
    }

    /// Highest-ranked pending request.
    #[must_use]
    pub fn peek_next(&self) -> Option<EmergencyRequest> {
        let state = self.state.lock();
        let key = state.pending.first()?;
        state.requests.get(&key.id).cloned()
    }

    /// Pending requests, highest-ranked first.
    #[must_use]
    pub fn pending(&self) -> Vec<EmergencyRequest> {
        let state = self.state.lock();
        state
            .pending
            .iter()
            .filter_map(|key| state.requests.get(&key.id).cloned())
            .collect()
    }

    /// One-based rank of a pending request.
    #[must_use]
    pub fn position(&self, id: EmergencyId) -> Option<usize> {
        self.state.lock().position(id)
    }

    /// Any request by id, whatever its status.
    #[must_use]
    pub fn get(&self, id: EmergencyId) -> Option<EmergencyRequest> {
        self.state.lock().requests.get(&id).cloned()
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// `true` when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record that `vehicle_id` will serve the request on `route_id`.
    ///
    /// # Errors
    /// [`QueueError::UnknownRequest`] or [`QueueError::InvalidTransition`]
    /// unless the request is pending.
    pub fn assign(
        &self,
        id: EmergencyId,
        vehicle_id: VehicleId,
        route_id: RouteId,
    ) -> Result<EmergencyRequest, QueueError> {
        let mut state = self.state.lock();
        let request = state.transition(id, EmergencyStatus::Assigned)?;
        request.assigned_vehicle = Some(vehicle_id);
        request.assigned_route = Some(route_id);
        log::info!("{id} assigned to {vehicle_id} on {route_id}");
        Ok(request.clone())
    }

    /// Put an assigned request back in line after its stop was taken off
    /// the route. This is the only way back to pending.
    ///
    /// # Errors
    /// [`QueueError::UnknownRequest`], or [`QueueError::InvalidTransition`]
    /// unless the request is assigned.
    pub fn requeue(&self, id: EmergencyId) -> Result<EmergencyRequest, QueueError> {
        let mut state = self.state.lock();
        let request = state
            .requests
            .get_mut(&id)
            .ok_or(QueueError::UnknownRequest(id))?;
        if request.status != EmergencyStatus::Assigned {
            return Err(QueueError::InvalidTransition {
                id,
                from: request.status,
                to: EmergencyStatus::Pending,
            });
        }
        request.status = EmergencyStatus::Pending;
        request.assigned_vehicle = None;
        request.assigned_route = None;
        let requeued = request.clone();
        state.pending.insert(QueueKey::of(&requeued));
        log::warn!("{id} returned to the queue");
        Ok(requeued)
    }

    /// Record that the driver is on the way.
    ///
    /// # Errors
    /// [`QueueError::UnknownRequest`] or [`QueueError::InvalidTransition`].
    pub fn mark_dispatched(&self, id: EmergencyId) -> Result<EmergencyRequest, QueueError> {
        let mut state = self.state.lock();
        state
            .transition(id, EmergencyStatus::Dispatched)
            .map(|request| request.clone())
    }

    /// Record that the request was handled.
    ///
    /// # Errors
    /// [`QueueError::UnknownRequest`] or [`QueueError::InvalidTransition`].
    pub fn complete(&self, id: EmergencyId) -> Result<EmergencyRequest, QueueError> {
        let mut state = self.state.lock();
        let request = state.transition(id, EmergencyStatus::Completed)?;
        log::info!("{id} completed");
        Ok(request.clone())
    }

    /// Withdraw a pending or assigned request.
    ///
    /// # Errors
    /// [`QueueError::UnknownRequest`] or [`QueueError::InvalidTransition`]
    /// once the request has been dispatched.
    pub fn cancel(
        &self,
        id: EmergencyId,
        reason: impl Into<String>,
    ) -> Result<EmergencyRequest, QueueError> {
        let mut state = self.state.lock();
        let request = state.transition(id, EmergencyStatus::Cancelled)?;
        let why = reason.into();
        log::info!("{id} cancelled: {why}");
        request.cancel_reason = Some(why);
        Ok(request.clone())
    }

    /// Pending requests whose deadline has passed at `now`, highest-ranked
    /// first.
    #[must_use]
    pub fn pending_overdue(&self, now: Duration) -> Vec<EmergencyRequest> {
        self.pending()
            .into_iter()
            .filter(|request| request.is_overdue(now))
            .collect()
    }
}
