//! Authoritative in-memory route state.
//!
//! Each route lives in its own slot behind a mutex, so writers to one route
//! never wait on another. Readers receive an `Arc` snapshot taken under the
//! slot lock and therefore never observe a half-applied change.
//!
//! Every successful mutation assigns the next per-route commit index, builds
//! a [`TrackingEvent`] and hands it to the [`ChangeListener`] while the slot
//! is still locked. Listeners therefore see each route's events in commit
//! order.
//!
//! Stop status updates carry the revision the caller read. Replacing a
//! route bumps its revision, so an update based on the old plan fails with
//! [`StoreError::StaleRoute`] instead of overwriting the re-optimised one.

mod error;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dispatch_core::{
    Clock, DriverId, EmergencyId, EmergencyKind, EventId, PlannedRoute, Route, RouteId,
    RouteStatus, StopId, StopStatus, TrackingEvent, TrackingPayload, VehicleId,
};
use geo::Coord;
use parking_lot::{Mutex, RwLock};

pub use error::StoreError;

/// Receives every committed change.
///
/// Called while the route's slot is locked; implementations must not block
/// and must not call back into the store.
pub trait ChangeListener: Send + Sync {
    /// Observe one committed event.
    fn on_commit(&self, event: &TrackingEvent);
}

/// Consistent view of one route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSnapshot {
    /// Route content at `revision`.
    pub route: Arc<Route>,
    /// Bumped whenever the route is replaced; starts at 1.
    pub revision: u64,
    /// Index of the last committed event.
    pub commit_index: u64,
    /// Driver assigned to the route.
    pub driver: Option<DriverId>,
    /// Last reported vehicle position.
    pub position: Option<Coord<f64>>,
}

impl RouteSnapshot {
    /// Route identifier.
    #[must_use]
    pub fn id(&self) -> RouteId {
        self.route.id
    }
}

#[derive(Debug)]
struct Slot {
    route: Arc<Route>,
    revision: u64,
    commit_index: u64,
    driver: Option<DriverId>,
    position: Option<Coord<f64>>,
    finished_at: Option<Duration>,
}

impl Slot {
    fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            route: Arc::clone(&self.route),
            revision: self.revision,
            commit_index: self.commit_index,
            driver: self.driver,
            position: self.position,
        }
    }
}

/// Route store with per-route serialised writes.
pub struct DispatchStore {
    slots: RwLock<BTreeMap<RouteId, Arc<Mutex<Slot>>>>,
    next_route: AtomicU64,
    next_event: AtomicU64,
    clock: Arc<dyn Clock>,
    listener: Arc<dyn ChangeListener>,
}

impl std::fmt::Debug for DispatchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchStore")
            .field("routes", &self.slots.read().len())
            .field("next_route", &self.next_route)
            .field("next_event", &self.next_event)
            .finish_non_exhaustive()
    }
}

impl DispatchStore {
    /// Empty store publishing changes to `listener`.
    pub fn new(clock: Arc<dyn Clock>, listener: Arc<dyn ChangeListener>) -> Self {
        Self {
            slots: RwLock::new(BTreeMap::new()),
            next_route: AtomicU64::new(1),
            next_event: AtomicU64::new(1),
            clock,
            listener,
        }
    }

    fn slot(&self, id: RouteId) -> Result<Arc<Mutex<Slot>>, StoreError> {
        self.slots
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownRoute(id))
    }

    /// Assign the next commit index and notify the listener. Caller holds the
    /// slot lock.
    fn commit(
        &self,
        slot: &mut Slot,
        stop_id: Option<StopId>,
        payload: TrackingPayload,
    ) -> TrackingEvent {
        slot.commit_index += 1;
        let event = TrackingEvent {
            id: EventId(self.next_event.fetch_add(1, Ordering::Relaxed)),
            route_id: slot.route.id,
            stop_id,
            driver_id: slot.driver,
            commit_index: slot.commit_index,
            timestamp: self.clock.now(),
            payload,
        };
        if let TrackingPayload::RouteStatusChanged { status } = event.payload
            && !status.is_active()
        {
            slot.finished_at = Some(event.timestamp);
        }
        log::trace!(
            "{} commit {} {}",
            event.route_id,
            event.commit_index,
            event.kind().as_str()
        );
        self.listener.on_commit(&event);
        event
    }

    /// Store `plan` as a new draft route.
    pub fn create_route(&self, plan: PlannedRoute, driver: Option<DriverId>) -> RouteSnapshot {
        let id = RouteId(self.next_route.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(Mutex::new(Slot {
            route: Arc::new(Route::draft(id, plan)),
            revision: 1,
            commit_index: 0,
            driver,
            position: None,
            finished_at: None,
        }));
        // Publish under the slot lock so no later event can overtake this one.
        let mut guard = slot.lock();
        self.slots.write().insert(id, Arc::clone(&slot));
        self.commit(&mut guard, None, TrackingPayload::RoutePublished { revision: 1 });
        log::info!(
            "created {id} for {} with {} stop(s)",
            guard.route.vehicle_id(),
            guard.route.plan.stops.len()
        );
        guard.snapshot()
    }

    /// Current snapshot of a route.
    #[must_use]
    pub fn get_route(&self, id: RouteId) -> Option<RouteSnapshot> {
        let slot = self.slots.read().get(&id).cloned()?;
        let guard = slot.lock();
        Some(guard.snapshot())
    }

    /// Move one stop to `status`.
    ///
    /// Repeating the stop's current status is accepted without emitting an
    /// event, so redelivered driver messages are harmless. The first stop to
    /// make progress moves a published route to in-progress; settling the
    /// last stop completes it.
    ///
    /// # Errors
    /// [`StoreError::StaleRoute`] when `expected_revision` is out of date,
    /// [`StoreError::UnknownRoute`], [`StoreError::UnknownStop`], or
    /// [`StoreError::InvalidTransition`] when the status table forbids it.
    pub fn update_stop_status(
        &self,
        route_id: RouteId,
        stop_id: StopId,
        expected_revision: u64,
        status: StopStatus,
    ) -> Result<RouteSnapshot, StoreError> {
        let slot = self.slot(route_id)?;
        let mut guard = slot.lock();
        if guard.revision != expected_revision {
            log::debug!(
                "rejecting stale update of {stop_id} on {route_id}: revision {} != {expected_revision}",
                guard.revision
            );
            return Err(StoreError::StaleRoute {
                route_id,
                expected: expected_revision,
                actual: guard.revision,
            });
        }
        let from = guard
            .route
            .stop(stop_id)
            .map(|stop| stop.status)
            .ok_or(StoreError::UnknownStop { route_id, stop_id })?;
        if from == status {
            return Ok(guard.snapshot());
        }
        if !from.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                stop_id,
                from,
                to: status,
            });
        }

        let mut route = Route::clone(&guard.route);
        for stop in route.plan.stops.iter_mut().filter(|stop| stop.id == stop_id) {
            stop.status = status;
        }
        let started = route.status == RouteStatus::Published
            && matches!(
                status,
                StopStatus::EnRoute | StopStatus::Arrived | StopStatus::Delivered
            );
        if started {
            route.status = RouteStatus::InProgress;
        }
        let finished = route.status == RouteStatus::InProgress && route.all_stops_settled();
        if finished {
            route.status = RouteStatus::Completed;
        }
        guard.route = Arc::new(route);

        if started {
            self.commit(
                &mut guard,
                None,
                TrackingPayload::RouteStatusChanged {
                    status: RouteStatus::InProgress,
                },
            );
        }
        let payload = if status == StopStatus::Delivered {
            TrackingPayload::StopCompleted
        } else {
            TrackingPayload::StopStatusChanged { from, to: status }
        };
        self.commit(&mut guard, Some(stop_id), payload);
        if finished {
            self.commit(
                &mut guard,
                None,
                TrackingPayload::RouteStatusChanged {
                    status: RouteStatus::Completed,
                },
            );
        }
        Ok(guard.snapshot())
    }

    /// Swap in a re-optimised plan and bump the revision.
    ///
    /// Delivery progress survives: stops already arrived at or settled that
    /// the new plan omits are kept at the front in their original order, and
    /// stops present in both keep their current status.
    ///
    /// # Errors
    /// [`StoreError::UnknownRoute`].
    pub fn replace_route(
        &self,
        route_id: RouteId,
        plan: PlannedRoute,
    ) -> Result<RouteSnapshot, StoreError> {
        let slot = self.slot(route_id)?;
        let mut guard = slot.lock();
        let merged = merge_progress(&guard.route, plan);
        guard.route = Arc::new(Route {
            id: route_id,
            status: guard.route.status,
            plan: merged,
        });
        guard.revision += 1;
        let revision = guard.revision;
        self.commit(&mut guard, None, TrackingPayload::RouteReplaced { revision });
        log::info!("replaced {route_id}, now at revision {revision}");
        Ok(guard.snapshot())
    }

    /// Move a route through its lifecycle.
    ///
    /// # Errors
    /// [`StoreError::UnknownRoute`] or [`StoreError::InvalidRouteTransition`].
    pub fn set_route_status(
        &self,
        route_id: RouteId,
        status: RouteStatus,
    ) -> Result<RouteSnapshot, StoreError> {
        let slot = self.slot(route_id)?;
        let mut guard = slot.lock();
        let from = guard.route.status;
        if from == status {
            return Ok(guard.snapshot());
        }
        if !from.can_transition_to(status) {
            return Err(StoreError::InvalidRouteTransition {
                route_id,
                from,
                to: status,
            });
        }
        let mut route = Route::clone(&guard.route);
        route.status = status;
        guard.route = Arc::new(route);
        self.commit(&mut guard, None, TrackingPayload::RouteStatusChanged { status });
        Ok(guard.snapshot())
    }

    /// Record the vehicle's latest position.
    ///
    /// # Errors
    /// [`StoreError::UnknownRoute`].
    pub fn record_location(
        &self,
        route_id: RouteId,
        position: Coord<f64>,
    ) -> Result<TrackingEvent, StoreError> {
        let slot = self.slot(route_id)?;
        let mut guard = slot.lock();
        guard.position = Some(position);
        Ok(self.commit(&mut guard, None, TrackingPayload::LocationPing { position }))
    }

    /// Record that `stop_id` is projected to be served late.
    ///
    /// # Errors
    /// [`StoreError::UnknownRoute`] or [`StoreError::UnknownStop`].
    pub fn record_delay(
        &self,
        route_id: RouteId,
        stop_id: StopId,
        projected_arrival: Duration,
        delay: Duration,
    ) -> Result<TrackingEvent, StoreError> {
        let slot = self.slot(route_id)?;
        let mut guard = slot.lock();
        if guard.route.stop(stop_id).is_none() {
            return Err(StoreError::UnknownStop { route_id, stop_id });
        }
        log::info!("{stop_id} on {route_id} projected {delay:?} late");
        Ok(self.commit(
            &mut guard,
            Some(stop_id),
            TrackingPayload::DelayDetected {
                projected_arrival,
                delay,
            },
        ))
    }

    /// Record that an emergency stop now sits on the route.
    ///
    /// # Errors
    /// [`StoreError::UnknownRoute`] or [`StoreError::UnknownStop`] when the
    /// route does not carry the emergency's stop.
    pub fn record_emergency(
        &self,
        route_id: RouteId,
        emergency_id: EmergencyId,
        emergency_kind: EmergencyKind,
    ) -> Result<TrackingEvent, StoreError> {
        let stop_id = StopId::for_emergency(emergency_id);
        let slot = self.slot(route_id)?;
        let mut guard = slot.lock();
        if guard.route.stop(stop_id).is_none() {
            return Err(StoreError::UnknownStop { route_id, stop_id });
        }
        Ok(self.commit(
            &mut guard,
            Some(stop_id),
            TrackingPayload::EmergencyRaised {
                emergency_id,
                emergency_kind,
            },
        ))
    }

    /// Snapshots of draft, published and in-progress routes, by id.
    #[must_use]
    pub fn list_active_routes(&self) -> Vec<RouteSnapshot> {
        let slots: Vec<_> = self.slots.read().values().cloned().collect();
        slots
            .iter()
            .map(|slot| slot.lock().snapshot())
            .filter(|snapshot| snapshot.route.status.is_active())
            .collect()
    }

    /// Active route driven by `vehicle_id`, if any.
    #[must_use]
    pub fn active_route_for(&self, vehicle_id: VehicleId) -> Option<RouteSnapshot> {
        self.list_active_routes()
            .into_iter()
            .find(|snapshot| snapshot.route.vehicle_id() == vehicle_id)
    }

    /// Drop completed and aborted routes that finished at or before
    /// `cutoff`. Returns the ids removed, in id order.
    pub fn prune_finished(&self, cutoff: Duration) -> Vec<RouteId> {
        let mut slots = self.slots.write();
        let expired: Vec<RouteId> = slots
            .iter()
            .filter(|(_, slot)| slot.lock().finished_at.is_some_and(|at| at <= cutoff))
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            slots.remove(id);
        }
        if !expired.is_empty() {
            log::debug!("pruned {} finished route(s)", expired.len());
        }
        expired
    }

    /// Drop a route from the store without emitting an event.
    ///
    /// # Errors
    /// [`StoreError::UnknownRoute`].
    pub fn remove_route(&self, route_id: RouteId) -> Result<RouteSnapshot, StoreError> {
        let slot = self
            .slots
            .write()
            .remove(&route_id)
            .ok_or(StoreError::UnknownRoute(route_id))?;
        let guard = slot.lock();
        Ok(guard.snapshot())
    }
}

fn merge_progress(current: &Route, mut plan: PlannedRoute) -> PlannedRoute {
    let planned: BTreeSet<StopId> = plan.stops.iter().map(|stop| stop.id).collect();
    let kept: Vec<_> = current
        .plan
        .stops
        .iter()
        .filter(|stop| !stop.status.is_open() && !planned.contains(&stop.id))
        .cloned()
        .collect();
    let kept_ids: BTreeSet<StopId> = kept.iter().map(|stop| stop.id).collect();
    let kept_visits: Vec<_> = current
        .plan
        .visits
        .iter()
        .filter(|visit| kept_ids.contains(&visit.stop_id))
        .cloned()
        .collect();

    for stop in &mut plan.stops {
        if let Some(previous) = current.stop(stop.id) {
            stop.status = previous.status;
        }
    }
    if kept.is_empty() {
        return plan;
    }
    plan.stops.splice(0..0, kept);
    plan.visits.splice(0..0, kept_visits);
    if let Some(first) = plan.visits.first() {
        plan.start_time = plan.start_time.min(first.arrival.saturating_sub(first.wait));
    }
    plan
}

#[cfg(test)]
mod tests;
