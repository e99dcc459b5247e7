//! Orchestration of intake, planning, emergencies and live tracking.
//!
//! [`DispatchCoordinator`] owns the store, the tracker and the emergency
//! queue. Solver work always runs on Tokio's blocking pool so a slow
//! re-optimisation never holds up driver message ingestion or subscriber
//! fan-out.
//!
//! A planning cycle snapshots the pending stops, the pending emergencies
//! (as pinned critical stops) and the idle vehicles, solves, and publishes
//! one route per vehicle. Raising an emergency cancels an in-flight solve;
//! the cycle then restarts with the new emergency included, up to
//! [`CoordinatorConfig::max_solve_restarts`] times.

mod assign;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use dispatch_core::{
    Alert, AlertCode, AlertSink, CancelSignal, Clock, Diagnostics, EmergencyId,
    EmergencyRequest, EmergencyStatus, GeoCostProvider, RejectionReason, RouteId,
    RouteStatus, Severity, SolveConstraints, SolveError, SolveRequest, SolveResponse, Solver,
    Stop, StopId, StopRejection, StopStatus, SubscriberId, UnassignedStop, Vehicle, VehicleId,
    VehicleRejection,
};
use dispatch_solver::{InsertionSolver, InsertionSolverConfig};
use geo::Coord;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub use assign::AssignOutcome;

use crate::emergency::{EmergencyQueue, EmergencyQueueConfig, QueueError, QueueTicket};
use crate::ingest::{
    DriverMessage, IngestConfig, IngestContext, IngestError, IngestOutcome, IngestTable,
};
use crate::store::{ChangeListener, DispatchStore, StoreError};
use crate::tracker::{LiveTracker, SubscriptionFilter, SubscriptionHandle, TrackerConfig};

/// Travel-cost provider shared between the coordinator and its workers.
pub type SharedGeoCostProvider = Arc<dyn GeoCostProvider + Send + Sync>;

/// Tuning for [`DispatchCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// Shared planning depot.
    pub depot: Coord<f64>,
    /// Constraints applied to every solve.
    pub constraints: SolveConstraints,
    /// Solver budgets.
    pub solver: InsertionSolverConfig,
    /// Subscriber registry tuning.
    pub tracker: TrackerConfig,
    /// Driver message thresholds.
    pub ingest: IngestConfig,
    /// Emergency ticket estimates.
    pub queue: EmergencyQueueConfig,
    /// Times a cancelled planning cycle is restarted before giving up.
    pub max_solve_restarts: u32,
    /// How often overdue emergencies are swept for alerts.
    pub sla_sweep_interval: Duration,
    /// How long completed and aborted routes stay queryable.
    pub finished_route_retention: Duration,
}

impl CoordinatorConfig {
    /// Defaults around `depot`.
    #[must_use]
    pub fn new(depot: Coord<f64>) -> Self {
        Self {
            depot,
            constraints: SolveConstraints::default(),
            solver: InsertionSolverConfig::default(),
            tracker: TrackerConfig::default(),
            ingest: IngestConfig::default(),
            queue: EmergencyQueueConfig::default(),
            max_solve_restarts: 3,
            sla_sweep_interval: Duration::from_secs(30),
            finished_route_retention: Duration::from_secs(30 * 60),
        }
    }

    /// Override the solve constraints.
    #[must_use]
    pub const fn with_constraints(mut self, constraints: SolveConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Override the solver budgets.
    #[must_use]
    pub const fn with_solver(mut self, solver: InsertionSolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Override the tracker tuning.
    #[must_use]
    pub const fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    /// Override the ingestion thresholds.
    #[must_use]
    pub const fn with_ingest(mut self, ingest: IngestConfig) -> Self {
        self.ingest = ingest;
        self
    }

    /// Override the restart bound.
    #[must_use]
    pub const fn with_max_solve_restarts(mut self, restarts: u32) -> Self {
        self.max_solve_restarts = restarts;
        self
    }

    /// Override the SLA sweep interval.
    #[must_use]
    pub const fn with_sla_sweep_interval(mut self, interval: Duration) -> Self {
        self.sla_sweep_interval = interval;
        self
    }

    /// Override how long finished routes are kept.
    #[must_use]
    pub const fn with_finished_route_retention(mut self, retention: Duration) -> Self {
        self.finished_route_retention = retention;
        self
    }
}

/// Errors surfaced by the coordinator.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The solver failed.
    #[error(transparent)]
    Solve(#[from] SolveError),
    /// The emergency queue refused the operation.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The store refused the operation.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A driver message could not be applied.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Emergencies kept cancelling the planning cycle.
    #[error("planning cancelled {restarts} time(s); giving up")]
    TooManyRestarts {
        /// Restarts attempted.
        restarts: u32,
    },
    /// A blocking worker panicked or was aborted.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    /// The coordinator has been shut down.
    #[error("coordinator is shut down")]
    ShutDown,
}

/// Per-stop result of order intake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Stops queued for the next planning cycle.
    pub accepted: Vec<StopId>,
    /// Stops refused, with reason codes.
    pub rejected: Vec<StopRejection>,
}

/// Result of one planning cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanReport {
    /// Routes created and published.
    pub routes: Vec<RouteId>,
    /// Stops left for a later cycle.
    pub unassigned: Vec<UnassignedStop>,
    /// Emergencies placed on the new routes.
    pub emergencies: Vec<EmergencyId>,
    /// Times the solve was cancelled and restarted.
    pub restarts: u32,
    /// Statistics of the final solve.
    pub diagnostics: Diagnostics,
}

struct TokenSignal(CancellationToken);

impl CancelSignal for TokenSignal {
    fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Background tasks started by [`DispatchCoordinator::spawn_background`].
#[derive(Debug)]
pub struct BackgroundTasks {
    heartbeat: JoinHandle<()>,
    sla: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Wait for both tasks to stop after shutdown.
    ///
    /// # Errors
    /// [`CoordinatorError::Worker`] when a task panicked.
    pub async fn join(self) -> Result<(), CoordinatorError> {
        self.heartbeat.await?;
        self.sla.await?;
        Ok(())
    }
}

struct Inner {
    config: CoordinatorConfig,
    store: DispatchStore,
    tracker: LiveTracker,
    queue: EmergencyQueue,
    ingest: IngestTable,
    solver: InsertionSolver<SharedGeoCostProvider>,
    geo: SharedGeoCostProvider,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    pending: Mutex<BTreeMap<StopId, Stop>>,
    fleet: Mutex<BTreeMap<VehicleId, Vehicle>>,
    in_flight: Mutex<Option<CancellationToken>>,
    sla_alerted: Mutex<HashSet<EmergencyId>>,
    assigning: Mutex<()>,
    planning: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
}

/// Entry point of the dispatch engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct DispatchCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("store", &self.inner.store)
            .field("pending_stops", &self.inner.pending.lock().len())
            .field("fleet", &self.inner.fleet.lock().len())
            .field("queued_emergencies", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

impl DispatchCoordinator {
    /// Wire a coordinator around its external collaborators.
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        geo: SharedGeoCostProvider,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let tracker = LiveTracker::new(config.tracker);
        let listener: Arc<dyn ChangeListener> = Arc::new(tracker.clone());
        let inner = Inner {
            store: DispatchStore::new(Arc::clone(&clock), listener),
            tracker,
            queue: EmergencyQueue::new(config.queue),
            ingest: IngestTable::standard(),
            solver: InsertionSolver::with_config(Arc::clone(&geo), config.solver),
            geo,
            clock,
            alerts,
            pending: Mutex::new(BTreeMap::new()),
            fleet: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(None),
            sla_alerted: Mutex::new(HashSet::new()),
            assigning: Mutex::new(()),
            planning: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Route state.
    #[must_use]
    pub fn store(&self) -> &DispatchStore {
        &self.inner.store
    }

    /// Subscriber registry.
    #[must_use]
    pub fn tracker(&self) -> &LiveTracker {
        &self.inner.tracker
    }

    /// Emergency queue.
    #[must_use]
    pub fn queue(&self) -> &EmergencyQueue {
        &self.inner.queue
    }

    /// Subscribe a client to live route changes.
    #[must_use]
    pub fn subscribe(
        &self,
        id: SubscriberId,
        filter: SubscriptionFilter,
    ) -> SubscriptionHandle {
        self.inner.tracker.subscribe(id, filter)
    }

    /// Stops waiting for the next planning cycle, by id.
    #[must_use]
    pub fn pending_stops(&self) -> Vec<Stop> {
        self.inner.pending.lock().values().cloned().collect()
    }

    /// Accept confirmed orders for the next planning cycle.
    ///
    /// Each stop is checked on its own; invalid windows, negative demand,
    /// ids already waiting and ids in the emergency range are rejected
    /// without affecting the others.
    pub fn submit_stops(&self, stops: Vec<Stop>) -> SubmitReport {
        let mut report = SubmitReport::default();
        let mut pending = self.inner.pending.lock();
        for mut stop in stops {
            let reason = if stop.id.emergency_id().is_some() {
                Some(RejectionReason::ReservedId)
            } else if pending.contains_key(&stop.id) {
                Some(RejectionReason::DuplicateStop)
            } else {
                StopRejection::check(&stop)
            };
            if let Some(reason) = reason {
                log::info!("rejected {}: {reason}", stop.id);
                report.rejected.push(StopRejection {
                    stop_id: stop.id,
                    reason,
                });
                continue;
            }
            stop.status = StopStatus::Pending;
            report.accepted.push(stop.id);
            pending.insert(stop.id, stop);
        }
        report
    }

    /// Replace the fleet with the valid vehicles of `vehicles`.
    pub fn update_fleet(&self, vehicles: Vec<Vehicle>) -> Vec<VehicleRejection> {
        let mut rejected = Vec::new();
        let mut fleet = self.inner.fleet.lock();
        let held: HashSet<VehicleId> = fleet
            .values()
            .filter(|vehicle| !vehicle.available)
            .map(|vehicle| vehicle.id)
            .collect();
        fleet.clear();
        for mut vehicle in vehicles {
            if let Some(rejection) = VehicleRejection::check(&vehicle) {
                rejected.push(rejection);
                continue;
            }
            if held.contains(&vehicle.id) {
                vehicle.available = false;
            }
            fleet.insert(vehicle.id, vehicle);
        }
        log::info!(
            "fleet updated: {} vehicle(s), {} rejected",
            fleet.len(),
            rejected.len()
        );
        rejected
    }

    /// Solve pending stops and emergencies onto idle vehicles and publish
    /// the resulting routes.
    ///
    /// # Errors
    /// [`CoordinatorError::Solve`] when travel costs are unavailable (a
    /// transport alert is emitted first), [`CoordinatorError::TooManyRestarts`]
    /// when emergencies keep cancelling the solve, and
    /// [`CoordinatorError::ShutDown`] after shutdown.
    pub async fn plan_cycle(&self) -> Result<PlanReport, CoordinatorError> {
        let _cycle = self.inner.planning.lock().await;
        let mut restarts = 0_u32;
        loop {
            if self.inner.shutdown.is_cancelled() {
                return Err(CoordinatorError::ShutDown);
            }
            let Some((request, held)) = self.inner.planning_request() else {
                log::debug!("nothing to plan");
                return Ok(PlanReport {
                    restarts,
                    ..PlanReport::default()
                });
            };
            let token = CancellationToken::new();
            *self.inner.in_flight.lock() = Some(token.clone());

            let inner = Arc::clone(&self.inner);
            let solve = tokio::task::spawn_blocking(move || {
                inner.solver.solve_with_cancel(&request, &TokenSignal(token))
            })
            .await;
            *self.inner.in_flight.lock() = None;

            match solve {
                Ok(Ok(response)) => {
                    let inner = Arc::clone(&self.inner);
                    let mut report = tokio::task::spawn_blocking(move || {
                        let _exclusive = inner.assigning.lock();
                        inner.release(&held);
                        let current = inner.withdraw_settled_emergencies(response)?;
                        inner.apply_plan(current)
                    })
                    .await??;
                    report.restarts = restarts;
                    return Ok(report);
                }
                Ok(Err(SolveError::Cancelled)) => {
                    self.inner.release(&held);
                    restarts += 1;
                    log::info!("planning cancelled by an emergency (restart {restarts})");
                    if restarts > self.inner.config.max_solve_restarts {
                        self.inner.alert(
                            Alert::new(Severity::Warning, AlertCode::SolverFailure)
                                .with_context("restarts", restarts),
                        );
                        return Err(CoordinatorError::TooManyRestarts { restarts });
                    }
                }
                Ok(Err(err)) => {
                    self.inner.release(&held);
                    self.inner.alert_solve_failure(&err);
                    return Err(err.into());
                }
                Err(join) => {
                    self.inner.release(&held);
                    self.inner.alert(
                        Alert::new(Severity::Critical, AlertCode::SolverFailure)
                            .with_context("error", &join),
                    );
                    return Err(join.into());
                }
            }
        }
    }

    /// Queue an emergency and abandon any in-flight solve so the next cycle
    /// includes it.
    ///
    /// # Errors
    /// [`CoordinatorError::Queue`] for duplicate ids.
    pub fn raise_emergency(
        &self,
        request: EmergencyRequest,
    ) -> Result<QueueTicket, CoordinatorError> {
        let ticket = self.inner.queue.enqueue(request)?;
        if let Some(token) = self.inner.in_flight.lock().as_ref() {
            log::info!("{} preempts the running planning cycle", ticket.id);
            token.cancel();
        }
        Ok(ticket)
    }

    /// Place a pending emergency: into the nearest active route that can
    /// absorb it before the deadline, else onto a fresh route of an idle
    /// vehicle. A route that would have to drop stops is used only when no
    /// idle vehicle can make it, and never when it would drop another
    /// emergency. When nothing works the request stays pending and an
    /// unmet-SLA alert is emitted.
    ///
    /// `vehicle` restricts the search to one vehicle.
    ///
    /// # Errors
    /// [`CoordinatorError::Queue`] when the request is unknown or no longer
    /// pending, [`CoordinatorError::Store`] when the chosen route vanished.
    pub async fn assign_emergency(
        &self,
        id: EmergencyId,
        vehicle: Option<VehicleId>,
    ) -> Result<AssignOutcome, CoordinatorError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.assign_emergency(id, vehicle)).await?
    }

    /// Mark an emergency handled and settle its stop.
    ///
    /// # Errors
    /// [`CoordinatorError::Queue`] unless the request was assigned or
    /// dispatched.
    pub fn complete_emergency(&self, id: EmergencyId) -> Result<EmergencyRequest, CoordinatorError> {
        let queue = &self.inner.queue;
        if queue.get(id).map(|request| request.status) == Some(EmergencyStatus::Assigned) {
            queue.mark_dispatched(id)?;
        }
        let request = queue.complete(id)?;
        if let Some(route_id) = request.assigned_route {
            self.inner
                .settle_stop(route_id, request.stop_id(), StopStatus::Delivered);
        }
        Ok(request)
    }

    /// Withdraw an emergency; its stop is cancelled if already routed.
    ///
    /// # Errors
    /// [`CoordinatorError::Queue`] once the request has been dispatched.
    pub fn cancel_emergency(
        &self,
        id: EmergencyId,
        reason: &str,
    ) -> Result<EmergencyRequest, CoordinatorError> {
        let request = {
            let _exclusive = self.inner.assigning.lock();
            self.inner.queue.cancel(id, reason)?
        };
        self.inner.sla_alerted.lock().remove(&id);
        if let Some(route_id) = request.assigned_route {
            self.inner
                .settle_stop(route_id, request.stop_id(), StopStatus::Cancelled);
        }
        Ok(request)
    }

    /// Apply one driver message.
    ///
    /// Status changes on emergency stops advance the matching request:
    /// arrival marks it dispatched, delivery completes it.
    ///
    /// # Errors
    /// [`CoordinatorError::Ingest`] when the message cannot be applied.
    pub async fn ingest(&self, message: DriverMessage) -> Result<IngestOutcome, CoordinatorError> {
        let inner = Arc::clone(&self.inner);
        let outcome = tokio::task::spawn_blocking(move || {
            let ctx = IngestContext {
                store: &inner.store,
                geo: &*inner.geo,
                clock: &*inner.clock,
                config: &inner.config.ingest,
            };
            inner.ingest.dispatch(&ctx, &message)
        })
        .await??;
        if let IngestOutcome::StatusChanged {
            stop_id, status, ..
        } = outcome
        {
            if let Some(emergency) = stop_id.emergency_id() {
                self.inner.follow_emergency_stop(emergency, status);
            }
            self.inner.prune_finished_routes();
        }
        Ok(outcome)
    }

    /// Drop routes that finished longer ago than
    /// [`CoordinatorConfig::finished_route_retention`], along with the
    /// tracker and ingestion state kept for them.
    pub fn prune_finished_routes(&self) -> Vec<RouteId> {
        self.inner.prune_finished_routes()
    }

    /// Alert once for every pending emergency past its deadline.
    pub fn sweep_sla(&self) -> Vec<EmergencyId> {
        let now = self.inner.clock.now();
        let overdue = self.inner.queue.pending_overdue(now);
        let mut alerted = self.inner.sla_alerted.lock();
        let mut fresh = Vec::new();
        for request in overdue {
            if alerted.insert(request.id) {
                self.inner.alert_unmet_sla(&request, "deadline passed");
                fresh.push(request.id);
            }
        }
        fresh
    }

    /// Start the heartbeat monitor and the periodic SLA sweep, which also
    /// prunes finished routes. Both stop on
    /// [`DispatchCoordinator::shutdown`].
    #[must_use]
    pub fn spawn_background(&self) -> BackgroundTasks {
        let heartbeat = self
            .inner
            .tracker
            .spawn_heartbeat_monitor(self.inner.shutdown.child_token());
        let coordinator = self.clone();
        let shutdown = self.inner.shutdown.child_token();
        let sla = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.inner.config.sla_sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        coordinator.sweep_sla();
                        coordinator.prune_finished_routes();
                    }
                }
            }
            log::debug!("SLA sweep stopped");
        });
        BackgroundTasks { heartbeat, sla }
    }

    /// Cancel in-flight work, stop background tasks and close every
    /// subscription.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        if let Some(token) = self.inner.in_flight.lock().take() {
            token.cancel();
        }
        self.inner.tracker.shutdown();
        log::info!("dispatch coordinator shut down");
    }
}

impl Inner {
    fn alert(&self, alert: Alert) {
        self.alerts.emit(&alert);
    }

    fn alert_solve_failure(&self, err: &SolveError) {
        let code = match err {
            SolveError::Transport(_) => AlertCode::TransportFailure,
            SolveError::Validation(_) | SolveError::Cancelled => AlertCode::SolverFailure,
        };
        log::error!("planning failed: {err}");
        self.alert(Alert::new(Severity::Critical, code).with_context("error", err));
    }

    fn alert_unmet_sla(&self, request: &EmergencyRequest, detail: &str) {
        log::error!("{} cannot be met: {detail}", request.id);
        self.alert(
            Alert::new(Severity::Critical, AlertCode::UnmetSla)
                .with_context("emergency_id", request.id)
                .with_context("kind", request.kind)
                .with_context("deadline_secs", request.deadline.as_secs())
                .with_context("detail", detail),
        );
    }

    /// Idle vehicles with their shifts clipped to `now`.
    fn idle_vehicles(&self, now: Duration, only: Option<VehicleId>) -> Vec<Vehicle> {
        let busy: HashSet<VehicleId> = self
            .store
            .list_active_routes()
            .iter()
            .map(|snapshot| snapshot.route.vehicle_id())
            .collect();
        self.fleet
            .lock()
            .values()
            .filter(|vehicle| vehicle.available && !busy.contains(&vehicle.id))
            .filter(|vehicle| only.is_none_or(|id| id == vehicle.id))
            .filter_map(|vehicle| starting_at(vehicle, now))
            .collect()
    }

    /// Mark vehicles unavailable; returns those actually taken.
    fn hold(&self, ids: impl IntoIterator<Item = VehicleId>) -> Vec<VehicleId> {
        let mut fleet = self.fleet.lock();
        ids.into_iter()
            .filter(|id| match fleet.get_mut(id) {
                Some(vehicle) if vehicle.available => {
                    vehicle.available = false;
                    true
                }
                _ => false,
            })
            .collect()
    }

    fn release(&self, ids: &[VehicleId]) {
        let mut fleet = self.fleet.lock();
        for id in ids {
            if let Some(vehicle) = fleet.get_mut(id) {
                vehicle.available = true;
            }
        }
    }

    fn planning_request(&self) -> Option<(SolveRequest, Vec<VehicleId>)> {
        let now = self.clock.now();
        let mut stops: Vec<Stop> = self.pending.lock().values().cloned().collect();
        stops.extend(
            self.queue
                .pending()
                .iter()
                .map(|request| request.to_stop(now)),
        );
        if stops.is_empty() {
            return None;
        }
        let vehicles = self.idle_vehicles(now, None);
        let held = self.hold(vehicles.iter().map(|vehicle| vehicle.id));
        let mut request = SolveRequest::new(self.config.depot);
        request.constraints = self.config.constraints;
        request.stops = stops;
        request.vehicles = vehicles
            .into_iter()
            .filter(|vehicle| held.contains(&vehicle.id))
            .collect();
        log::info!(
            "planning {} stop(s) on {} vehicle(s)",
            request.stops.len(),
            request.vehicles.len()
        );
        Some((request, held))
    }

    /// Take out stops of emergencies that were cancelled or placed while the
    /// plan was being solved, re-planning each affected route on its own
    /// vehicle. Nothing is written to the store here, so a failure leaves
    /// every stop pending.
    fn withdraw_settled_emergencies(
        &self,
        mut response: SolveResponse,
    ) -> Result<SolveResponse, CoordinatorError> {
        let settled = |stop: &Stop| {
            stop.id.emergency_id().is_some_and(|id| {
                self.queue
                    .get(id)
                    .is_none_or(|request| request.status != EmergencyStatus::Pending)
            })
        };
        if !response
            .routes
            .iter()
            .any(|plan| plan.stops.iter().any(&settled))
        {
            return Ok(response);
        }

        let now = self.clock.now();
        let mut routes = Vec::with_capacity(response.routes.len());
        for plan in std::mem::take(&mut response.routes) {
            let (withdrawn, kept): (Vec<Stop>, Vec<Stop>) =
                plan.stops.iter().cloned().partition(&settled);
            if withdrawn.is_empty() {
                routes.push(plan);
                continue;
            }
            for stop in &withdrawn {
                log::info!("{} settled during planning; left off {}", stop.id, plan.vehicle_id);
            }
            if kept.is_empty() {
                continue;
            }
            let vehicle = self
                .fleet
                .lock()
                .get(&plan.vehicle_id)
                .and_then(|vehicle| starting_at(vehicle, now));
            let Some(vehicle) = vehicle else {
                log::warn!("{} left the fleet during planning", plan.vehicle_id);
                continue;
            };
            let mut request = SolveRequest::new(self.config.depot);
            request.constraints = self.config.constraints;
            request.stops = kept;
            request.vehicles = vec![vehicle];
            let replanned = self.solver.solve(&request)?;
            routes.extend(replanned.routes);
            response.unassigned.extend(replanned.unassigned);
        }
        response.routes = routes;
        Ok(response)
    }

    fn prune_finished_routes(&self) -> Vec<RouteId> {
        let retention = self.config.finished_route_retention;
        let Some(cutoff) = self.clock.now().checked_sub(retention) else {
            return Vec::new();
        };
        let pruned = self.store.prune_finished(cutoff);
        for &route_id in &pruned {
            self.tracker.forget_route(route_id);
            self.ingest.forget_route(route_id);
            log::info!("{route_id} finished before {cutoff:?} and was pruned");
        }
        pruned
    }

    fn apply_plan(&self, response: SolveResponse) -> Result<PlanReport, CoordinatorError> {
        let mut report = PlanReport {
            unassigned: response.unassigned,
            diagnostics: response.diagnostics,
            ..PlanReport::default()
        };
        for plan in response.routes {
            let vehicle_id = plan.vehicle_id;
            let driver = self
                .fleet
                .lock()
                .get(&vehicle_id)
                .and_then(|vehicle| vehicle.driver);
            let planned: Vec<StopId> = plan.stops.iter().map(|stop| stop.id).collect();
            let route_id = self.store.create_route(plan, driver).id();
            self.store.set_route_status(route_id, RouteStatus::Published)?;
            {
                let mut pending = self.pending.lock();
                for stop_id in &planned {
                    pending.remove(stop_id);
                }
            }
            for emergency in planned.iter().filter_map(|stop| stop.emergency_id()) {
                if let Some(request) = self.queue.get(emergency) {
                    self.queue.assign(emergency, vehicle_id, route_id)?;
                    self.store
                        .record_emergency(route_id, emergency, request.kind)?;
                    self.sla_alerted.lock().remove(&emergency);
                    report.emergencies.push(emergency);
                }
            }
            report.routes.push(route_id);
        }
        for unassigned in &report.unassigned {
            log::info!("{} left unassigned: {}", unassigned.stop_id, unassigned.reason);
        }
        Ok(report)
    }

    /// Best-effort status change of a stop the coordinator owns.
    fn settle_stop(&self, route_id: RouteId, stop_id: StopId, status: StopStatus) {
        let attempts = self.config.ingest.stale_retry_attempts.max(1);
        for _ in 0..attempts {
            let Some(snapshot) = self.store.get_route(route_id) else {
                return;
            };
            match self
                .store
                .update_stop_status(route_id, stop_id, snapshot.revision, status)
            {
                Err(StoreError::StaleRoute { .. }) => {}
                Ok(_) => return,
                Err(err) => {
                    log::warn!("could not mark {stop_id} {status:?}: {err}");
                    return;
                }
            }
        }
    }

    fn follow_emergency_stop(&self, id: EmergencyId, status: StopStatus) {
        let current = self.queue.get(id).map(|request| request.status);
        let result = match (status, current) {
            (StopStatus::EnRoute | StopStatus::Arrived, Some(EmergencyStatus::Assigned)) => {
                self.queue.mark_dispatched(id).map(|_| ())
            }
            (StopStatus::Delivered, Some(EmergencyStatus::Assigned)) => self
                .queue
                .mark_dispatched(id)
                .and_then(|_| self.queue.complete(id))
                .map(|_| ()),
            (StopStatus::Delivered, Some(EmergencyStatus::Dispatched)) => {
                self.queue.complete(id).map(|_| ())
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            log::warn!("emergency {id} did not follow its stop: {err}");
        }
    }
}

/// `vehicle` with its shift starting no earlier than `now`, or `None` once
/// the shift is over.
fn starting_at(vehicle: &Vehicle, now: Duration) -> Option<Vehicle> {
    if vehicle.shift.latest <= now {
        return None;
    }
    let mut clipped = vehicle.clone();
    clipped.shift.earliest = clipped.shift.earliest.max(now);
    Some(clipped)
}
