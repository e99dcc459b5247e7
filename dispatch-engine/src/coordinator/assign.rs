//! Emergency placement: local insertion first, fresh route second.

use std::time::Duration;

use dispatch_core::{
    Alert, AlertCode, EmergencyId, EmergencyRequest, EmergencyStatus, GeoCostProvider,
    NeverCancelled, RouteId, RouteStatus, Severity, SolveError, Stop, StopId, StopStatus, Vehicle,
    VehicleId,
};
use dispatch_solver::RouteInsertion;

use super::{CoordinatorError, Inner, starting_at};
use crate::emergency::QueueError;
use crate::store::RouteSnapshot;

/// How an emergency was placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// Inserted into a route already on the road.
    Inserted {
        /// Route now carrying the emergency stop.
        route_id: RouteId,
        /// Vehicle serving it.
        vehicle_id: VehicleId,
        /// Planned service start at the emergency.
        arrival: Duration,
        /// Stops displaced from the route and returned to the pending pool.
        dropped: Vec<StopId>,
        /// Route revision after the replacement.
        revision: u64,
    },
    /// Served by a new single-stop route of an idle vehicle.
    FreshRoute {
        /// New route.
        route_id: RouteId,
        /// Vehicle serving it.
        vehicle_id: VehicleId,
        /// Planned service start at the emergency.
        arrival: Duration,
    },
    /// No vehicle can arrive before the deadline; the request stays pending.
    SlaViolation {
        /// Request concerned.
        emergency_id: EmergencyId,
        /// Deadline that cannot be met.
        deadline: Duration,
    },
}

struct Candidate {
    snapshot: RouteSnapshot,
    vehicle: Vehicle,
    eta: Duration,
}

struct Placement {
    snapshot: RouteSnapshot,
    insertion: RouteInsertion,
}

impl Placement {
    fn keeps_every_stop(&self) -> bool {
        self.insertion.dropped.is_empty()
    }

    fn displaces_an_emergency(&self) -> bool {
        self.insertion
            .dropped
            .iter()
            .any(|unassigned| unassigned.stop_id.emergency_id().is_some())
    }
}

impl Inner {
    pub(super) fn assign_emergency(
        &self,
        id: EmergencyId,
        only: Option<VehicleId>,
    ) -> Result<AssignOutcome, CoordinatorError> {
        let _exclusive = self.assigning.lock();
        let request = self
            .queue
            .get(id)
            .ok_or(QueueError::UnknownRequest(id))?;
        if request.status != EmergencyStatus::Pending {
            return Err(QueueError::InvalidTransition {
                id,
                from: request.status,
                to: EmergencyStatus::Assigned,
            }
            .into());
        }
        let now = self.clock.now();
        let stop = request.to_stop(now);
        let mut transport_failed = false;

        let local = self.insert_locally(&request, &stop, now, only, &mut transport_failed);
        match local {
            Some(placement) if placement.keeps_every_stop() => {
                return self.apply_insertion(&request, placement);
            }
            Some(_) => log::debug!("absorbing {id} would displace stops; trying idle vehicles"),
            None => log::debug!("no active route can absorb {id}"),
        }
        if let Some(outcome) =
            self.open_fresh_route(&request, &stop, now, only, &mut transport_failed)?
        {
            return Ok(outcome);
        }
        if let Some(placement) = local {
            return self.apply_insertion(&request, placement);
        }

        let detail = if transport_failed {
            self.alert(
                Alert::new(Severity::Critical, AlertCode::TransportFailure)
                    .with_context("emergency_id", id),
            );
            "travel costs unavailable"
        } else {
            "no vehicle reaches the site before the deadline"
        };
        self.sla_alerted.lock().insert(id);
        self.alert_unmet_sla(&request, detail);
        Ok(AssignOutcome::SlaViolation {
            emergency_id: id,
            deadline: request.deadline,
        })
    }

    /// Active routes ordered by travel time from the vehicle to the site.
    fn candidates(
        &self,
        request: &EmergencyRequest,
        now: Duration,
        only: Option<VehicleId>,
    ) -> Vec<Candidate> {
        let fleet = self.fleet.lock().clone();
        let mut candidates: Vec<Candidate> = self
            .store
            .list_active_routes()
            .into_iter()
            .filter(|snapshot| only.is_none_or(|id| id == snapshot.route.vehicle_id()))
            .filter_map(|snapshot| {
                let vehicle = fleet.get(&snapshot.route.vehicle_id())?;
                let mut current = starting_at(vehicle, now)?;
                if let Some(position) = snapshot.position {
                    current.position = Some(position);
                }
                let from = current.start_location(self.config.depot);
                let eta = self
                    .geo
                    .get_eta(from, request.location, now)
                    .inspect_err(|err| {
                        log::warn!("no ETA from {} to {}: {err}", current.id, request.id);
                    })
                    .ok()?;
                Some(Candidate {
                    snapshot,
                    vehicle: current,
                    eta,
                })
            })
            .collect();
        candidates.sort_by_key(|candidate| (candidate.eta, candidate.snapshot.id()));
        candidates
    }

    /// Re-plan the nearest route that absorbs the emergency in time,
    /// preferring one that keeps all its stops. A re-plan that would drop
    /// another emergency is never offered.
    fn insert_locally(
        &self,
        request: &EmergencyRequest,
        stop: &Stop,
        now: Duration,
        only: Option<VehicleId>,
        transport_failed: &mut bool,
    ) -> Option<Placement> {
        let mut best: Option<Placement> = None;
        for candidate in self.candidates(request, now, only) {
            let remaining: Vec<Stop> = candidate
                .snapshot
                .route
                .plan
                .stops
                .iter()
                .filter(|stop| matches!(stop.status, StopStatus::Pending | StopStatus::EnRoute))
                .cloned()
                .collect();
            let Some(insertion) =
                self.try_insert(&candidate.vehicle, &remaining, stop, request, transport_failed)
            else {
                continue;
            };
            let placement = Placement {
                snapshot: candidate.snapshot,
                insertion,
            };
            if placement.displaces_an_emergency() {
                log::debug!(
                    "{} would push another emergency off {}",
                    request.id,
                    placement.snapshot.id()
                );
                continue;
            }
            if placement.keeps_every_stop() {
                return Some(placement);
            }
            let fewer = best
                .as_ref()
                .is_none_or(|kept| placement.insertion.dropped.len() < kept.insertion.dropped.len());
            if fewer {
                best = Some(placement);
            }
        }
        best
    }

    fn try_insert(
        &self,
        vehicle: &Vehicle,
        remaining: &[Stop],
        stop: &Stop,
        request: &EmergencyRequest,
        transport_failed: &mut bool,
    ) -> Option<RouteInsertion> {
        let result = self.solver.insert_into_route(
            self.config.depot,
            vehicle,
            remaining,
            stop,
            self.config.constraints,
            &NeverCancelled,
        );
        let insertion = match result {
            Ok(insertion) => insertion?,
            Err(err) => {
                if matches!(err, SolveError::Transport(_)) {
                    *transport_failed = true;
                }
                log::warn!("{} could not be planned on {}: {err}", request.id, vehicle.id);
                return None;
            }
        };
        let arrival = insertion.route.visit(stop.id)?.arrival;
        (arrival <= request.deadline).then_some(insertion)
    }

    fn apply_insertion(
        &self,
        request: &EmergencyRequest,
        placement: Placement,
    ) -> Result<AssignOutcome, CoordinatorError> {
        let Placement {
            snapshot,
            insertion,
        } = placement;
        let route_id = snapshot.id();
        let vehicle_id = snapshot.route.vehicle_id();
        let stop_id = request.stop_id();
        let arrival = insertion
            .route
            .visit(stop_id)
            .map_or(request.deadline, |visit| visit.arrival);
        let dropped: Vec<StopId> = insertion
            .dropped
            .iter()
            .map(|unassigned| unassigned.stop_id)
            .collect();

        let replaced = self.store.replace_route(route_id, insertion.route)?;
        self.store
            .record_emergency(route_id, request.id, request.kind)?;
        self.queue.assign(request.id, vehicle_id, route_id)?;
        self.return_to_pool(&snapshot, &dropped);
        log::info!(
            "{} inserted into {route_id}, arriving {arrival:?}, {} stop(s) displaced",
            request.id,
            dropped.len()
        );
        Ok(AssignOutcome::Inserted {
            route_id,
            vehicle_id,
            arrival,
            dropped,
            revision: replaced.revision,
        })
    }

    /// Put displaced stops back in the pending pool, or back in the
    /// emergency queue when they were emergencies themselves.
    fn return_to_pool(&self, snapshot: &RouteSnapshot, dropped: &[StopId]) {
        let mut displaced = Vec::new();
        {
            let mut pending = self.pending.lock();
            for stop in snapshot
                .route
                .plan
                .stops
                .iter()
                .filter(|stop| dropped.contains(&stop.id))
            {
                if let Some(emergency) = stop.id.emergency_id() {
                    displaced.push(emergency);
                    continue;
                }
                let mut returned = stop.clone();
                returned.status = StopStatus::Pending;
                pending.insert(returned.id, returned);
            }
        }
        for emergency in displaced {
            self.requeue_displaced(emergency, snapshot.id());
        }
    }

    /// An emergency lost its place on `route_id`: queue it again and alert,
    /// since nothing is on the way any more.
    fn requeue_displaced(&self, id: EmergencyId, route_id: RouteId) {
        match self.queue.requeue(id) {
            Ok(request) => {
                self.sla_alerted.lock().insert(id);
                self.alert_unmet_sla(&request, "displaced from its route");
                log::warn!("{id} was displaced from {route_id}");
            }
            Err(err) => log::warn!("{id} displaced from {route_id} but not requeued: {err}"),
        }
    }

    fn open_fresh_route(
        &self,
        request: &EmergencyRequest,
        stop: &Stop,
        now: Duration,
        only: Option<VehicleId>,
        transport_failed: &mut bool,
    ) -> Result<Option<AssignOutcome>, CoordinatorError> {
        let mut idle: Vec<(Duration, Vehicle)> = self
            .idle_vehicles(now, only)
            .into_iter()
            .filter_map(|vehicle| {
                let from = vehicle.start_location(self.config.depot);
                let eta = self.geo.get_eta(from, request.location, now).ok()?;
                Some((eta, vehicle))
            })
            .collect();
        idle.sort_by_key(|(eta, vehicle)| (*eta, vehicle.id));

        for (_, vehicle) in idle {
            let Some(insertion) = self.try_insert(&vehicle, &[], stop, request, transport_failed)
            else {
                continue;
            };
            let arrival = insertion
                .route
                .visit(stop.id)
                .map_or(request.deadline, |visit| visit.arrival);
            let route_id = self.store.create_route(insertion.route, vehicle.driver).id();
            self.store.set_route_status(route_id, RouteStatus::Published)?;
            self.store
                .record_emergency(route_id, request.id, request.kind)?;
            self.queue.assign(request.id, vehicle.id, route_id)?;
            log::info!("{} served by a fresh route {route_id} on {}", request.id, vehicle.id);
            return Ok(Some(AssignOutcome::FreshRoute {
                route_id,
                vehicle_id: vehicle.id,
                arrival,
            }));
        }
        Ok(None)
    }
}
