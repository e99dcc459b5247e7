//! Stock handlers for each driver message kind.

use std::collections::HashSet;

use dispatch_core::{RouteId, Stop, StopId, StopStatus};
use geo::Coord;
use parking_lot::Mutex;

use super::{DriverMessage, IngestContext, IngestError, IngestHandler, IngestOutcome};
use crate::store::{RouteSnapshot, StoreError};

fn snapshot(ctx: &IngestContext<'_>, route_id: RouteId) -> Result<RouteSnapshot, IngestError> {
    ctx.store
        .get_route(route_id)
        .ok_or(IngestError::Store(StoreError::UnknownRoute(route_id)))
}

/// Moves a stop to a fixed status, re-reading the route when it was
/// replaced between read and write.
#[derive(Debug, Clone, Copy)]
pub struct StatusHandler {
    status: StopStatus,
}

impl StatusHandler {
    /// Handler applying `status`.
    #[must_use]
    pub const fn new(status: StopStatus) -> Self {
        Self { status }
    }

    fn apply(
        &self,
        ctx: &IngestContext<'_>,
        route_id: RouteId,
        stop_id: StopId,
    ) -> Result<IngestOutcome, IngestError> {
        let attempts = ctx.config.stale_retry_attempts.max(1);
        for attempt in 1..=attempts {
            let revision = snapshot(ctx, route_id)?.revision;
            match ctx
                .store
                .update_stop_status(route_id, stop_id, revision, self.status)
            {
                Ok(_) => {
                    return Ok(IngestOutcome::StatusChanged {
                        route_id,
                        stop_id,
                        status: self.status,
                    });
                }
                Err(StoreError::StaleRoute { .. }) => {
                    log::debug!("{route_id} replaced under {stop_id} update (attempt {attempt})");
                }
                Err(err) => return Err(err.into()),
            }
        }
        log::warn!("giving up on {stop_id} update after {attempts} stale attempt(s)");
        Err(IngestError::StaleAfterRetries { route_id, attempts })
    }
}

impl IngestHandler for StatusHandler {
    fn handle(
        &self,
        ctx: &IngestContext<'_>,
        message: &DriverMessage,
    ) -> Result<IngestOutcome, IngestError> {
        match message {
            DriverMessage::StopArrived { route_id, stop_id }
            | DriverMessage::StopCompleted { route_id, stop_id } => {
                self.apply(ctx, *route_id, *stop_id)
            }
            DriverMessage::StopFailed {
                route_id,
                stop_id,
                reason,
            } => {
                log::warn!("{stop_id} on {route_id} failed: {reason}");
                self.apply(ctx, *route_id, *stop_id)
            }
            other => Err(IngestError::Unhandled(other.kind())),
        }
    }
}

/// Records positions and raises a delay event when the next stop is
/// projected to be served later than planned by more than the threshold.
///
/// A delay is reported once per stop until the projection recovers. Stops
/// that are no longer open lose their flag on the route's next ping.
#[derive(Debug, Default)]
pub struct LocationHandler {
    reported: Mutex<HashSet<(RouteId, StopId)>>,
}

impl LocationHandler {
    /// Stops currently flagged as late.
    #[must_use]
    pub fn flagged_delays(&self) -> usize {
        self.reported.lock().len()
    }

    fn next_stop(snapshot: &RouteSnapshot) -> Option<&Stop> {
        snapshot
            .route
            .plan
            .stops
            .iter()
            .find(|stop| matches!(stop.status, StopStatus::Pending | StopStatus::EnRoute))
    }

    fn check_delay(
        &self,
        ctx: &IngestContext<'_>,
        route_id: RouteId,
        position: Coord<f64>,
    ) -> Result<IngestOutcome, IngestError> {
        let current = snapshot(ctx, route_id)?;
        self.reported.lock().retain(|&(route, stop_id)| {
            route != route_id
                || current
                    .route
                    .stop(stop_id)
                    .is_some_and(|stop| matches!(stop.status, StopStatus::Pending | StopStatus::EnRoute))
        });
        let Some(stop) = Self::next_stop(&current) else {
            return Ok(IngestOutcome::Recorded);
        };
        let now = ctx.clock.now();
        let eta = match ctx.geo.get_eta(position, stop.location, now) {
            Ok(eta) => eta,
            Err(err) => {
                log::warn!("no ETA for {} on {route_id}: {err}", stop.id);
                return Ok(IngestOutcome::Recorded);
            }
        };
        let projected = now.saturating_add(eta).max(stop.window.earliest);
        let delay = current.route.plan.visit(stop.id).map_or_else(
            || stop.window.lateness(projected),
            |visit| projected.saturating_sub(visit.arrival),
        );

        let key = (route_id, stop.id);
        if delay <= ctx.config.delay_threshold {
            self.reported.lock().remove(&key);
            return Ok(IngestOutcome::Recorded);
        }
        if !self.reported.lock().insert(key) {
            return Ok(IngestOutcome::Recorded);
        }
        ctx.store.record_delay(route_id, stop.id, projected, delay)?;
        Ok(IngestOutcome::DelayDetected {
            route_id,
            stop_id: stop.id,
            delay,
        })
    }
}

impl IngestHandler for LocationHandler {
    fn handle(
        &self,
        ctx: &IngestContext<'_>,
        message: &DriverMessage,
    ) -> Result<IngestOutcome, IngestError> {
        let DriverMessage::LocationPing { route_id, position } = message else {
            return Err(IngestError::Unhandled(message.kind()));
        };
        ctx.store.record_location(*route_id, *position)?;
        self.check_delay(ctx, *route_id, *position)
    }

    fn forget_route(&self, route_id: RouteId) {
        self.reported.lock().retain(|&(route, _)| route != route_id);
    }
}

/// Records a delay the driver reported against the planned arrival.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelayReportHandler;

impl IngestHandler for DelayReportHandler {
    fn handle(
        &self,
        ctx: &IngestContext<'_>,
        message: &DriverMessage,
    ) -> Result<IngestOutcome, IngestError> {
        let DriverMessage::DelayReport {
            route_id,
            stop_id,
            delay,
        } = message
        else {
            return Err(IngestError::Unhandled(message.kind()));
        };
        let current = snapshot(ctx, *route_id)?;
        let planned = current
            .route
            .plan
            .visit(*stop_id)
            .map_or_else(|| ctx.clock.now(), |visit| visit.arrival);
        let projected = planned.saturating_add(*delay);
        ctx.store
            .record_delay(*route_id, *stop_id, projected, *delay)?;
        Ok(IngestOutcome::DelayDetected {
            route_id: *route_id,
            stop_id: *stop_id,
            delay: *delay,
        })
    }
}
