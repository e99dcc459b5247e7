//! Forward scheduling of a stop sequence on one vehicle.
//!
//! The vehicle leaves its start point at the beginning of its shift, waits
//! whenever it arrives before a window opens, and must be back at its depot
//! before the shift ends. Capacity is checked on every prefix.

use std::time::Duration;

use dispatch_core::{Load, TimeWindowViolation, Visit};

use crate::instance::Instance;

/// Why a sequence cannot be driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Infeasibility {
    Capacity,
    TimeWindow,
    Unreachable,
    Duration,
}

/// Timed schedule and cost of a feasible sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Evaluation {
    pub(crate) visits: Vec<Visit>,
    pub(crate) start: Duration,
    pub(crate) end: Duration,
    pub(crate) distance_m: u64,
    pub(crate) penalty: u64,
    pub(crate) min_slack: Duration,
    pub(crate) load: Load,
}

impl Evaluation {
    /// Schedule of a vehicle that stays at the depot.
    pub(crate) const fn idle(start: Duration) -> Self {
        Self {
            visits: Vec::new(),
            start,
            end: start,
            distance_m: 0,
            penalty: 0,
            min_slack: Duration::MAX,
            load: Load::new(),
        }
    }

    /// Objective contribution: metres driven plus lateness penalty.
    pub(crate) const fn cost(&self) -> u64 {
        self.distance_m.saturating_add(self.penalty)
    }
}

/// Schedule `sequence` (indices into the request's stops) on `slot`.
pub(crate) fn evaluate(
    instance: &Instance<'_>,
    slot: usize,
    sequence: &[usize],
) -> Result<Evaluation, Infeasibility> {
    let (Some(entry), Some(vehicle)) = (instance.slot(slot), instance.vehicle(slot)) else {
        debug_assert!(false, "vehicle slot {slot} out of range");
        return Err(Infeasibility::Unreachable);
    };
    let start = vehicle.shift.earliest;
    if sequence.is_empty() {
        return Ok(Evaluation::idle(start));
    }

    let soft = instance.soft_time_windows();
    let mut schedule = Evaluation::idle(start);
    let mut clock = start;
    let mut here = entry.start_point;

    for &index in sequence {
        let (Some(stop), Some(point)) = (instance.stop(index), instance.stop_point(index)) else {
            debug_assert!(false, "stop index {index} out of range");
            return Err(Infeasibility::Unreachable);
        };
        schedule.load = schedule.load.plus(&stop.demand);
        if !schedule.load.fits_within(&vehicle.capacity) {
            return Err(Infeasibility::Capacity);
        }

        let (travel, metres) = instance.leg(here, point).ok_or(Infeasibility::Unreachable)?;
        let arrived = clock.saturating_add(travel);
        let service_start = arrived.max(stop.window.earliest);
        let lateness = stop.window.lateness(service_start);
        let violation = if lateness.is_zero() {
            None
        } else if soft {
            let penalty = lateness
                .as_secs()
                .saturating_mul(instance.penalty_per_second());
            schedule.penalty = schedule.penalty.saturating_add(penalty);
            Some(TimeWindowViolation { lateness, penalty })
        } else {
            return Err(Infeasibility::TimeWindow);
        };

        let departure = service_start.saturating_add(stop.service_duration);
        schedule.min_slack = schedule.min_slack.min(stop.window.slack(service_start));
        schedule.distance_m = schedule.distance_m.saturating_add(metres);
        schedule.visits.push(Visit {
            stop_id: stop.id,
            arrival: service_start,
            wait: service_start.saturating_sub(arrived),
            departure,
            load_after: schedule.load.clone(),
            violation,
        });
        clock = departure;
        here = point;
    }

    let (travel, metres) = instance
        .leg(here, entry.depot_point)
        .ok_or(Infeasibility::Unreachable)?;
    schedule.end = clock.saturating_add(travel);
    schedule.distance_m = schedule.distance_m.saturating_add(metres);

    if schedule.end > vehicle.shift.latest {
        return Err(Infeasibility::Duration);
    }
    if let Some(limit) = instance.max_route_duration()
        && schedule.end.saturating_sub(start) > limit
    {
        return Err(Infeasibility::Duration);
    }
    Ok(schedule)
}
