//! Greedy cheapest-feasible insertion.
//!
//! Stops are processed most-constrained first: priority descending, then
//! window width, earliest bound and id ascending. Each stop goes to the open
//! route where it adds the least cost; ties prefer the larger minimum slack,
//! then more spare capacity, then the lower vehicle id and earlier position.
//! Only when no open route can take it is an idle vehicle dispatched.
//!
//! Pinned stops are inserted before everything else. Later stops may go in
//! front of, between or behind them wherever the schedule stays feasible;
//! inserting never reorders stops already on the route, so pinned stops keep
//! their relative order.

use std::cmp::{Ordering, Reverse};
use std::time::Duration;

use dispatch_core::{CancelSignal, SolveError, UnassignedReason, UnassignedStop, VehicleId};

use crate::instance::Instance;
use crate::plan::Plan;
use crate::schedule::{Evaluation, Infeasibility, evaluate};

/// A feasible placement of one stop.
#[derive(Debug)]
struct Candidate {
    route: usize,
    position: usize,
    added_cost: i128,
    min_slack: Duration,
    spare: i64,
    vehicle_id: VehicleId,
    schedule: Evaluation,
}

impl Candidate {
    fn rank(&self, other: &Self) -> Ordering {
        self.added_cost
            .cmp(&other.added_cost)
            .then_with(|| other.min_slack.cmp(&self.min_slack))
            .then_with(|| other.spare.cmp(&self.spare))
            .then_with(|| self.vehicle_id.cmp(&other.vehicle_id))
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// Tracks the most informative failure seen while placing one stop.
#[derive(Debug, Default)]
struct FailureTally {
    window: bool,
    duration: bool,
}

impl FailureTally {
    fn record(&mut self, failure: Infeasibility) {
        match failure {
            Infeasibility::Capacity => {}
            Infeasibility::TimeWindow | Infeasibility::Unreachable => self.window = true,
            Infeasibility::Duration => self.duration = true,
        }
    }

    /// Timing failures win over capacity: if any vehicle had room, the
    /// stop failed on its window or the route limits.
    const fn reason(&self) -> UnassignedReason {
        if self.window {
            UnassignedReason::TimeWindow
        } else if self.duration {
            UnassignedReason::MaxRouteDuration
        } else {
            UnassignedReason::NoCapacity
        }
    }
}

/// Stop indices in construction order.
pub(crate) fn insertion_order(instance: &Instance<'_>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..instance.stop_count()).collect();
    order.sort_by_key(|&index| {
        instance.stop(index).map(|stop| {
            (
                Reverse(stop.priority),
                stop.window.width(),
                stop.window.earliest,
                stop.id,
            )
        })
    });
    order
}

/// Build an initial plan by inserting every stop.
pub(crate) fn construct(
    instance: &Instance<'_>,
    cancel: &dyn CancelSignal,
) -> Result<Plan, SolveError> {
    let mut plan = Plan::idle(instance);
    for stop in insertion_order(instance) {
        if cancel.is_cancelled() {
            return Err(SolveError::Cancelled);
        }
        place(instance, &mut plan, stop);
    }
    Ok(plan)
}

/// Insert `stop` into `plan`, recording it as unassigned when impossible.
pub(crate) fn place(instance: &Instance<'_>, plan: &mut Plan, stop: usize) {
    let mut tally = FailureTally::default();
    let best = best_candidate(instance, plan, stop, true, &mut tally)
        .or_else(|| best_candidate(instance, plan, stop, false, &mut tally));

    match best {
        Some(candidate) => {
            if let Some(route) = plan.routes.get_mut(candidate.route) {
                route.sequence.insert(candidate.position, stop);
                route.schedule = candidate.schedule;
            }
        }
        None => {
            let Some(stop_ref) = instance.stop(stop) else {
                return;
            };
            let reason = tally.reason();
            log::info!("stop {} left unassigned: {reason}", stop_ref.id);
            plan.unassigned.push(UnassignedStop {
                stop_id: stop_ref.id,
                reason,
            });
        }
    }
}

fn best_candidate(
    instance: &Instance<'_>,
    plan: &Plan,
    stop: usize,
    open_routes: bool,
    tally: &mut FailureTally,
) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for (route_index, route) in plan.routes.iter().enumerate() {
        if route.is_empty() == open_routes {
            continue;
        }
        let (Some(slot), Some(vehicle)) = (
            instance.slot(route.slot),
            instance.vehicle(route.slot),
        ) else {
            continue;
        };
        if !vehicle.available {
            continue;
        }
        for position in 0..=route.sequence.len() {
            let mut sequence = route.sequence.clone();
            sequence.insert(position, stop);
            match evaluate(instance, route.slot, &sequence) {
                Ok(schedule) => {
                    let candidate = Candidate {
                        route: route_index,
                        position,
                        added_cost: i128::from(schedule.cost()) - i128::from(route.cost()),
                        min_slack: schedule.min_slack,
                        spare: vehicle
                            .capacity
                            .total()
                            .saturating_sub(schedule.load.total()),
                        vehicle_id: slot.id,
                        schedule,
                    };
                    if best
                        .as_ref()
                        .is_none_or(|current| candidate.rank(current) == Ordering::Less)
                    {
                        best = Some(candidate);
                    }
                }
                Err(failure) => tally.record(failure),
            }
        }
    }
    best
}
