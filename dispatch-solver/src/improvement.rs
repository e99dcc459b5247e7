//! Best-improvement local search.
//!
//! Each pass scans every 2-opt reversal, relocation and inter-route exchange,
//! applies the single move with the largest strict cost reduction, and stops
//! when no move improves, the pass budget runs out, or the time budget
//! expires. Pinned stops must occupy the same route and index after a move.
//!
//! Moves are scanned in a fixed order and ties keep the first move found, so
//! a run bounded by passes is deterministic. The time budget is only
//! consulted between passes and can cut a run short on a slow machine.

use std::time::Instant;

use dispatch_core::{CancelSignal, SolveError};

use crate::instance::Instance;
use crate::plan::{Plan, RouteState};
use crate::schedule::{Evaluation, evaluate};

/// Limits for one improvement run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    pub(crate) max_passes: u32,
    pub(crate) deadline: Instant,
}

/// Counters reported in diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Stats {
    pub(crate) passes: u32,
    pub(crate) moves: u32,
}

#[derive(Debug)]
struct Move {
    gain: i128,
    changes: Vec<(usize, Vec<usize>, Evaluation)>,
}

struct Search<'a, 'r> {
    instance: &'a Instance<'r>,
    plan: &'a Plan,
    best: Option<Move>,
}

impl Search<'_, '_> {
    /// Record the move if it strictly beats both the current plan and the
    /// best move seen so far.
    fn consider(&mut self, proposal: Vec<(usize, Vec<usize>)>) {
        let mut before = 0_i128;
        let mut after = 0_i128;
        let mut changes = Vec::with_capacity(proposal.len());
        for (route_index, sequence) in proposal {
            let Some(route) = self.plan.routes.get(route_index) else {
                return;
            };
            if !keeps_pins(self.instance, &route.sequence, &sequence) {
                return;
            }
            let Ok(schedule) = evaluate(self.instance, route.slot, &sequence) else {
                return;
            };
            before += i128::from(route.cost());
            after += i128::from(schedule.cost());
            changes.push((route_index, sequence, schedule));
        }
        let gain = before - after;
        if gain > 0 && self.best.as_ref().is_none_or(|current| gain > current.gain) {
            self.best = Some(Move { gain, changes });
        }
    }

    fn two_opt(&mut self, route_index: usize, route: &RouteState) {
        let len = route.sequence.len();
        for i in 0..len {
            for j in (i + 1)..len {
                let mut sequence = route.sequence.clone();
                if let Some(segment) = sequence.get_mut(i..=j) {
                    segment.reverse();
                }
                self.consider(vec![(route_index, sequence)]);
            }
        }
    }

    fn relocate(&mut self, from_index: usize, from: &RouteState) {
        for (i, &stop) in from.sequence.iter().enumerate() {
            let mut shortened = from.sequence.clone();
            shortened.remove(i);
            for (to_index, to) in self.plan.routes.iter().enumerate() {
                if to_index == from_index {
                    for j in (0..=shortened.len()).filter(|&j| j != i) {
                        let mut sequence = shortened.clone();
                        sequence.insert(j, stop);
                        self.consider(vec![(from_index, sequence)]);
                    }
                } else if !to.is_empty() {
                    for j in 0..=to.sequence.len() {
                        let mut target = to.sequence.clone();
                        target.insert(j, stop);
                        self.consider(vec![(from_index, shortened.clone()), (to_index, target)]);
                    }
                }
            }
        }
    }

    fn exchange(&mut self, left_index: usize, left: &RouteState) {
        for (right_index, right) in self.plan.routes.iter().enumerate().skip(left_index + 1) {
            for (i, &a) in left.sequence.iter().enumerate() {
                for (j, &b) in right.sequence.iter().enumerate() {
                    let mut left_sequence = left.sequence.clone();
                    let mut right_sequence = right.sequence.clone();
                    if let (Some(x), Some(y)) = (left_sequence.get_mut(i), right_sequence.get_mut(j))
                    {
                        *x = b;
                        *y = a;
                    }
                    self.consider(vec![(left_index, left_sequence), (right_index, right_sequence)]);
                }
            }
        }
    }
}

/// `true` when every pinned stop of `before` sits at the same index in `after`.
fn keeps_pins(instance: &Instance<'_>, before: &[usize], after: &[usize]) -> bool {
    before.iter().enumerate().all(|(index, &stop)| {
        let pinned = instance.stop(stop).is_some_and(dispatch_core::Stop::is_pinned);
        !pinned || after.get(index) == Some(&stop)
    })
}

/// Improve `plan` in place.
pub(crate) fn improve(
    instance: &Instance<'_>,
    plan: &mut Plan,
    budget: Budget,
    cancel: &dyn CancelSignal,
) -> Result<Stats, SolveError> {
    let mut stats = Stats::default();
    while stats.passes < budget.max_passes {
        if Instant::now() >= budget.deadline {
            log::debug!("improvement stopped by time budget after {} passes", stats.passes);
            break;
        }
        stats.passes += 1;

        let mut search = Search {
            instance,
            plan,
            best: None,
        };
        for (route_index, route) in plan.routes.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SolveError::Cancelled);
            }
            search.two_opt(route_index, route);
            search.relocate(route_index, route);
            search.exchange(route_index, route);
        }

        let Some(best) = search.best else {
            break;
        };
        log::trace!("pass {} applies move with gain {}", stats.passes, best.gain);
        for (route_index, sequence, schedule) in best.changes {
            if let Some(route) = plan.routes.get_mut(route_index) {
                route.sequence = sequence;
                route.schedule = schedule;
            }
        }
        stats.moves += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::construct;
    use dispatch_core::test_support::{PlanarGeoCostProvider, stop_at, vehicle_with};
    use dispatch_core::{NeverCancelled, Priority, SolveRequest, TimeWindow};
    use geo::Coord;
    use rstest::rstest;
    use std::time::Duration;

    fn budget() -> Budget {
        Budget {
            max_passes: 50,
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    #[rstest]
    fn never_increases_cost() {
        let mut request = SolveRequest::new(Coord { x: 0.0, y: 0.0 });
        request.vehicles = vec![
            vehicle_with(1, 10, TimeWindow::all_day()),
            vehicle_with(2, 10, TimeWindow::all_day()),
        ];
        request.stops = vec![
            stop_at(1, 5.0, 0.0, 1, TimeWindow::all_day()),
            stop_at(2, 1.0, 0.0, 1, TimeWindow::all_day()),
            stop_at(3, 4.0, 0.0, 1, TimeWindow::all_day()),
            stop_at(4, 2.0, 0.0, 1, TimeWindow::all_day()),
            stop_at(5, 3.0, 0.0, 1, TimeWindow::all_day()),
        ];
        let provider = PlanarGeoCostProvider::default();
        let instance = Instance::build(&request, &provider, 10).expect("instance");
        let mut plan = construct(&instance, &NeverCancelled).expect("construct");
        let before = plan.total_cost();
        improve(&instance, &mut plan, budget(), &NeverCancelled).expect("improve");
        assert!(plan.total_cost() <= before);
    }

    #[rstest]
    fn pinned_stops_keep_their_slot() {
        let mut request = SolveRequest::new(Coord { x: 0.0, y: 0.0 });
        request.vehicles = vec![vehicle_with(1, 10, TimeWindow::all_day())];
        request.stops = vec![
            stop_at(1, 5.0, 0.0, 1, TimeWindow::all_day()).with_priority(Priority::Critical),
            stop_at(2, 1.0, 0.0, 1, TimeWindow::all_day()),
            stop_at(3, 3.0, 0.0, 1, TimeWindow::all_day()),
        ];
        let provider = PlanarGeoCostProvider::default();
        let instance = Instance::build(&request, &provider, 10).expect("instance");
        let mut plan = construct(&instance, &NeverCancelled).expect("construct");
        let route = plan.routes.first().expect("one route");
        let pinned_at = route.sequence.iter().position(|&stop| stop == 0);
        improve(&instance, &mut plan, budget(), &NeverCancelled).expect("improve");
        let route = plan.routes.first().expect("one route");
        assert_eq!(route.sequence.iter().position(|&stop| stop == 0), pinned_at);
    }

    #[rstest]
    fn zero_pass_budget_leaves_plan_untouched() {
        let mut request = SolveRequest::new(Coord { x: 0.0, y: 0.0 });
        request.vehicles = vec![vehicle_with(1, 10, TimeWindow::all_day())];
        request.stops = vec![stop_at(1, 1.0, 0.0, 1, TimeWindow::all_day())];
        let provider = PlanarGeoCostProvider::default();
        let instance = Instance::build(&request, &provider, 10).expect("instance");
        let mut plan = construct(&instance, &NeverCancelled).expect("construct");
        let stats = improve(
            &instance,
            &mut plan,
            Budget {
                max_passes: 0,
                deadline: Instant::now() + Duration::from_secs(1),
            },
            &NeverCancelled,
        )
        .expect("improve");
        assert_eq!(stats, Stats::default());
    }
}
