//! `InsertionSolver`: cheapest insertion followed by bounded local search.

use std::time::{Duration, Instant};

use dispatch_core::{
    CancelSignal, Diagnostics, GeoCostProvider, PlannedRoute, Priority, SolveConstraints,
    SolveError, SolveRequest, SolveResponse, Solver, Stop, UnassignedReason, UnassignedStop,
    Vehicle,
};
use geo::Coord;

use crate::construction::construct;
use crate::improvement::{Budget, improve};
use crate::instance::Instance;

/// Configuration for [`InsertionSolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertionSolverConfig {
    /// Upper bound on local-search passes.
    ///
    /// This is the reproducible bound: two solves of the same request that
    /// stop on the pass budget (or on a local optimum) return the same plan.
    pub max_improvement_passes: u32,
    /// Wall-clock cap on the improvement phase, checked between passes.
    ///
    /// When it expires before the pass budget, the plan depends on machine
    /// speed and load. Keep it generous relative to the pass budget when
    /// repeatable output matters.
    pub time_budget: Duration,
    /// Cost added per second of lateness when soft windows are enabled.
    pub lateness_penalty_per_second: u64,
}

impl InsertionSolverConfig {
    /// Override the pass budget.
    #[must_use]
    pub const fn with_max_improvement_passes(mut self, passes: u32) -> Self {
        self.max_improvement_passes = passes;
        self
    }

    /// Override the improvement time budget.
    #[must_use]
    pub const fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    /// Override the lateness penalty rate.
    #[must_use]
    pub const fn with_lateness_penalty_per_second(mut self, penalty: u64) -> Self {
        self.lateness_penalty_per_second = penalty;
        self
    }
}

impl Default for InsertionSolverConfig {
    fn default() -> Self {
        Self {
            max_improvement_passes: 50,
            time_budget: Duration::from_secs(2),
            lateness_penalty_per_second: 10,
        }
    }
}

/// Outcome of re-planning one vehicle around an emergency stop.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInsertion {
    /// New plan for the vehicle, emergency stop included.
    pub route: PlannedRoute,
    /// Previously planned stops that no longer fit.
    pub dropped: Vec<UnassignedStop>,
}

/// Canonical CVRPTW solver.
///
/// Builds routes by cheapest feasible insertion (most constrained stops
/// first) and refines them with 2-opt, relocate and exchange moves. The
/// provider is queried once per solve for every location involved.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use dispatch_core::test_support::{UnitGeoCostProvider, stop_at, vehicle_with};
/// use dispatch_core::{SolveRequest, Solver, TimeWindow};
/// use dispatch_solver::InsertionSolver;
///
/// let mut request = SolveRequest::new(Coord { x: 0.0, y: 0.0 });
/// request.stops.push(stop_at(1, 1.0, 0.0, 2, TimeWindow::from_hours(8, 10)));
/// request.vehicles.push(vehicle_with(1, 5, TimeWindow::from_hours(7, 18)));
///
/// let response = InsertionSolver::new(UnitGeoCostProvider).solve(&request)?;
/// assert_eq!(response.routes.len(), 1);
/// assert!(response.unassigned.is_empty());
/// # Ok::<(), dispatch_core::SolveError>(())
/// ```
#[derive(Debug, Clone)]
pub struct InsertionSolver<G> {
    provider: G,
    config: InsertionSolverConfig,
}

impl<G> InsertionSolver<G>
where
    G: GeoCostProvider + Send + Sync,
{
    /// Construct a solver using default configuration.
    #[must_use]
    pub fn new(provider: G) -> Self {
        Self::with_config(provider, InsertionSolverConfig::default())
    }

    /// Construct a solver with explicit configuration.
    #[must_use]
    pub const fn with_config(provider: G, config: InsertionSolverConfig) -> Self {
        Self { provider, config }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &InsertionSolverConfig {
        &self.config
    }

    /// Re-plan `vehicle` so it also serves `emergency`.
    ///
    /// `remaining` holds the stops the vehicle still has to visit; the
    /// vehicle's shift should already start at the current time and its
    /// position should be its current location. The emergency stop is
    /// pinned before solving. Returns `Ok(None)` when the emergency cannot
    /// be served within its window.
    ///
    /// # Errors
    /// Propagates [`SolveError`] from the underlying solve.
    pub fn insert_into_route(
        &self,
        depot: Coord<f64>,
        vehicle: &Vehicle,
        remaining: &[Stop],
        emergency: &Stop,
        constraints: SolveConstraints,
        cancel: &dyn CancelSignal,
    ) -> Result<Option<RouteInsertion>, SolveError> {
        let mut fleet_of_one = vehicle.clone();
        fleet_of_one.available = true;

        let mut request = SolveRequest::new(depot);
        request.constraints = constraints;
        request.vehicles.push(fleet_of_one);
        request.stops.extend(remaining.iter().cloned());
        let mut pinned = emergency.clone();
        pinned.priority = pinned.priority.max(Priority::Critical);
        request.stops.push(pinned);

        let response = self.solve_with_cancel(&request, cancel)?;
        let mut routes = response.routes.into_iter();
        let Some(route) = routes.next() else {
            return Ok(None);
        };
        if route.position_of(emergency.id).is_none() {
            return Ok(None);
        }
        if !response.unassigned.is_empty() {
            log::info!(
                "vehicle {} drops {} stop(s) to absorb {}",
                vehicle.id,
                response.unassigned.len(),
                emergency.id
            );
        }
        Ok(Some(RouteInsertion {
            route,
            dropped: response.unassigned,
        }))
    }
}

impl<G> Solver for InsertionSolver<G>
where
    G: GeoCostProvider + Send + Sync,
{
    fn solve_with_cancel(
        &self,
        request: &SolveRequest,
        cancel: &dyn CancelSignal,
    ) -> Result<SolveResponse, SolveError> {
        request.validate_detailed()?;
        let started_at = Instant::now();

        if request.stops.is_empty() {
            return Ok(SolveResponse {
                diagnostics: Diagnostics {
                    solve_time: started_at.elapsed(),
                    ..Diagnostics::default()
                },
                ..SolveResponse::default()
            });
        }
        if request.vehicles.is_empty() {
            log::warn!(
                "no vehicles available; {} stop(s) left unassigned",
                request.stops.len()
            );
            return Ok(SolveResponse {
                routes: Vec::new(),
                unassigned: request
                    .stops
                    .iter()
                    .map(|stop| UnassignedStop {
                        stop_id: stop.id,
                        reason: UnassignedReason::NoCapacity,
                    })
                    .collect(),
                diagnostics: Diagnostics {
                    solve_time: started_at.elapsed(),
                    ..Diagnostics::default()
                },
            });
        }
        if cancel.is_cancelled() {
            return Err(SolveError::Cancelled);
        }

        let instance = Instance::build(
            request,
            &self.provider,
            self.config.lateness_penalty_per_second,
        )
        .inspect_err(|err| log::warn!("cost matrix unavailable: {err}"))?;

        let mut plan = construct(&instance, cancel)?;
        log::debug!(
            "construction placed {} of {} stops at cost {}",
            request.stops.len() - plan.unassigned.len(),
            request.stops.len(),
            plan.total_cost()
        );

        let budget = Budget {
            max_passes: self.config.max_improvement_passes,
            deadline: started_at + self.config.time_budget,
        };
        let stats = improve(&instance, &mut plan, budget, cancel)?;
        log::debug!(
            "improvement ran {} passes, applied {} moves, final cost {}",
            stats.passes,
            stats.moves,
            plan.total_cost()
        );

        let diagnostics = Diagnostics {
            solve_time: started_at.elapsed(),
            improvement_passes: stats.passes,
            moves_applied: stats.moves,
            ..Diagnostics::default()
        };
        Ok(plan.into_response(&instance, diagnostics))
    }
}

#[cfg(test)]
mod tests;
