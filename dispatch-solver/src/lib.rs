//! Capacitated vehicle routing with time windows for cylinder deliveries.
//!
//! This crate provides [`InsertionSolver`], the canonical implementation of
//! the [`Solver`](dispatch_core::Solver) trait. A solve runs in three steps:
//!
//! 1. Every location is interned and a single cost matrix is fetched from the
//!    configured [`GeoCostProvider`](dispatch_core::GeoCostProvider).
//! 2. Stops are inserted greedily, most constrained first, into the route
//!    where they add the least distance while staying capacity and
//!    time-window feasible.
//! 3. A bounded local search applies 2-opt, relocate and exchange moves that
//!    strictly reduce cost. Urgent and critical stops keep their position.
//!
//! The solver is deterministic: equal inputs give equal routes.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod construction;
mod improvement;
mod instance;
mod plan;
mod schedule;
mod solver;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use solver::{InsertionSolver, InsertionSolverConfig, RouteInsertion};
