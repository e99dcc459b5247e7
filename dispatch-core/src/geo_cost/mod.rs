//! Travel durations and distances between locations.
//!
//! The [`GeoCostProvider`] trait abstracts retrieval of pairwise costs
//! between coordinates. Callers pass every location they need in one slice
//! and receive a square [`CostMatrix`]; batching keeps routing-service round
//! trips to one per solve.
//!
//! Unreachable pairs are reported as [`Duration::MAX`](std::time::Duration::MAX)
//! and `u64::MAX` metres so solvers can treat them as infeasible edges.

mod error;
mod provider;

pub use error::GeoCostError;
pub use provider::{CostMatrix, GeoCostProvider};
