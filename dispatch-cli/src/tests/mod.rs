//! Shared test harness modules for the dispatch CLI.
#![expect(
    clippy::panic,
    reason = "tests panic on unexpected CLI outcomes to surface them clearly"
)]

use super::*;

mod helpers;
mod solve_unit;
