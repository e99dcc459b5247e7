//! Deterministic doubles for routing provider tests.
//!
//! [`StubGeoCostProvider`] answers from a script instead of a routing
//! service; [`RecordingSleeper`] records backoff delays without sleeping.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use dispatch_core::{CostMatrix, GeoCostError, GeoCostProvider};
use geo::Coord;

use super::Sleeper;

/// Stub [`GeoCostProvider`] replaying scripted results.
///
/// Results are handed out in order; the final one repeats forever. Empty
/// input still yields [`GeoCostError::EmptyInput`] without consuming the
/// script.
///
/// # Example
///
/// ```
/// use dispatch_core::{GeoCostError, GeoCostProvider};
/// use dispatch_data::routing::test_support::StubGeoCostProvider;
/// use geo::Coord;
///
/// let provider = StubGeoCostProvider::with_unit_matrix(2);
/// let points = [Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }];
/// let matrix = provider.get_matrix(&points)?;
/// assert_eq!(matrix.distance(0, 1), Some(1_000));
/// assert_eq!(provider.calls(), 1);
/// # Ok::<(), GeoCostError>(())
/// ```
#[derive(Debug)]
pub struct StubGeoCostProvider {
    script: Mutex<VecDeque<Result<CostMatrix, GeoCostError>>>,
    calls: AtomicUsize,
}

impl StubGeoCostProvider {
    /// Replay `results` in order, repeating the last one.
    #[must_use]
    pub fn scripted(results: Vec<Result<CostMatrix, GeoCostError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return `matrix`.
    #[must_use]
    pub fn with_matrix(matrix: CostMatrix) -> Self {
        Self::scripted(vec![Ok(matrix)])
    }

    /// Always fail with `error`.
    #[must_use]
    pub fn with_error(error: GeoCostError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    /// Always return a `size`-point matrix of one-minute, one-kilometre edges.
    #[must_use]
    pub fn with_unit_matrix(size: usize) -> Self {
        let durations = (0..size)
            .map(|i| {
                (0..size)
                    .map(|j| if i == j { Duration::ZERO } else { Duration::from_secs(60) })
                    .collect()
            })
            .collect();
        let distances = (0..size)
            .map(|i| (0..size).map(|j| if i == j { 0 } else { 1_000 }).collect())
            .collect();
        Self::scripted(vec![CostMatrix::new(durations, distances)])
    }

    /// Number of non-empty requests answered.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeoCostProvider for StubGeoCostProvider {
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        if points.is_empty() {
            return Err(GeoCostError::EmptyInput);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        next.unwrap_or(Err(GeoCostError::EmptyInput))
    }
}

/// [`Sleeper`] that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Delays requested so far.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}
