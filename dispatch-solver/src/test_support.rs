//! Test-only utilities for `dispatch-solver`.
//!
//! The helpers in this module are available to unit tests and behavioural
//! tests. They are gated behind the `test-support` feature (and `cfg(test)`).

use std::time::Duration;

use dispatch_core::{
    CostMatrix, CylinderSize, GeoCostError, GeoCostProvider, Load, Priority, SolveRequest, Stop,
    StopId, TimeWindow, Vehicle, VehicleId,
};
use geo::Coord;

const HOUR: u64 = 3_600;
const MINUTE: u64 = 60;

/// A [`GeoCostProvider`] returning a fixed, pre-defined matrix.
///
/// The matrix must match the number of points passed to
/// [`GeoCostProvider::get_matrix`]; a mismatch yields
/// [`GeoCostError::DimensionMismatch`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use geo::Coord;
/// use dispatch_core::GeoCostProvider;
/// use dispatch_solver::test_support::FixedMatrixGeoCostProvider;
///
/// let provider = FixedMatrixGeoCostProvider::from_seconds(vec![vec![0, 30], vec![30, 0]]);
/// let points = [Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }];
/// let matrix = provider.get_matrix(&points)?;
/// assert_eq!(matrix.duration(0, 1), Some(Duration::from_secs(30)));
/// assert_eq!(matrix.distance(0, 1), Some(300));
/// # Ok::<(), dispatch_core::GeoCostError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FixedMatrixGeoCostProvider {
    matrix: CostMatrix,
}

impl FixedMatrixGeoCostProvider {
    /// Construct a provider from a pre-built matrix.
    #[must_use]
    pub const fn new(matrix: CostMatrix) -> Self {
        Self { matrix }
    }

    /// Build from integer seconds, driving at 10 m/s.
    ///
    /// Ragged input is kept as-is so dimension checks can be exercised.
    #[must_use]
    pub fn from_seconds(seconds: Vec<Vec<u64>>) -> Self {
        let distances = seconds
            .iter()
            .map(|row| row.iter().map(|secs| secs.saturating_mul(10)).collect())
            .collect();
        let durations = seconds
            .into_iter()
            .map(|row| row.into_iter().map(Duration::from_secs).collect())
            .collect();
        let matrix = CostMatrix::new(durations, distances).unwrap_or_default();
        Self { matrix }
    }
}

impl GeoCostProvider for FixedMatrixGeoCostProvider {
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        if points.is_empty() {
            return Err(GeoCostError::EmptyInput);
        }
        self.matrix.ensure_len(points.len())?;
        Ok(self.matrix.clone())
    }
}

/// The three-stop morning scenario around a depot at the origin.
///
/// - A: 2 × 20 kg, 08:00–10:00, at (3, 0)
/// - B: 1 × 20 kg, 09:00–11:00, at (3, 2)
/// - C: 3 × 20 kg, 08:30–09:30, urgent, at (1, 0)
///
/// One vehicle with `capacity` × 20 kg works 08:00–18:00. Coordinates are
/// kilometres for [`PlanarGeoCostProvider`](dispatch_core::test_support::PlanarGeoCostProvider).
#[must_use]
pub fn morning_scenario(capacity: i64) -> SolveRequest {
    let mut request = SolveRequest::new(Coord { x: 0.0, y: 0.0 });
    request.stops = vec![
        scenario_stop(1, (3.0, 0.0), 2, (8 * HOUR, 10 * HOUR)),
        scenario_stop(2, (3.0, 2.0), 1, (9 * HOUR, 11 * HOUR)),
        scenario_stop(3, (1.0, 0.0), 3, (8 * HOUR + 30 * MINUTE, 9 * HOUR + 30 * MINUTE))
            .with_priority(Priority::Urgent),
    ];
    request.vehicles = vec![Vehicle::new(
        VehicleId(1),
        Load::single(CylinderSize::KG_20, capacity),
        TimeWindow::from_hours(8, 18),
    )];
    request
}

fn scenario_stop(id: u64, (x, y): (f64, f64), qty: i64, (earliest, latest): (u64, u64)) -> Stop {
    Stop::new(
        StopId(id),
        Coord { x, y },
        Load::single(CylinderSize::KG_20, qty),
        TimeWindow::new(Duration::from_secs(earliest), Duration::from_secs(latest)),
    )
}
