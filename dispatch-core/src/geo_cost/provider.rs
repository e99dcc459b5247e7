//! Cost-matrix container and the provider trait.

use std::sync::Arc;
use std::time::Duration;

use geo::Coord;

use super::error::GeoCostError;

/// Square matrices of travel durations and distances.
///
/// `duration(i, j)` and `distance(i, j)` describe travel from point `i` to
/// point `j` of the slice passed to [`GeoCostProvider::get_matrix`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CostMatrix {
    durations: Vec<Vec<Duration>>,
    distances: Vec<Vec<u64>>,
}

impl CostMatrix {
    /// Build a matrix from parallel duration and distance tables.
    ///
    /// # Errors
    /// Returns [`GeoCostError::DimensionMismatch`] when either table is not
    /// square or the two tables differ in size.
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use dispatch_core::CostMatrix;
    ///
    /// let matrix = CostMatrix::new(
    ///     vec![vec![Duration::ZERO, Duration::from_secs(60)], vec![Duration::from_secs(60), Duration::ZERO]],
    ///     vec![vec![0, 500], vec![500, 0]],
    /// )?;
    /// assert_eq!(matrix.distance(0, 1), Some(500));
    /// # Ok::<(), dispatch_core::GeoCostError>(())
    /// ```
    pub fn new(
        durations: Vec<Vec<Duration>>,
        distances: Vec<Vec<u64>>,
    ) -> Result<Self, GeoCostError> {
        let size = durations.len();
        let square = durations.iter().all(|row| row.len() == size)
            && distances.iter().all(|row| row.len() == size);
        if !square || distances.len() != size {
            return Err(GeoCostError::DimensionMismatch {
                expected: size,
                actual: distances.len(),
            });
        }
        Ok(Self {
            durations,
            distances,
        })
    }

    /// Number of points covered.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.durations.len()
    }

    /// `true` when the matrix covers no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Travel time from `from` to `to`; `None` when out of range.
    #[must_use]
    pub fn duration(&self, from: usize, to: usize) -> Option<Duration> {
        self.durations.get(from).and_then(|row| row.get(to)).copied()
    }

    /// Travel distance in metres from `from` to `to`; `None` when out of range.
    #[must_use]
    pub fn distance(&self, from: usize, to: usize) -> Option<u64> {
        self.distances.get(from).and_then(|row| row.get(to)).copied()
    }

    /// `true` when the pair has no road connection.
    #[must_use]
    pub fn is_unreachable(&self, from: usize, to: usize) -> bool {
        self.duration(from, to)
            .is_none_or(|duration| duration == Duration::MAX)
    }

    /// Fail unless the matrix covers exactly `expected` points.
    ///
    /// # Errors
    /// Returns [`GeoCostError::DimensionMismatch`] on a size mismatch.
    pub const fn ensure_len(&self, expected: usize) -> Result<(), GeoCostError> {
        if self.len() == expected {
            Ok(())
        } else {
            Err(GeoCostError::DimensionMismatch {
                expected,
                actual: self.len(),
            })
        }
    }
}

/// Fetch pairwise travel costs for a set of locations.
///
/// Implementers must return a square `n×n` matrix where `n == points.len()`,
/// and must answer the same point set with the same matrix within one solve.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use geo::Coord;
/// use dispatch_core::{CostMatrix, GeoCostError, GeoCostProvider};
///
/// struct MinuteProvider;
///
/// impl GeoCostProvider for MinuteProvider {
///     fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
///         if points.is_empty() {
///             return Err(GeoCostError::EmptyInput);
///         }
///         let n = points.len();
///         let durations = (0..n)
///             .map(|i| (0..n).map(|j| Duration::from_secs(if i == j { 0 } else { 60 })).collect())
///             .collect();
///         let distances = (0..n)
///             .map(|i| (0..n).map(|j| if i == j { 0 } else { 1_000 }).collect())
///             .collect();
///         CostMatrix::new(durations, distances)
///     }
/// }
///
/// let a = Coord { x: 0.0, y: 0.0 };
/// let b = Coord { x: 0.1, y: 0.1 };
/// let eta = MinuteProvider.get_eta(a, b, Duration::ZERO)?;
/// assert_eq!(eta, Duration::from_secs(60));
/// # Ok::<(), GeoCostError>(())
/// ```
pub trait GeoCostProvider {
    /// Return the cost matrix for `points`.
    ///
    /// Implementations must return `Err(GeoCostError::EmptyInput)` when
    /// `points` is empty.
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError>;

    /// Travel time from `from` to `to` when leaving at `depart_at`.
    ///
    /// The default ignores the departure time and reads a 2×2 matrix.
    /// Providers with time-dependent traffic data should override it.
    ///
    /// # Errors
    /// Propagates provider failures and reports [`GeoCostError::Unreachable`]
    /// when no connection exists.
    fn get_eta(
        &self,
        from: Coord<f64>,
        to: Coord<f64>,
        depart_at: Duration,
    ) -> Result<Duration, GeoCostError> {
        let _ = depart_at;
        let matrix = self.get_matrix(&[from, to])?;
        matrix.ensure_len(2)?;
        if matrix.is_unreachable(0, 1) {
            return Err(GeoCostError::Unreachable { from: 0, to: 1 });
        }
        matrix
            .duration(0, 1)
            .ok_or(GeoCostError::DimensionMismatch {
                expected: 2,
                actual: matrix.len(),
            })
    }
}

impl<T: GeoCostProvider + ?Sized> GeoCostProvider for Arc<T> {
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        (**self).get_matrix(points)
    }

    fn get_eta(
        &self,
        from: Coord<f64>,
        to: Coord<f64>,
        depart_at: Duration,
    ) -> Result<Duration, GeoCostError> {
        (**self).get_eta(from, to, depart_at)
    }
}

impl<T: GeoCostProvider + ?Sized> GeoCostProvider for &T {
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        (**self).get_matrix(points)
    }

    fn get_eta(
        &self,
        from: Coord<f64>,
        to: Coord<f64>,
        depart_at: Duration,
    ) -> Result<Duration, GeoCostError> {
        (**self).get_eta(from, to, depart_at)
    }
}
