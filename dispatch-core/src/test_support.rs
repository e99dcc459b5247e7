//! Deterministic doubles for unit and behaviour tests.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `test-support` feature.

#![cfg_attr(docsrs, doc(cfg(feature = "test-support")))]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use geo::Coord;

use crate::{
    Alert, AlertCode, AlertSink, Clock, CostMatrix, CylinderSize, GeoCostError, GeoCostProvider,
    Load, Stop, StopId, TimeWindow, Vehicle, VehicleId,
};

/// Provider returning one-minute, one-kilometre edges between distinct points.
#[derive(Default, Debug, Copy, Clone)]
pub struct UnitGeoCostProvider;

impl GeoCostProvider for UnitGeoCostProvider {
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        if points.is_empty() {
            return Err(GeoCostError::EmptyInput);
        }
        let n = points.len();
        let durations = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            Duration::ZERO
                        } else {
                            Duration::from_secs(60)
                        }
                    })
                    .collect()
            })
            .collect();
        let distances = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 0 } else { 1_000 }).collect())
            .collect();
        CostMatrix::new(durations, distances)
    }
}

/// Provider treating coordinates as kilometres on a flat plane.
///
/// Distances are Euclidean, rounded to whole metres; durations divide the
/// distance by a constant speed. Useful for scenarios where geometry matters.
#[derive(Debug, Copy, Clone)]
pub struct PlanarGeoCostProvider {
    metres_per_second: f64,
}

impl PlanarGeoCostProvider {
    /// Provider driving at `kmh` kilometres per hour.
    #[must_use]
    #[expect(clippy::float_arithmetic, reason = "speed conversion for test geometry")]
    pub fn with_speed_kmh(kmh: f64) -> Self {
        Self {
            metres_per_second: kmh / 3.6,
        }
    }

    #[expect(
        clippy::float_arithmetic,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "planar geometry for deterministic tests"
    )]
    fn edge(&self, from: Coord<f64>, to: Coord<f64>) -> (Duration, u64) {
        let metres = ((to.x - from.x).hypot(to.y - from.y) * 1_000.0).round();
        let seconds = (metres / self.metres_per_second).round();
        (Duration::from_secs(seconds as u64), metres as u64)
    }
}

impl Default for PlanarGeoCostProvider {
    fn default() -> Self {
        Self::with_speed_kmh(36.0)
    }
}

impl GeoCostProvider for PlanarGeoCostProvider {
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        if points.is_empty() {
            return Err(GeoCostError::EmptyInput);
        }
        let (durations, distances) = points
            .iter()
            .map(|from| {
                points
                    .iter()
                    .map(|to| self.edge(*from, *to))
                    .unzip::<_, _, Vec<_>, Vec<_>>()
            })
            .unzip();
        CostMatrix::new(durations, distances)
    }
}

/// Settable [`Clock`] for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// A clock reading `now`.
    #[must_use]
    pub fn at(now: Duration) -> Self {
        let clock = Self::default();
        clock.set(now);
        clock
    }

    /// Jump to `now`.
    pub fn set(&self, now: Duration) {
        let millis = u64::try_from(now.as_millis()).unwrap_or(u64::MAX);
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.set(self.now().saturating_add(delta));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// [`AlertSink`] keeping every alert in memory.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    /// Alerts received so far.
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of alerts with `code`.
    #[must_use]
    pub fn count(&self, code: AlertCode) -> usize {
        self.alerts()
            .iter()
            .filter(|alert| alert.code == code)
            .count()
    }
}

impl AlertSink for RecordingAlertSink {
    fn emit(&self, alert: &Alert) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
    }
}

/// A normal-priority stop demanding `qty` 20 kg cylinders at `(x, y)`.
#[must_use]
pub fn stop_at(id: u64, x: f64, y: f64, qty: i64, window: TimeWindow) -> Stop {
    Stop::new(
        StopId(id),
        Coord { x, y },
        Load::single(CylinderSize::KG_20, qty),
        window,
    )
}

/// A vehicle carrying `qty` 20 kg cylinders with the given shift.
#[must_use]
pub fn vehicle_with(id: u64, qty: i64, shift: TimeWindow) -> Vehicle {
    Vehicle::new(VehicleId(id), Load::single(CylinderSize::KG_20, qty), shift)
}
