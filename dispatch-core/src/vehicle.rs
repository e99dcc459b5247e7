//! Delivery vehicles.

use geo::Coord;

use crate::{DriverId, Load, TimeWindow, VehicleId};

/// A vehicle available for dispatch.
///
/// Routes start at the vehicle's current position (or its depot) no earlier
/// than the start of the shift and must return to the depot before the shift
/// ends. Vehicles without a home depot use the depot of the solve request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vehicle {
    /// Unique vehicle identifier.
    pub id: VehicleId,
    /// Cylinders the vehicle can carry, per size.
    pub capacity: Load,
    /// Home depot; `None` means the shared planning depot.
    #[cfg_attr(feature = "serde", serde(default))]
    pub depot: Option<Coord<f64>>,
    /// Last known position; `None` while parked at the depot.
    #[cfg_attr(feature = "serde", serde(default))]
    pub position: Option<Coord<f64>>,
    /// Working shift of the assigned driver.
    pub shift: TimeWindow,
    /// Driver currently assigned to the vehicle.
    #[cfg_attr(feature = "serde", serde(default))]
    pub driver: Option<DriverId>,
    /// Cleared while the coordinator holds the vehicle for an assignment.
    #[cfg_attr(feature = "serde", serde(default = "available_by_default"))]
    pub available: bool,
}

#[cfg(feature = "serde")]
const fn available_by_default() -> bool {
    true
}

impl Vehicle {
    /// Create an available vehicle using the shared planning depot.
    #[must_use]
    pub const fn new(id: VehicleId, capacity: Load, shift: TimeWindow) -> Self {
        Self {
            id,
            capacity,
            depot: None,
            position: None,
            shift,
            driver: None,
            available: true,
        }
    }

    /// Set the home depot.
    #[must_use]
    pub const fn with_depot(mut self, depot: Coord<f64>) -> Self {
        self.depot = Some(depot);
        self
    }

    /// Assign a driver.
    #[must_use]
    pub const fn with_driver(mut self, driver: DriverId) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Record the vehicle's current position.
    #[must_use]
    pub const fn with_position(mut self, position: Coord<f64>) -> Self {
        self.position = Some(position);
        self
    }

    /// Depot the vehicle returns to, falling back to `shared`.
    #[must_use]
    pub fn depot_or(&self, shared: Coord<f64>) -> Coord<f64> {
        self.depot.unwrap_or(shared)
    }

    /// Where the next route for this vehicle begins.
    #[must_use]
    pub fn start_location(&self, shared_depot: Coord<f64>) -> Coord<f64> {
        self.position.unwrap_or_else(|| self.depot_or(shared_depot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CylinderSize;
    use rstest::rstest;

    #[rstest]
    fn start_prefers_position_then_home_depot() {
        let shared = Coord { x: 0.0, y: 0.0 };
        let home = Coord { x: 1.0, y: 1.0 };
        let vehicle = Vehicle::new(
            VehicleId(1),
            Load::single(CylinderSize::KG_20, 5),
            TimeWindow::from_hours(6, 18),
        );
        assert_eq!(vehicle.start_location(shared), shared);

        let homed = vehicle.with_depot(home);
        assert_eq!(homed.start_location(shared), home);

        let moving = homed.with_position(Coord { x: 2.0, y: 2.0 });
        assert_eq!(moving.start_location(shared), Coord { x: 2.0, y: 2.0 });
        assert_eq!(moving.depot_or(shared), home);
    }
}
