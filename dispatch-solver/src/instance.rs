//! Matrix-indexed view of a solve request.
//!
//! Every location the solve touches (shared depot, vehicle starts, home
//! depots, stops) is interned into a single point list so the provider is
//! queried exactly once. Identical coordinates share a matrix row.

use std::time::Duration;

use dispatch_core::{
    CostMatrix, GeoCostError, GeoCostProvider, SolveRequest, Stop, Vehicle, VehicleId,
};
use geo::Coord;

/// Matrix indices for one vehicle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VehicleSlot {
    /// Position in `SolveRequest::vehicles`.
    pub(crate) index: usize,
    pub(crate) id: VehicleId,
    pub(crate) start_point: usize,
    pub(crate) depot_point: usize,
}

/// Request data plus the cost matrix, addressed by stop and slot index.
#[derive(Debug)]
pub(crate) struct Instance<'r> {
    request: &'r SolveRequest,
    matrix: CostMatrix,
    stop_points: Vec<usize>,
    slots: Vec<VehicleSlot>,
    penalty_per_second: u64,
}

#[derive(Default)]
struct PointTable {
    points: Vec<Coord<f64>>,
}

impl PointTable {
    fn intern(&mut self, point: Coord<f64>) -> usize {
        let existing = self.points.iter().position(|known| {
            known.x.to_bits() == point.x.to_bits() && known.y.to_bits() == point.y.to_bits()
        });
        existing.unwrap_or_else(|| {
            self.points.push(point);
            self.points.len() - 1
        })
    }
}

impl<'r> Instance<'r> {
    /// Intern every location and fetch the matrix in one provider call.
    pub(crate) fn build<G>(
        request: &'r SolveRequest,
        provider: &G,
        penalty_per_second: u64,
    ) -> Result<Self, GeoCostError>
    where
        G: GeoCostProvider + ?Sized,
    {
        let mut table = PointTable::default();
        table.intern(request.depot);

        let mut slots: Vec<VehicleSlot> = request
            .vehicles
            .iter()
            .enumerate()
            .map(|(index, vehicle)| VehicleSlot {
                index,
                id: vehicle.id,
                start_point: table.intern(vehicle.start_location(request.depot)),
                depot_point: table.intern(vehicle.depot_or(request.depot)),
            })
            .collect();
        slots.sort_by_key(|slot| slot.id);

        let stop_points = request
            .stops
            .iter()
            .map(|stop| table.intern(stop.location))
            .collect();

        let matrix = provider.get_matrix(&table.points)?;
        matrix.ensure_len(table.points.len())?;
        log::debug!(
            "fetched {n}x{n} cost matrix for {stops} stops and {vehicles} vehicles",
            n = table.points.len(),
            stops = request.stops.len(),
            vehicles = request.vehicles.len(),
        );

        Ok(Self {
            request,
            matrix,
            stop_points,
            slots,
            penalty_per_second,
        })
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.request.stops.len()
    }

    pub(crate) fn stop(&self, stop: usize) -> Option<&'r Stop> {
        self.request.stops.get(stop)
    }

    pub(crate) fn stop_point(&self, stop: usize) -> Option<usize> {
        self.stop_points.get(stop).copied()
    }

    /// Vehicle slots ordered by vehicle id.
    pub(crate) fn slots(&self) -> &[VehicleSlot] {
        &self.slots
    }

    pub(crate) fn slot(&self, slot: usize) -> Option<&VehicleSlot> {
        self.slots.get(slot)
    }

    pub(crate) fn vehicle(&self, slot: usize) -> Option<&'r Vehicle> {
        self.slots
            .get(slot)
            .and_then(|entry| self.request.vehicles.get(entry.index))
    }

    /// Travel time and distance between two points; `None` when unreachable.
    pub(crate) fn leg(&self, from: usize, to: usize) -> Option<(Duration, u64)> {
        if self.matrix.is_unreachable(from, to) {
            return None;
        }
        Some((self.matrix.duration(from, to)?, self.matrix.distance(from, to)?))
    }

    pub(crate) const fn penalty_per_second(&self) -> u64 {
        self.penalty_per_second
    }

    pub(crate) const fn soft_time_windows(&self) -> bool {
        self.request.constraints.soft_time_windows
    }

    pub(crate) const fn max_route_duration(&self) -> Option<Duration> {
        self.request.constraints.max_route_duration
    }
}
