//! Benchmark support utilities for the insertion solver.
//!
//! Provides deterministic, clustered delivery requests so runs are
//! comparable across commits.

use std::time::Duration;

use dispatch_core::{
    CylinderSize, Load, Priority, SolveRequest, Stop, StopId, TimeWindow, Vehicle, VehicleId,
};
use geo::Coord;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed for deterministic random number generation in benchmarks.
pub const BENCHMARK_SEED: u64 = 42;

/// Number of delivery clusters (neighbourhoods).
const CLUSTER_COUNT: usize = 5;

/// Side of the square service area, in kilometres.
const AREA_KM: f64 = 20.0;

/// Spread of stops around a cluster centre, in kilometres.
const CLUSTER_SPREAD_KM: f64 = 1.5;

/// Depot coordinate on both axes: the centre of the service area.
const DEPOT_KM: f64 = 10.0;

const HOUR: u64 = 3_600;

/// Generate a request with `stops` clustered deliveries and `vehicles` trucks.
///
/// Roughly one stop in ten is urgent. Windows are two to four hours wide and
/// open between 08:00 and 14:00; every truck carries 20 small and 6 large
/// cylinders over a 07:00–19:00 shift.
#[must_use]
pub fn generate_request(stops: usize, vehicles: usize, seed: u64) -> SolveRequest {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let centres: Vec<Coord<f64>> = (0..CLUSTER_COUNT)
        .map(|_| Coord {
            x: rng.gen_range(0.0..AREA_KM),
            y: rng.gen_range(0.0..AREA_KM),
        })
        .collect();

    let mut request = SolveRequest::new(Coord {
        x: DEPOT_KM,
        y: DEPOT_KM,
    });
    request.stops = (0..stops)
        .zip(1..)
        .map(|(index, id)| generate_stop(&mut rng, &centres, index, id))
        .collect();
    request.vehicles = (1..)
        .take(vehicles)
        .map(|id| {
            Vehicle::new(
                VehicleId(id),
                Load::single(CylinderSize::KG_20, 20).with(CylinderSize::KG_45, 6),
                TimeWindow::from_hours(7, 19),
            )
        })
        .collect();
    request
}

fn generate_stop(rng: &mut ChaCha8Rng, centres: &[Coord<f64>], index: usize, id: u64) -> Stop {
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "Modulo for cyclic cluster assignment is intentional"
    )]
    let centre = centres
        .get(index % CLUSTER_COUNT)
        .copied()
        .unwrap_or(Coord { x: 0.0, y: 0.0 });
    let dx: f64 = rng.gen_range(-CLUSTER_SPREAD_KM..CLUSTER_SPREAD_KM);
    let dy: f64 = rng.gen_range(-CLUSTER_SPREAD_KM..CLUSTER_SPREAD_KM);
    #[expect(clippy::float_arithmetic, reason = "Required for coordinate offset")]
    let location = Coord {
        x: centre.x + dx,
        y: centre.y + dy,
    };

    let opens = rng.gen_range(8..=14);
    let width = rng.gen_range(2..=4);
    let window = TimeWindow::new(
        Duration::from_secs(opens * HOUR),
        Duration::from_secs((opens + width) * HOUR),
    );
    let demand = Load::single(CylinderSize::KG_20, rng.gen_range(0..=3))
        .with(CylinderSize::KG_45, rng.gen_range(0..=1));
    let priority = if rng.gen_bool(0.1) {
        Priority::Urgent
    } else {
        Priority::Normal
    };

    Stop::new(StopId(id), location, demand, window)
        .with_priority(priority)
        .with_service_duration(Duration::from_secs(5 * 60))
}
