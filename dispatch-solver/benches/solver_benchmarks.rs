//! Criterion benchmarks for the insertion solver.
//!
//! Measures solve time across problem sizes (25, 50, 100 stops) to track
//! performance and detect regressions.
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench --package dispatch-solver
//! ```

// Criterion macros generate code that triggers missing_docs warnings.
#![allow(missing_docs, reason = "Criterion macros generate undocumented code")]

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dispatch_core::Solver;
use dispatch_core::test_support::PlanarGeoCostProvider;
use dispatch_solver::{InsertionSolver, InsertionSolverConfig};

mod bench_support;

use bench_support::{BENCHMARK_SEED, generate_request};

/// Problem sizes to benchmark as (stops, vehicles).
const PROBLEM_SIZES: &[(usize, usize)] = &[(25, 2), (50, 4), (100, 8)];

/// Benchmark solve times for various problem sizes.
///
/// The improvement phase is capped at half a second so the largest instance
/// measures construction plus a bounded search rather than convergence.
fn bench_solve_times(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_time");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));

    let config = InsertionSolverConfig::default().with_time_budget(Duration::from_millis(500));
    let solver = InsertionSolver::with_config(PlanarGeoCostProvider::default(), config);

    for &(stops, vehicles) in PROBLEM_SIZES {
        let request = generate_request(stops, vehicles, BENCHMARK_SEED);

        let throughput_size = u64::try_from(stops).unwrap_or(u64::MAX);
        group.throughput(Throughput::Elements(throughput_size));
        group.bench_with_input(BenchmarkId::new("stops", stops), &stops, |b, _| {
            b.iter(|| {
                #[expect(
                    clippy::let_underscore_must_use,
                    reason = "Benchmarking solve performance, result is intentionally discarded"
                )]
                let _ = solver.solve(&request);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_solve_times);
criterion_main!(benches);
