//! Test helpers for writing solve requests into temporary workspaces.

use camino::{Utf8Path, Utf8PathBuf};
use dispatch_core::test_support::{stop_at, vehicle_with};
use dispatch_core::{SolveRequest, TimeWindow};
use geo::Coord;
use tempfile::TempDir;

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    std::fs::write(path.as_std_path(), contents).expect("write test file");
}

/// A temporary directory plus the request path inside it.
pub(super) fn request_workspace() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf-8 workspace");
    let request_path = root.join("plan.json");
    (tmp, request_path)
}

/// Three morning deliveries for one van.
pub(super) fn morning_request() -> SolveRequest {
    let mut request = SolveRequest::new(Coord { x: 0.0, y: 0.0 });
    let window = TimeWindow::from_hours(9, 12);
    request.stops.extend([
        stop_at(1, 1.0, 0.0, 2, window),
        stop_at(2, 2.0, 0.0, 2, window),
        stop_at(3, 3.0, 0.0, 2, window),
    ]);
    request
        .vehicles
        .push(vehicle_with(1, 6, TimeWindow::from_hours(8, 18)));
    request
}

pub(super) fn write_request(path: &Utf8Path, request: &SolveRequest) {
    let payload = serde_json::to_string_pretty(request).expect("serialise request");
    write_utf8(path, payload.as_bytes());
}
