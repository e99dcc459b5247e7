//! Tests for `DispatchStore`.

use std::sync::Arc;
use std::thread;

use super::*;
use dispatch_core::test_support::{ManualClock, stop_at};
use dispatch_core::{EventKind, Load, TimeWindow, Visit};
use rstest::{fixture, rstest};

#[derive(Debug, Default)]
struct RecordingListener {
    events: Mutex<Vec<TrackingEvent>>,
}

impl RecordingListener {
    fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(TrackingEvent::kind).collect()
    }
}

impl ChangeListener for RecordingListener {
    fn on_commit(&self, event: &TrackingEvent) {
        self.events.lock().push(event.clone());
    }
}

struct Harness {
    store: DispatchStore,
    listener: Arc<RecordingListener>,
}

#[fixture]
fn harness() -> Harness {
    let listener = Arc::new(RecordingListener::default());
    let clock = Arc::new(ManualClock::at(Duration::from_secs(8 * 3_600)));
    Harness {
        store: DispatchStore::new(clock, Arc::clone(&listener) as Arc<dyn ChangeListener>),
        listener,
    }
}

fn plan(stop_ids: &[u64]) -> PlannedRoute {
    let mut plan = PlannedRoute::empty(VehicleId(1), Duration::from_secs(8 * 3_600));
    for &id in stop_ids {
        plan.stops.push(stop_at(id, 1.0, 0.0, 1, TimeWindow::all_day()));
        plan.visits.push(Visit {
            stop_id: StopId(id),
            arrival: Duration::from_secs(9 * 3_600),
            wait: Duration::ZERO,
            departure: Duration::from_secs(9 * 3_600),
            load_after: Load::new(),
            violation: None,
        });
    }
    plan
}

#[rstest]
fn created_routes_start_as_drafts(harness: Harness) {
    let snapshot = harness.store.create_route(plan(&[1, 2]), Some(DriverId(7)));

    assert_eq!(snapshot.revision, 1);
    assert_eq!(snapshot.commit_index, 1);
    assert_eq!(snapshot.route.status, RouteStatus::Draft);
    assert_eq!(harness.listener.kinds(), vec![EventKind::RoutePublished]);
    let events = harness.listener.events.lock();
    let event = events.first().expect("publish event");
    assert_eq!(event.driver_id, Some(DriverId(7)));
    assert_eq!(event.timestamp, Duration::from_secs(8 * 3_600));
}

#[rstest]
fn stop_updates_emit_ordered_events(harness: Harness) {
    let route = harness.store.create_route(plan(&[1]), None);
    harness
        .store
        .set_route_status(route.id(), RouteStatus::Published)
        .expect("publish");
    harness
        .store
        .update_stop_status(route.id(), StopId(1), 1, StopStatus::EnRoute)
        .expect("en route");
    let done = harness
        .store
        .update_stop_status(route.id(), StopId(1), 1, StopStatus::Delivered)
        .expect("delivered");

    assert_eq!(done.route.status, RouteStatus::Completed);
    assert_eq!(
        harness.listener.kinds(),
        vec![
            EventKind::RoutePublished,
            EventKind::RouteStatusChanged,
            EventKind::RouteStatusChanged,
            EventKind::StopStatusChanged,
            EventKind::StopCompleted,
            EventKind::RouteStatusChanged,
        ]
    );
    let indices: Vec<u64> = harness
        .listener
        .events
        .lock()
        .iter()
        .map(|event| event.commit_index)
        .collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5, 6]);
}

#[rstest]
fn replaced_routes_reject_stale_updates(harness: Harness) {
    let route = harness.store.create_route(plan(&[1, 2]), None);
    let replaced = harness
        .store
        .replace_route(route.id(), plan(&[2, 1]))
        .expect("replace");
    assert_eq!(replaced.revision, 2);

    let err = harness
        .store
        .update_stop_status(route.id(), StopId(1), route.revision, StopStatus::EnRoute)
        .expect_err("stale revision");
    assert_eq!(
        err,
        StoreError::StaleRoute {
            route_id: route.id(),
            expected: 1,
            actual: 2,
        }
    );
    harness
        .store
        .update_stop_status(route.id(), StopId(1), replaced.revision, StopStatus::EnRoute)
        .expect("fresh revision succeeds");
}

#[rstest]
fn replacement_keeps_settled_stops(harness: Harness) {
    let route = harness.store.create_route(plan(&[1, 2, 3]), None);
    harness
        .store
        .update_stop_status(route.id(), StopId(1), 1, StopStatus::Delivered)
        .expect("delivered");
    harness
        .store
        .update_stop_status(route.id(), StopId(2), 1, StopStatus::EnRoute)
        .expect("en route");

    let replaced = harness
        .store
        .replace_route(route.id(), plan(&[3, 2]))
        .expect("replace");

    let order: Vec<_> = replaced.route.plan.stops.iter().map(|stop| stop.id).collect();
    assert_eq!(order, vec![StopId(1), StopId(3), StopId(2)]);
    assert_eq!(
        replaced.route.stop(StopId(2)).map(|stop| stop.status),
        Some(StopStatus::EnRoute)
    );
    assert_eq!(replaced.route.plan.visits.len(), 3);
}

#[rstest]
#[case(StopStatus::Delivered, StopStatus::Pending)]
#[case(StopStatus::Cancelled, StopStatus::EnRoute)]
fn forbidden_transitions_are_rejected(
    harness: Harness,
    #[case] first: StopStatus,
    #[case] second: StopStatus,
) {
    let route = harness.store.create_route(plan(&[1, 2]), None);
    harness
        .store
        .update_stop_status(route.id(), StopId(1), 1, first)
        .expect("first transition");
    let err = harness
        .store
        .update_stop_status(route.id(), StopId(1), 1, second)
        .expect_err("second transition is forbidden");
    assert!(matches!(err, StoreError::InvalidTransition { stop_id: StopId(1), .. }));
}

#[rstest]
fn repeated_status_is_idempotent(harness: Harness) {
    let route = harness.store.create_route(plan(&[1]), None);
    harness
        .store
        .update_stop_status(route.id(), StopId(1), 1, StopStatus::Arrived)
        .expect("arrived");
    let events_before = harness.listener.events.lock().len();
    harness
        .store
        .update_stop_status(route.id(), StopId(1), 1, StopStatus::Arrived)
        .expect("repeat accepted");
    assert_eq!(harness.listener.events.lock().len(), events_before);
}

#[rstest]
fn unknown_targets_are_reported(harness: Harness) {
    let route = harness.store.create_route(plan(&[1]), None);
    assert_eq!(
        harness
            .store
            .update_stop_status(RouteId(99), StopId(1), 1, StopStatus::EnRoute),
        Err(StoreError::UnknownRoute(RouteId(99)))
    );
    assert_eq!(
        harness
            .store
            .update_stop_status(route.id(), StopId(5), 1, StopStatus::EnRoute),
        Err(StoreError::UnknownStop {
            route_id: route.id(),
            stop_id: StopId(5),
        })
    );
    assert!(matches!(
        harness
            .store
            .record_emergency(route.id(), EmergencyId(1), EmergencyKind::GasLeak),
        Err(StoreError::UnknownStop { .. })
    ));
}

#[rstest]
fn invalid_route_transition_is_rejected(harness: Harness) {
    let route = harness.store.create_route(plan(&[1]), None);
    let err = harness
        .store
        .set_route_status(route.id(), RouteStatus::Completed)
        .expect_err("draft cannot complete");
    assert!(matches!(err, StoreError::InvalidRouteTransition { .. }));
}

#[rstest]
fn locations_update_snapshot(harness: Harness) {
    let route = harness.store.create_route(plan(&[1]), Some(DriverId(3)));
    let event = harness
        .store
        .record_location(route.id(), Coord { x: 2.0, y: 1.0 })
        .expect("ping");
    assert_eq!(event.kind(), EventKind::LocationPing);
    let snapshot = harness.store.get_route(route.id()).expect("route");
    assert_eq!(snapshot.position, Some(Coord { x: 2.0, y: 1.0 }));
    assert_eq!(snapshot.commit_index, 2);
}

#[rstest]
fn active_listing_skips_finished_routes(harness: Harness) {
    let first = harness.store.create_route(plan(&[1]), None);
    let second = harness.store.create_route(plan(&[2]), None);
    harness
        .store
        .set_route_status(first.id(), RouteStatus::Aborted)
        .expect("abort");
    let active: Vec<_> = harness
        .store
        .list_active_routes()
        .iter()
        .map(RouteSnapshot::id)
        .collect();
    assert_eq!(active, vec![second.id()]);
    assert_eq!(
        harness.store.active_route_for(VehicleId(1)).map(|s| s.id()),
        Some(second.id())
    );
    harness.store.remove_route(second.id()).expect("remove");
    assert!(harness.store.get_route(second.id()).is_none());
}

#[rstest]
fn pruning_removes_only_routes_finished_by_the_cutoff() {
    let eight = Duration::from_secs(8 * 3_600);
    let clock = Arc::new(ManualClock::at(eight));
    let store = DispatchStore::new(
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(RecordingListener::default()),
    );
    let early = store.create_route(plan(&[1]), None).id();
    let late = store.create_route(plan(&[2]), None).id();
    let running = store.create_route(plan(&[3]), None).id();
    store
        .set_route_status(early, RouteStatus::Aborted)
        .expect("abort early");
    clock.advance(Duration::from_secs(600));
    store
        .set_route_status(late, RouteStatus::Aborted)
        .expect("abort late");

    let cutoff = eight + Duration::from_secs(300);
    assert_eq!(store.prune_finished(cutoff), vec![early]);
    assert!(store.prune_finished(cutoff).is_empty());
    assert!(store.get_route(early).is_none());
    assert!(store.get_route(late).is_some());
    assert!(store.get_route(running).is_some());
}

#[rstest]
fn concurrent_writers_never_share_a_commit_index(harness: Harness) {
    let store = Arc::new(harness.store);
    let route_id = store.create_route(plan(&[1]), None).id();
    let writers: Vec<_> = (0..4)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for step in 0..25 {
                    let x = f64::from(i * 100 + step);
                    store
                        .record_location(route_id, Coord { x, y: 0.0 })
                        .expect("ping");
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread");
    }

    let mut indices: Vec<u64> = harness
        .listener
        .events
        .lock()
        .iter()
        .map(|event| event.commit_index)
        .collect();
    let delivered = indices.clone();
    indices.sort_unstable();
    assert_eq!(delivered, indices, "listener saw commits out of order");
    indices.dedup();
    assert_eq!(indices.len(), 101);
}
