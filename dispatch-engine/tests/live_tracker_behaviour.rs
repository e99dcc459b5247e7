//! Behavioural tests for [`LiveTracker`] delivery, replay and gaps.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

use dispatch_core::{EventId, RouteId, SubscriberId, TrackingEvent, TrackingPayload};
use dispatch_engine::{
    Cursors, Delivery, LiveTracker, SubscriptionFilter, SubscriptionHandle, TrackerConfig,
};
use geo::Coord;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

const SUBSCRIBER: SubscriberId = SubscriberId(1);

#[derive(Debug, Default)]
struct TrackerWorld {
    tracker: RefCell<LiveTracker>,
    handle: RefCell<Option<SubscriptionHandle>>,
    followed: RefCell<Option<RouteId>>,
    commits: RefCell<BTreeMap<RouteId, u64>>,
    received: RefCell<Vec<Delivery>>,
}

impl TrackerWorld {
    fn publish(&self, route_id: RouteId) {
        let mut commits = self.commits.borrow_mut();
        let index = commits.entry(route_id).or_default();
        *index += 1;
        self.tracker.borrow().publish(&TrackingEvent {
            id: EventId(route_id.0 * 1_000 + *index),
            route_id,
            stop_id: None,
            driver_id: None,
            commit_index: *index,
            timestamp: Duration::from_secs(*index),
            payload: TrackingPayload::LocationPing {
                position: Coord { x: 0.0, y: 0.0 },
            },
        });
    }

    fn events(&self) -> Vec<u64> {
        self.received
            .borrow()
            .iter()
            .filter_map(|delivery| match delivery {
                Delivery::Event(event) => Some(event.commit_index),
                _ => None,
            })
            .collect()
    }
}

#[fixture]
fn world() -> TrackerWorld {
    TrackerWorld::default()
}

// --- Given steps ---

#[given("a tracker whose outboxes hold {capacity} events")]
fn small_outboxes(world: &TrackerWorld, capacity: usize) {
    world.tracker.replace(LiveTracker::new(
        TrackerConfig::default().with_outbox_capacity(capacity),
    ));
}

#[given("a tracker replaying the last {events} events per route")]
fn short_replay(world: &TrackerWorld, events: usize) {
    world.tracker.replace(LiveTracker::new(
        TrackerConfig::default().with_replay_window(events),
    ));
}

#[given("a subscriber following route {route}")]
fn following(world: &TrackerWorld, route: u64) {
    let route_id = RouteId(route);
    let handle = world
        .tracker
        .borrow()
        .subscribe(SUBSCRIBER, SubscriptionFilter::route(route_id));
    world.followed.replace(Some(route_id));
    world.handle.replace(Some(handle));
}

// --- When steps ---

#[when("{count} events are published on route {route}")]
fn publish_events(world: &TrackerWorld, count: u64, route: u64) {
    for _ in 0..count {
        world.publish(RouteId(route));
    }
}

#[when("the subscriber reads everything")]
fn read_everything(world: &TrackerWorld) {
    let mut slot = world.handle.borrow_mut();
    let drained = slot
        .as_mut()
        .map(|handle| std::iter::from_fn(|| handle.try_recv()).collect())
        .unwrap_or_default();
    world.received.replace(drained);
}

#[when("the subscriber disconnects")]
fn disconnect(world: &TrackerWorld) {
    assert!(world.tracker.borrow().unsubscribe(SUBSCRIBER));
    world.handle.replace(None);
}

#[when("the subscriber returns")]
fn returns(world: &TrackerWorld) {
    let filter = world
        .followed
        .borrow()
        .map_or(SubscriptionFilter::All, SubscriptionFilter::route);
    let handle = world.tracker.borrow().subscribe(SUBSCRIBER, filter);
    world.handle.replace(Some(handle));
}

#[when("a subscriber resumes route {route} from commit {commit}")]
fn resumes(world: &TrackerWorld, route: u64, commit: u64) {
    let route_id = RouteId(route);
    let handle = world.tracker.borrow().resume(
        SUBSCRIBER,
        SubscriptionFilter::route(route_id),
        Cursors::from([(route_id, commit)]),
    );
    world.handle.replace(Some(handle));
}

// --- Then steps ---

#[then("the subscriber has received {count} events")]
fn received_count(world: &TrackerWorld, count: usize) {
    assert_eq!(world.events().len(), count);
}

#[then("the first event received has commit index {index}")]
fn first_index(world: &TrackerWorld, index: u64) {
    assert_eq!(world.events().first().copied(), Some(index));
}

#[then("the subscriber was told {count} events were dropped")]
fn told_dropped(world: &TrackerWorld, count: u64) {
    let received = world.received.borrow();
    assert!(
        matches!(received.first(), Some(Delivery::Gap { dropped, .. }) if *dropped == count),
        "expected a gap of {count}, got {received:?}"
    );
}

#[then("the subscriber is asked to resync route {route}")]
fn asked_to_resync(world: &TrackerWorld, route: u64) {
    assert_eq!(
        *world.received.borrow(),
        vec![Delivery::ResyncRequired {
            route_id: RouteId(route)
        }]
    );
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/live_tracker.feature", name = $title)]
        fn $fn_name(world: TrackerWorld) {
            let _ = world;
        }
    };
}

register_scenario!(
    filtered_delivery,
    "subscribers only see the routes they follow"
);
register_scenario!(returning_catches_up, "a returning subscriber catches up");
register_scenario!(slow_subscriber_gap, "a slow subscriber is told what it missed");
register_scenario!(resync_when_too_far_behind, "a subscriber too far behind must resync");
