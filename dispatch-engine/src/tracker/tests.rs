//! Tests for `LiveTracker`.

use std::time::Duration;

use super::*;
use dispatch_core::{EventId, TrackingPayload};
use geo::Coord;
use rstest::rstest;

fn ping(route: u64, index: u64, driver: Option<u64>) -> TrackingEvent {
    TrackingEvent {
        id: EventId(route * 1_000 + index),
        route_id: RouteId(route),
        stop_id: None,
        driver_id: driver.map(DriverId),
        commit_index: index,
        timestamp: Duration::ZERO,
        payload: TrackingPayload::LocationPing {
            position: Coord { x: 0.0, y: 0.0 },
        },
    }
}

fn drain(handle: &mut SubscriptionHandle) -> Vec<Delivery> {
    std::iter::from_fn(|| handle.try_recv()).collect()
}

fn indices(deliveries: &[Delivery]) -> Vec<(u64, u64)> {
    deliveries
        .iter()
        .filter_map(|delivery| match delivery {
            Delivery::Event(event) => Some((event.route_id.0, event.commit_index)),
            _ => None,
        })
        .collect()
}

#[rstest]
fn filters_select_matching_events() {
    let tracker = LiveTracker::default();
    let mut everything = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    let mut second = tracker.subscribe(SubscriberId(2), SubscriptionFilter::route(RouteId(2)));
    let mut driver = tracker.subscribe(SubscriberId(3), SubscriptionFilter::Driver(DriverId(9)));

    tracker.publish(&ping(1, 1, Some(9)));
    tracker.publish(&ping(2, 1, None));

    assert_eq!(indices(&drain(&mut everything)), vec![(1, 1), (2, 1)]);
    assert_eq!(indices(&drain(&mut second)), vec![(2, 1)]);
    assert_eq!(indices(&drain(&mut driver)), vec![(1, 1)]);
}

#[rstest]
fn returning_subscriber_replays_missed_events() {
    let tracker = LiveTracker::default();
    let mut handle = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    tracker.publish(&ping(1, 1, None));
    tracker.publish(&ping(1, 2, None));
    assert_eq!(indices(&drain(&mut handle)), vec![(1, 1), (1, 2)]);

    assert!(tracker.unsubscribe(SubscriberId(1)));
    tracker.publish(&ping(1, 3, None));
    tracker.publish(&ping(1, 4, None));

    let mut resumed = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    assert_eq!(indices(&drain(&mut resumed)), vec![(1, 3), (1, 4)]);
}

#[rstest]
fn cursor_behind_the_window_asks_for_resync() {
    let tracker = LiveTracker::new(TrackerConfig::default().with_replay_window(2));
    for index in 1..=6 {
        tracker.publish(&ping(1, index, None));
    }
    let cursors = Cursors::from([(RouteId(1), 1)]);
    let mut handle = tracker.resume(SubscriberId(4), SubscriptionFilter::All, cursors);
    assert_eq!(
        drain(&mut handle),
        vec![Delivery::ResyncRequired {
            route_id: RouteId(1)
        }]
    );
}

#[rstest]
fn forgotten_routes_are_not_replayed_or_resynced() {
    let tracker = LiveTracker::default();
    let mut handle = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    tracker.publish(&ping(1, 1, None));
    tracker.publish(&ping(2, 1, None));
    assert_eq!(indices(&drain(&mut handle)), vec![(1, 1), (2, 1)]);
    assert!(tracker.unsubscribe(SubscriberId(1)));
    tracker.publish(&ping(2, 2, None));

    tracker.forget_route(RouteId(1));
    assert_eq!(tracker.replayable_routes(), BTreeSet::from([RouteId(2)]));

    let mut resumed = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    assert_eq!(drain(&mut resumed), vec![Delivery::Event(ping(2, 2, None))]);
}

#[rstest]
fn slow_subscriber_gets_a_gap() {
    let tracker = LiveTracker::new(TrackerConfig::default().with_outbox_capacity(2));
    let mut handle = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    for index in 1..=4 {
        tracker.publish(&ping(1, index, None));
    }
    let deliveries = drain(&mut handle);
    assert!(matches!(
        deliveries.first(),
        Some(Delivery::Gap { dropped: 2, .. })
    ));
    assert_eq!(indices(&deliveries), vec![(1, 3), (1, 4)]);
}

#[rstest]
fn resubscribing_supersedes_the_old_handle() {
    let tracker = LiveTracker::default();
    let mut old = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    let _new = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    assert_eq!(
        drain(&mut old),
        vec![Delivery::Closed {
            reason: CloseReason::Superseded
        }]
    );
    assert_eq!(tracker.subscriber_count(), 1);
}

#[rstest]
fn heartbeat_for_unknown_subscriber_fails() {
    let tracker = LiveTracker::default();
    assert_eq!(
        tracker.heartbeat(SubscriberId(5)),
        Err(TrackerError::UnknownSubscriber(SubscriberId(5)))
    );
}

#[tokio::test(start_paused = true)]
async fn recv_waits_for_published_events() {
    let tracker = LiveTracker::default();
    let mut handle = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    let publisher = tracker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        publisher.publish(&ping(1, 1, None));
        publisher.shutdown();
    });

    let first = handle.recv().await;
    assert!(matches!(first, Some(Delivery::Event(ref e)) if e.commit_index == 1));
    assert_eq!(
        handle.recv().await,
        Some(Delivery::Closed {
            reason: CloseReason::Shutdown
        })
    );
    assert_eq!(handle.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn silent_subscribers_are_reaped() {
    let config = TrackerConfig::default()
        .with_heartbeat(Duration::from_secs(10), Duration::from_secs(30));
    let tracker = LiveTracker::new(config);
    let mut quiet = tracker.subscribe(SubscriberId(1), SubscriptionFilter::All);
    let chatty = tracker.subscribe(SubscriberId(2), SubscriptionFilter::All);
    let shutdown = CancellationToken::new();
    let monitor = tracker.spawn_heartbeat_monitor(shutdown.clone());

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        chatty.heartbeat();
    }

    assert_eq!(tracker.subscriber_count(), 1);
    assert_eq!(
        quiet.recv().await,
        Some(Delivery::Closed {
            reason: CloseReason::HeartbeatTimeout
        })
    );
    shutdown.cancel();
    monitor.await.expect("monitor stops cleanly");
}
