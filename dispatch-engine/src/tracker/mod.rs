//! Fan-out of committed route changes to live subscribers.
//!
//! [`LiveTracker`] owns its subscriber registry; it is created by whoever
//! wires the engine together and torn down with [`LiveTracker::shutdown`].
//! The [`DispatchStore`](crate::DispatchStore) feeds it through
//! [`ChangeListener`], so each route's events arrive in commit order and are
//! appended to every matching subscriber's outbox in that order.
//!
//! Delivery is at-least-once. A subscriber that leaves and comes back under
//! the same id resumes from the last event it received: missed events still
//! inside the per-route replay window are replayed, and routes whose window
//! has moved past the cursor get [`Delivery::ResyncRequired`]. Routes the
//! subscriber never received an event for are not replayed.
//!
//! Publishing never waits for subscribers. A subscriber that falls behind
//! loses its oldest buffered events and receives a [`Delivery::Gap`] instead.
//! Subscribers that stop sending heartbeats are removed by
//! [`LiveTracker::reap_expired`], which the background monitor calls on a
//! fixed interval.

mod outbox;
mod replay;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dispatch_core::{DriverId, RouteId, SubscriberId, TrackingEvent};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub use outbox::{CloseReason, Delivery};
use outbox::Outbox;
pub use replay::Cursors;
use replay::{Catchup, DepartedCursors, ReplayLog};

use crate::store::ChangeListener;

/// Tuning for [`LiveTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Most recent events retained per route for replay.
    pub replay_window: usize,
    /// Maximum undelivered events per subscriber before oldest-drop.
    pub outbox_capacity: usize,
    /// How often the background monitor looks for expired subscribers.
    pub heartbeat_interval: Duration,
    /// Silence after which a subscriber is dropped.
    pub heartbeat_timeout: Duration,
    /// Departed subscribers whose cursors are remembered.
    pub departed_cursor_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            replay_window: 50,
            outbox_capacity: 256,
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(45),
            departed_cursor_capacity: 1_024,
        }
    }
}

impl TrackerConfig {
    /// Override the replay window.
    #[must_use]
    pub const fn with_replay_window(mut self, events: usize) -> Self {
        self.replay_window = events;
        self
    }

    /// Override the outbox bound.
    #[must_use]
    pub const fn with_outbox_capacity(mut self, events: usize) -> Self {
        self.outbox_capacity = events;
        self
    }

    /// Override heartbeat interval and timeout.
    #[must_use]
    pub const fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }
}

/// Which events a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    /// Every route.
    All,
    /// Only the listed routes.
    Routes(BTreeSet<RouteId>),
    /// Routes driven by one driver.
    Driver(DriverId),
}

impl SubscriptionFilter {
    /// Filter for a single route.
    #[must_use]
    pub fn route(route_id: RouteId) -> Self {
        Self::Routes(BTreeSet::from([route_id]))
    }

    /// `true` when `event` should reach the subscriber.
    #[must_use]
    pub fn matches(&self, event: &TrackingEvent) -> bool {
        match self {
            Self::All => true,
            Self::Routes(routes) => routes.contains(&event.route_id),
            Self::Driver(driver) => event.driver_id == Some(*driver),
        }
    }

    fn may_include(&self, route_id: RouteId) -> bool {
        match self {
            Self::All | Self::Driver(_) => true,
            Self::Routes(routes) => routes.contains(&route_id),
        }
    }
}

/// Errors from tracker operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// No active subscription has this id.
    #[error("unknown subscriber {0}")]
    UnknownSubscriber(SubscriberId),
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    filter: SubscriptionFilter,
    outbox: Mutex<Outbox>,
    cursors: Mutex<Cursors>,
    last_seen: Mutex<Instant>,
    notify: Notify,
    closed: AtomicBool,
}

impl Subscriber {
    fn deliver(&self, delivery: Delivery) {
        self.outbox.lock().push(delivery);
        self.notify.notify_one();
    }

    fn close(&self, reason: CloseReason) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.deliver(Delivery::Closed { reason });
        }
    }

    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }
}

/// Receiving end of a subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    subscriber: Arc<Subscriber>,
    finished: bool,
}

impl SubscriptionHandle {
    /// Subscriber id.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.subscriber.id
    }

    /// Next buffered delivery without waiting.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        if self.finished {
            return None;
        }
        let delivery = self.subscriber.outbox.lock().pop()?;
        match &delivery {
            Delivery::Event(event) => {
                let mut cursors = self.subscriber.cursors.lock();
                let cursor = cursors.entry(event.route_id).or_default();
                *cursor = (*cursor).max(event.commit_index);
            }
            Delivery::Closed { .. } => self.finished = true,
            Delivery::Gap { .. } | Delivery::ResyncRequired { .. } => {}
        }
        Some(delivery)
    }

    /// Wait for the next delivery; `None` once the subscription has closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            if let Some(delivery) = self.try_recv() {
                return Some(delivery);
            }
            if self.finished {
                return None;
            }
            self.subscriber.notify.notified().await;
        }
    }

    /// Acknowledge liveness.
    pub fn heartbeat(&self) {
        self.subscriber.touch();
    }
}

#[derive(Debug)]
struct Registry {
    replay: ReplayLog,
    subscribers: HashMap<SubscriberId, Arc<Subscriber>>,
    departed: DepartedCursors,
}

impl Registry {
    fn depart(&mut self, id: SubscriberId, reason: CloseReason) -> bool {
        let Some(subscriber) = self.subscribers.remove(&id) else {
            return false;
        };
        let cursors = subscriber.cursors.lock().clone();
        self.departed.remember(id, cursors);
        subscriber.close(reason);
        true
    }
}

/// Live subscriber registry. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct LiveTracker {
    config: TrackerConfig,
    registry: Arc<Mutex<Registry>>,
}

impl Default for LiveTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl LiveTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Mutex::new(Registry {
                replay: ReplayLog::new(config.replay_window),
                subscribers: HashMap::new(),
                departed: DepartedCursors::new(config.departed_cursor_capacity),
            })),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Register `id`, resuming from its remembered cursors if it left
    /// recently. An active subscription with the same id is closed with
    /// [`CloseReason::Superseded`].
    #[must_use]
    pub fn subscribe(&self, id: SubscriberId, filter: SubscriptionFilter) -> SubscriptionHandle {
        self.register(id, filter, None)
    }

    /// Register `id`, resuming from cursors the client tracked itself.
    #[must_use]
    pub fn resume(
        &self,
        id: SubscriberId,
        filter: SubscriptionFilter,
        cursors: Cursors,
    ) -> SubscriptionHandle {
        self.register(id, filter, Some(cursors))
    }

    fn register(
        &self,
        id: SubscriberId,
        filter: SubscriptionFilter,
        explicit: Option<Cursors>,
    ) -> SubscriptionHandle {
        let mut registry = self.registry.lock();
        registry.depart(id, CloseReason::Superseded);
        let remembered = registry.departed.take(id);
        let cursors = explicit.or(remembered).unwrap_or_default();

        let subscriber = Arc::new(Subscriber {
            id,
            filter,
            outbox: Mutex::new(Outbox::new(self.config.outbox_capacity)),
            cursors: Mutex::new(cursors.clone()),
            last_seen: Mutex::new(Instant::now()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let mut replayed = 0_usize;
        for (&route_id, &cursor) in &cursors {
            match registry.replay.since(route_id, cursor) {
                Catchup::Replay(events) => {
                    for event in events.into_iter().filter(|e| subscriber.filter.matches(e)) {
                        replayed += 1;
                        subscriber.deliver(Delivery::Event(event));
                    }
                }
                Catchup::Resync if subscriber.filter.may_include(route_id) => {
                    subscriber.deliver(Delivery::ResyncRequired { route_id });
                }
                Catchup::Resync => {}
            }
        }
        registry.subscribers.insert(id, Arc::clone(&subscriber));
        log::debug!("{id} subscribed; {replayed} event(s) replayed");
        SubscriptionHandle {
            subscriber,
            finished: false,
        }
    }

    /// Fan `event` out to matching subscribers and retain it for replay.
    pub fn publish(&self, event: &TrackingEvent) {
        let mut registry = self.registry.lock();
        registry.replay.record(event);
        for subscriber in registry.subscribers.values() {
            if subscriber.filter.matches(event) {
                subscriber.deliver(Delivery::Event(event.clone()));
            }
        }
    }

    /// Remove a subscriber, remembering its cursors. Returns `false` when the
    /// id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry.lock().depart(id, CloseReason::Unsubscribed);
        if removed {
            log::debug!("{id} unsubscribed");
        }
        removed
    }

    /// Record a heartbeat received over the transport.
    ///
    /// # Errors
    /// [`TrackerError::UnknownSubscriber`] when `id` is not subscribed.
    pub fn heartbeat(&self, id: SubscriberId) -> Result<(), TrackerError> {
        let registry = self.registry.lock();
        let subscriber = registry
            .subscribers
            .get(&id)
            .ok_or(TrackerError::UnknownSubscriber(id))?;
        subscriber.touch();
        Ok(())
    }

    /// Drop subscribers silent for longer than the heartbeat timeout.
    pub fn reap_expired(&self) -> Vec<SubscriberId> {
        let now = Instant::now();
        let mut registry = self.registry.lock();
        let expired: Vec<SubscriberId> = registry
            .subscribers
            .values()
            .filter(|subscriber| {
                now.saturating_duration_since(*subscriber.last_seen.lock())
                    > self.config.heartbeat_timeout
            })
            .map(|subscriber| subscriber.id)
            .collect();
        for &id in &expired {
            registry.depart(id, CloseReason::HeartbeatTimeout);
            log::info!("{id} missed heartbeats; subscription released");
        }
        expired
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Routes with events retained for replay.
    #[must_use]
    pub fn replayable_routes(&self) -> BTreeSet<RouteId> {
        self.registry.lock().replay.routes().collect()
    }

    /// Release everything kept for a route that has left the store: its
    /// replay window and every subscriber cursor pointing at it.
    pub fn forget_route(&self, route_id: RouteId) {
        let mut registry = self.registry.lock();
        let had_window = registry.replay.forget(route_id);
        for subscriber in registry.subscribers.values() {
            subscriber.cursors.lock().remove(&route_id);
        }
        registry.departed.forget_route(route_id);
        if had_window {
            log::debug!("released replay window of {route_id}");
        }
    }

    /// Run [`LiveTracker::reap_expired`] every heartbeat interval until
    /// `shutdown` fires.
    #[must_use]
    pub fn spawn_heartbeat_monitor(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.config.heartbeat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        tracker.reap_expired();
                    }
                }
            }
            log::debug!("heartbeat monitor stopped");
        })
    }

    /// Close every subscription.
    pub fn shutdown(&self) {
        let mut registry = self.registry.lock();
        let ids: Vec<SubscriberId> = registry.subscribers.keys().copied().collect();
        for id in ids {
            registry.depart(id, CloseReason::Shutdown);
        }
        log::info!("live tracker shut down");
    }
}

impl ChangeListener for LiveTracker {
    fn on_commit(&self, event: &TrackingEvent) {
        self.publish(event);
    }
}

#[cfg(test)]
mod tests;
