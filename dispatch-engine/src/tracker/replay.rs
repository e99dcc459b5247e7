//! Per-route replay windows and remembered cursors of departed subscribers.

use std::collections::{BTreeMap, HashMap, VecDeque};

use dispatch_core::{RouteId, SubscriberId, TrackingEvent};

/// Last delivered commit index per route.
pub type Cursors = BTreeMap<RouteId, u64>;

/// What a resuming subscriber should receive for one route.
#[derive(Debug, PartialEq)]
pub(crate) enum Catchup {
    /// Events after the cursor, oldest first.
    Replay(Vec<TrackingEvent>),
    /// The window no longer reaches back to the cursor.
    Resync,
}

#[derive(Debug)]
pub(crate) struct ReplayLog {
    window: usize,
    routes: HashMap<RouteId, VecDeque<TrackingEvent>>,
}

impl ReplayLog {
    pub(crate) fn new(window: usize) -> Self {
        Self {
            window,
            routes: HashMap::new(),
        }
    }

    pub(crate) fn record(&mut self, event: &TrackingEvent) {
        if self.window == 0 {
            return;
        }
        let recent = self.routes.entry(event.route_id).or_default();
        recent.push_back(event.clone());
        while recent.len() > self.window {
            recent.pop_front();
        }
    }

    /// Events of `route_id` committed after `cursor`.
    pub(crate) fn since(&self, route_id: RouteId, cursor: u64) -> Catchup {
        let Some(recent) = self.routes.get(&route_id) else {
            return if cursor == 0 {
                Catchup::Replay(Vec::new())
            } else {
                Catchup::Resync
            };
        };
        let oldest = recent.front().map_or(0, |event| event.commit_index);
        let newest = recent.back().map_or(0, |event| event.commit_index);
        if cursor >= newest {
            return Catchup::Replay(Vec::new());
        }
        if oldest > cursor.saturating_add(1) {
            return Catchup::Resync;
        }
        Catchup::Replay(
            recent
                .iter()
                .filter(|event| event.commit_index > cursor)
                .cloned()
                .collect(),
        )
    }

    /// Routes with retained events.
    pub(crate) fn routes(&self) -> impl Iterator<Item = RouteId> + '_ {
        self.routes.keys().copied()
    }

    /// Drop the retained window of a route that will not change again.
    pub(crate) fn forget(&mut self, route_id: RouteId) -> bool {
        self.routes.remove(&route_id).is_some()
    }
}

/// Bounded least-recently-departed cache of subscriber cursors.
#[derive(Debug)]
pub(crate) struct DepartedCursors {
    capacity: usize,
    order: VecDeque<SubscriberId>,
    cursors: HashMap<SubscriberId, Cursors>,
}

impl DepartedCursors {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            cursors: HashMap::new(),
        }
    }

    pub(crate) fn remember(&mut self, id: SubscriberId, cursors: Cursors) {
        if self.capacity == 0 {
            return;
        }
        if self.cursors.insert(id, cursors).is_some() {
            self.order.retain(|known| *known != id);
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.cursors.remove(&evicted);
            }
        }
    }

    pub(crate) fn take(&mut self, id: SubscriberId) -> Option<Cursors> {
        let cursors = self.cursors.remove(&id)?;
        self.order.retain(|known| *known != id);
        Some(cursors)
    }

    pub(crate) fn forget_route(&mut self, route_id: RouteId) {
        for cursors in self.cursors.values_mut() {
            cursors.remove(&route_id);
        }
    }
}
