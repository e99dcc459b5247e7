//! Bounded per-subscriber buffer.
//!
//! When the buffer is full the oldest pending item is dropped and folded
//! into a single [`Delivery::Gap`] marker at the head of the buffer. The
//! marker does not count towards capacity, so the publisher never blocks.

use std::collections::{BTreeSet, VecDeque};

use dispatch_core::{RouteId, TrackingEvent};

/// Why a subscription was closed by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The subscriber stopped sending heartbeats.
    HeartbeatTimeout,
    /// The subscriber asked to leave.
    Unsubscribed,
    /// A new subscription with the same id took over.
    Superseded,
    /// The tracker is shutting down.
    Shutdown,
}

/// Item handed to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A committed change.
    Event(TrackingEvent),
    /// Events were dropped because the subscriber fell behind; re-fetch the
    /// listed routes.
    Gap {
        /// Number of events dropped.
        dropped: u64,
        /// Routes the dropped events belonged to.
        routes: BTreeSet<RouteId>,
    },
    /// Missed events are no longer in the replay window; re-fetch the route.
    ResyncRequired {
        /// Route to re-fetch.
        route_id: RouteId,
    },
    /// The subscription ended; nothing follows.
    Closed {
        /// Why it ended.
        reason: CloseReason,
    },
}

#[derive(Debug)]
pub(crate) struct Outbox {
    items: VecDeque<Delivery>,
    capacity: usize,
}

impl Outbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn has_gap(&self) -> bool {
        matches!(self.items.front(), Some(Delivery::Gap { .. }))
    }

    /// Items awaiting delivery, excluding a leading gap marker.
    pub(crate) fn pending(&self) -> usize {
        self.items.len() - usize::from(self.has_gap())
    }

    pub(crate) fn push(&mut self, delivery: Delivery) {
        self.items.push_back(delivery);
        if self.pending() > self.capacity {
            self.evict_oldest();
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Delivery> {
        self.items.pop_front()
    }

    fn evict_oldest(&mut self) {
        let (mut dropped, mut routes) = match self.items.front() {
            Some(Delivery::Gap { .. }) => match self.items.pop_front() {
                Some(Delivery::Gap { dropped, routes }) => (dropped, routes),
                _ => (0, BTreeSet::new()),
            },
            _ => (0, BTreeSet::new()),
        };
        match self.items.pop_front() {
            Some(Delivery::Event(event)) => {
                dropped += 1;
                routes.insert(event.route_id);
            }
            Some(Delivery::ResyncRequired { route_id }) => {
                routes.insert(route_id);
            }
            Some(Delivery::Gap {
                dropped: more,
                routes: more_routes,
            }) => {
                dropped += more;
                routes.extend(more_routes);
            }
            Some(closed @ Delivery::Closed { .. }) => self.items.push_front(closed),
            None => {}
        }
        log::debug!("subscriber outbox full; {dropped} event(s) dropped so far");
        self.items.push_front(Delivery::Gap { dropped, routes });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{EventId, TrackingPayload};
    use geo::Coord;
    use rstest::rstest;
    use std::time::Duration;

    fn event(route: u64, index: u64) -> Delivery {
        Delivery::Event(TrackingEvent {
            id: EventId(index),
            route_id: RouteId(route),
            stop_id: None,
            driver_id: None,
            commit_index: index,
            timestamp: Duration::ZERO,
            payload: TrackingPayload::LocationPing {
                position: Coord { x: 0.0, y: 0.0 },
            },
        })
    }

    fn drain(outbox: &mut Outbox) -> Vec<Delivery> {
        std::iter::from_fn(|| outbox.pop()).collect()
    }

    #[rstest]
    fn keeps_everything_below_capacity() {
        let mut outbox = Outbox::new(3);
        outbox.push(event(1, 1));
        outbox.push(event(1, 2));
        assert_eq!(drain(&mut outbox), vec![event(1, 1), event(1, 2)]);
    }

    #[rstest]
    fn overflow_replaces_oldest_with_merged_gap() {
        let mut outbox = Outbox::new(2);
        for index in 1..=5 {
            outbox.push(event(index % 2 + 1, index));
        }
        assert_eq!(outbox.pending(), 2);
        assert_eq!(
            drain(&mut outbox),
            vec![
                Delivery::Gap {
                    dropped: 3,
                    routes: [RouteId(1), RouteId(2)].into_iter().collect(),
                },
                event(1, 4),
                event(2, 5),
            ]
        );
    }

    #[rstest]
    fn zero_capacity_still_holds_one_item() {
        let mut outbox = Outbox::new(0);
        outbox.push(event(1, 1));
        outbox.push(event(1, 2));
        let items = drain(&mut outbox);
        assert_eq!(items.last(), Some(&event(1, 2)));
    }
}
