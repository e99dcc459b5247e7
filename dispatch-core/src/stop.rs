//! Delivery stops and their lifecycle.

use std::time::Duration;

use geo::Coord;

use crate::{Load, StopId, TimeWindow};

/// Service priority of a stop.
///
/// Variants are ordered so that `Critical > Urgent > Normal`. Urgent and
/// critical stops are pinned: once placed, local search keeps them on the
/// same route at the same position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Priority {
    /// Routine replenishment.
    #[default]
    Normal,
    /// Must be served on its promised window.
    Urgent,
    /// Safety-relevant work, such as an emergency call-out.
    Critical,
}

impl Priority {
    /// `true` for priorities whose placement local search may not change.
    #[must_use]
    pub const fn is_pinned(self) -> bool {
        matches!(self, Self::Urgent | Self::Critical)
    }
}

/// Execution status of a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StopStatus {
    /// Planned but not yet started.
    #[default]
    Pending,
    /// The driver is travelling to the stop.
    EnRoute,
    /// The driver is on site.
    Arrived,
    /// Cylinders were handed over.
    Delivered,
    /// The attempt failed; the stop may be retried.
    Failed,
    /// Withdrawn before completion.
    Cancelled,
}

impl StopStatus {
    /// `true` when no further transition is permitted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// `true` when the stop still needs to be visited.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::EnRoute | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// ```text
    /// pending  -> en_route | arrived | delivered | failed | cancelled
    /// en_route -> arrived | delivered | failed | cancelled
    /// arrived  -> delivered | failed
    /// failed   -> pending | cancelled
    /// ```
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::EnRoute | Self::Arrived | Self::Delivered | Self::Failed | Self::Cancelled
            ) | (
                Self::EnRoute,
                Self::Arrived | Self::Delivered | Self::Failed | Self::Cancelled
            ) | (Self::Arrived, Self::Delivered | Self::Failed)
                | (Self::Failed, Self::Pending | Self::Cancelled)
        )
    }
}

/// A customer location that needs cylinders delivered.
///
/// `sequence` is assigned by the solver when the stop is placed on a route;
/// order intake leaves it empty.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stop {
    /// Unique stop identifier.
    pub id: StopId,
    /// Geographic location (`x = lon`, `y = lat`).
    pub location: Coord<f64>,
    /// Cylinders required, per size.
    pub demand: Load,
    /// Window during which service may begin.
    pub window: TimeWindow,
    /// Time spent on site once service begins.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs", default))]
    pub service_duration: Duration,
    /// Service priority.
    #[cfg_attr(feature = "serde", serde(default))]
    pub priority: Priority,
    /// Position within the assigned route, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub sequence: Option<u32>,
    /// Execution status.
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: StopStatus,
}

impl Stop {
    /// Create a pending, normal-priority stop with no service time.
    ///
    /// # Examples
    /// ```
    /// use geo::Coord;
    /// use dispatch_core::{CylinderSize, Load, Priority, Stop, StopId, TimeWindow};
    ///
    /// let stop = Stop::new(
    ///     StopId(1),
    ///     Coord { x: 0.0, y: 0.0 },
    ///     Load::single(CylinderSize::KG_20, 2),
    ///     TimeWindow::from_hours(8, 10),
    /// )
    /// .with_priority(Priority::Urgent);
    /// assert!(stop.is_pinned());
    /// ```
    #[must_use]
    pub const fn new(id: StopId, location: Coord<f64>, demand: Load, window: TimeWindow) -> Self {
        Self {
            id,
            location,
            demand,
            window,
            service_duration: Duration::ZERO,
            priority: Priority::Normal,
            sequence: None,
            status: StopStatus::Pending,
        }
    }

    /// Set the service priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the on-site service duration.
    #[must_use]
    pub const fn with_service_duration(mut self, service: Duration) -> Self {
        self.service_duration = service;
        self
    }

    /// `true` when the stop's placement is fixed once assigned.
    #[must_use]
    pub const fn is_pinned(&self) -> bool {
        self.priority.is_pinned()
    }
}
