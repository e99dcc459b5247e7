//! Emergency dispatch requests.
//!
//! Emergency categories arrive from the dispatcher UI as strings; they are
//! parsed once at the boundary into [`EmergencyKind`] so downstream code
//! matches exhaustively instead of comparing text.
//!
//! # Examples
//! ```
//! use dispatch_core::EmergencyKind;
//!
//! let kind: EmergencyKind = "gas_leak".parse()?;
//! assert_eq!(kind, EmergencyKind::GasLeak);
//! assert_eq!(kind.to_string(), "gas_leak");
//! # Ok::<(), String>(())
//! ```

use std::time::Duration;

use geo::Coord;

use crate::{EmergencyId, Load, Priority, RouteId, Stop, StopId, TimeWindow, VehicleId};

/// Category of an emergency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EmergencyKind {
    /// Reported gas leak at a customer site.
    GasLeak,
    /// Customer ran out of gas and needs a same-day delivery.
    UrgentDelivery,
    /// Other customer-side emergency.
    CustomerEmergency,
    /// Driver breakdown or incident.
    DriverEmergency,
}

impl EmergencyKind {
    /// Return the kind as its wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GasLeak => "gas_leak",
            Self::UrgentDelivery => "urgent_delivery",
            Self::CustomerEmergency => "customer_emergency",
            Self::DriverEmergency => "driver_emergency",
        }
    }
}

impl std::fmt::Display for EmergencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmergencyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gas_leak" => Ok(Self::GasLeak),
            "urgent_delivery" => Ok(Self::UrgentDelivery),
            "customer_emergency" => Ok(Self::CustomerEmergency),
            "driver_emergency" => Ok(Self::DriverEmergency),
            _ => Err(format!("unknown emergency type '{s}'")),
        }
    }
}

/// Priority tier; `Critical` always precedes `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EmergencyPriority {
    /// Handle soon.
    High,
    /// Handle before anything else.
    Critical,
}

/// Lifecycle of an emergency request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EmergencyStatus {
    /// Waiting for a vehicle.
    #[default]
    Pending,
    /// Placed on a route.
    Assigned,
    /// The driver has been sent.
    Dispatched,
    /// Handled.
    Completed,
    /// Withdrawn.
    Cancelled,
}

impl EmergencyStatus {
    /// `true` for completed and cancelled requests.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// ```text
    /// pending -> assigned -> dispatched -> completed
    /// pending | assigned -> cancelled
    /// ```
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Assigned | Self::Cancelled)
                | (Self::Assigned, Self::Dispatched | Self::Cancelled)
                | (Self::Dispatched, Self::Completed)
        )
    }
}

/// An urgent request posted by a dispatcher.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmergencyRequest {
    /// Request id.
    pub id: EmergencyId,
    /// Emergency category.
    pub kind: EmergencyKind,
    /// Priority tier.
    pub priority: EmergencyPriority,
    /// Where the response is needed.
    pub location: Coord<f64>,
    /// Latest acceptable response time.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub deadline: Duration,
    /// Time the request was raised.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs"))]
    pub created_at: Duration,
    /// Expected time on site.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_secs", default))]
    pub service_duration: Duration,
    /// Cylinders to bring, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub demand: Load,
    /// Lifecycle status.
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: EmergencyStatus,
    /// Vehicle handling the request once assigned.
    #[cfg_attr(feature = "serde", serde(default))]
    pub assigned_vehicle: Option<VehicleId>,
    /// Route carrying the emergency stop once assigned.
    #[cfg_attr(feature = "serde", serde(default))]
    pub assigned_route: Option<RouteId>,
    /// Reason recorded on cancellation.
    #[cfg_attr(feature = "serde", serde(default))]
    pub cancel_reason: Option<String>,
}

impl EmergencyRequest {
    /// A pending request with no demand and no service time.
    #[must_use]
    pub const fn new(
        id: EmergencyId,
        kind: EmergencyKind,
        priority: EmergencyPriority,
        location: Coord<f64>,
        created_at: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            id,
            kind,
            priority,
            location,
            deadline,
            created_at,
            service_duration: Duration::ZERO,
            demand: Load::new(),
            status: EmergencyStatus::Pending,
            assigned_vehicle: None,
            assigned_route: None,
            cancel_reason: None,
        }
    }

    /// Set the cylinders to bring.
    #[must_use]
    pub fn with_demand(mut self, demand: Load) -> Self {
        self.demand = demand;
        self
    }

    /// Set the expected time on site.
    #[must_use]
    pub const fn with_service_duration(mut self, service: Duration) -> Self {
        self.service_duration = service;
        self
    }

    /// Identifier of the stop this request becomes on a route.
    #[must_use]
    pub const fn stop_id(&self) -> StopId {
        StopId::for_emergency(self.id)
    }

    /// `true` once `now` has passed the deadline while still pending.
    #[must_use]
    pub fn is_overdue(&self, now: Duration) -> bool {
        self.status == EmergencyStatus::Pending && now > self.deadline
    }

    /// The pinned, critical stop to insert into a route.
    ///
    /// Service must start between `not_before` and the deadline.
    #[must_use]
    pub fn to_stop(&self, not_before: Duration) -> Stop {
        Stop::new(
            self.stop_id(),
            self.location,
            self.demand.clone(),
            TimeWindow::new(not_before.max(self.created_at), self.deadline),
        )
        .with_priority(Priority::Critical)
        .with_service_duration(self.service_duration)
    }
}
