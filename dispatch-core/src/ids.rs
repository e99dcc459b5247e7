//! Strongly typed identifiers for dispatch entities.
//!
//! Every identifier wraps a `u64` so values stay cheap to copy while the
//! compiler keeps a stop id from being passed where a route id is expected.

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub u64);

        impl $name {
            /// Return the raw numeric value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

define_id!(
    /// Identifier of a delivery stop.
    StopId,
    "stop"
);
define_id!(
    /// Identifier of a fleet vehicle.
    VehicleId,
    "vehicle"
);
define_id!(
    /// Identifier of a route held by the dispatch store.
    RouteId,
    "route"
);
define_id!(
    /// Identifier of a driver.
    DriverId,
    "driver"
);
define_id!(
    /// Identifier of a tracking event. Subscribers de-duplicate on this value.
    EventId,
    "event"
);
define_id!(
    /// Identifier of an emergency request.
    EmergencyId,
    "emergency"
);
define_id!(
    /// Identifier of a live-tracking subscriber.
    SubscriberId,
    "subscriber"
);

/// High bit reserved for stops synthesised from emergency requests.
const EMERGENCY_STOP_BIT: u64 = 1 << 63;

impl StopId {
    /// Derive the stop identifier used when an emergency becomes a stop.
    ///
    /// Emergency stops live in their own id space (the top bit is set) so
    /// they never collide with order-intake stop ids.
    ///
    /// # Examples
    /// ```
    /// use dispatch_core::{EmergencyId, StopId};
    ///
    /// let stop = StopId::for_emergency(EmergencyId(7));
    /// assert_eq!(stop.emergency_id(), Some(EmergencyId(7)));
    /// assert_eq!(StopId(7).emergency_id(), None);
    /// ```
    #[must_use]
    pub const fn for_emergency(id: EmergencyId) -> Self {
        Self(id.0 | EMERGENCY_STOP_BIT)
    }

    /// Return the emergency this stop was derived from, if any.
    #[must_use]
    pub const fn emergency_id(self) -> Option<EmergencyId> {
        if self.0 & EMERGENCY_STOP_BIT == 0 {
            None
        } else {
            Some(EmergencyId(self.0 & !EMERGENCY_STOP_BIT))
        }
    }
}
