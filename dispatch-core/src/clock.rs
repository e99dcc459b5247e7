//! Source of the current time of the planning day.

use std::time::{Duration, SystemTime};

/// Reports the current time as an offset from the start of the planning day.
pub trait Clock: Send + Sync {
    /// Current offset.
    fn now(&self) -> Duration;
}

/// Wall-clock time measured from a fixed origin.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: SystemTime,
}

impl SystemClock {
    /// A clock whose zero is `origin`, usually local midnight of the day.
    #[must_use]
    pub const fn starting_at(origin: SystemTime) -> Self {
        Self { origin }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.origin)
            .unwrap_or(Duration::ZERO)
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}
