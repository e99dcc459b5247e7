//! Time windows expressed as offsets from the start of the planning day.

use std::time::Duration;

/// Inclusive `[earliest, latest]` interval during which service may begin.
///
/// Both bounds are offsets from the start of the planning day. The type does
/// not reject inverted windows on construction: order intake must be able to
/// receive malformed input and report it per stop, so validation lives in
/// [`TimeWindow::is_valid`].
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use dispatch_core::TimeWindow;
///
/// let window = TimeWindow::from_hours(8, 10);
/// assert!(window.contains(Duration::from_secs(9 * 3600)));
/// assert_eq!(window.width(), Duration::from_secs(2 * 3600));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeWindow {
    /// Earliest permitted service start.
    #[cfg_attr(feature = "serde", serde(with = "serde_secs"))]
    pub earliest: Duration,
    /// Latest permitted service start.
    #[cfg_attr(feature = "serde", serde(with = "serde_secs"))]
    pub latest: Duration,
}

impl TimeWindow {
    /// Construct a window from explicit bounds.
    #[must_use]
    pub const fn new(earliest: Duration, latest: Duration) -> Self {
        Self { earliest, latest }
    }

    /// Construct a window from whole hours of the planning day.
    #[must_use]
    pub const fn from_hours(earliest: u64, latest: u64) -> Self {
        Self::new(
            Duration::from_secs(earliest * 3600),
            Duration::from_secs(latest * 3600),
        )
    }

    /// A window spanning the entire day.
    #[must_use]
    pub const fn all_day() -> Self {
        Self::from_hours(0, 24)
    }

    /// `true` when `earliest <= latest`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.earliest <= self.latest
    }

    /// Width of the window; zero for inverted windows.
    #[must_use]
    pub fn width(&self) -> Duration {
        self.latest.saturating_sub(self.earliest)
    }

    /// `true` when `at` falls inside the window, bounds included.
    #[must_use]
    pub fn contains(&self, at: Duration) -> bool {
        self.earliest <= at && at <= self.latest
    }

    /// How far `at` lies beyond `latest`, clipped at zero when on time.
    #[must_use]
    pub fn lateness(&self, at: Duration) -> Duration {
        at.saturating_sub(self.latest)
    }

    /// Distance from `at` to the nearest window boundary; zero when outside.
    #[must_use]
    pub fn slack(&self, at: Duration) -> Duration {
        if !self.contains(at) {
            return Duration::ZERO;
        }
        (at - self.earliest).min(self.latest - at)
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::all_day()
    }
}

/// Serde helpers encoding [`Duration`] values as whole seconds.
///
/// Use with `#[serde(with = "dispatch_core::serde_secs")]`.
#[cfg(feature = "serde")]
pub mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialise a duration as whole seconds.
    ///
    /// # Errors
    /// Propagates serializer failures.
    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_secs())
    }

    /// Deserialise whole seconds into a duration.
    ///
    /// # Errors
    /// Propagates deserializer failures.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(8, 10, true)]
    #[case(10, 10, true)]
    #[case(11, 10, false)]
    fn validity_follows_bound_order(#[case] earliest: u64, #[case] latest: u64, #[case] ok: bool) {
        assert_eq!(TimeWindow::from_hours(earliest, latest).is_valid(), ok);
    }

    #[rstest]
    fn lateness_is_clipped_when_early() {
        let window = TimeWindow::from_hours(8, 10);
        assert_eq!(window.lateness(Duration::from_secs(7 * 3600)), Duration::ZERO);
        assert_eq!(
            window.lateness(Duration::from_secs(10 * 3600 + 90)),
            Duration::from_secs(90)
        );
    }

    #[rstest]
    fn slack_measures_nearest_boundary() {
        let window = TimeWindow::from_hours(8, 10);
        assert_eq!(
            window.slack(Duration::from_secs(8 * 3600 + 600)),
            Duration::from_secs(600)
        );
        assert_eq!(window.slack(Duration::from_secs(11 * 3600)), Duration::ZERO);
    }
}
