//! Retry wrapper for cost providers.
//!
//! Only [transient](GeoCostError::is_transient) failures are retried; the
//! delay doubles (by default) after every failed attempt up to a cap.

use std::time::Duration;

use dispatch_core::{CostMatrix, GeoCostError, GeoCostProvider};
use geo::Coord;

/// Backoff schedule for [`RetryingGeoCostProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Override the attempt budget. Values below one are treated as one.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Override the first delay.
    #[must_use]
    pub const fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Override the delay cap.
    #[must_use]
    pub const fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use dispatch_data::routing::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(1), Duration::from_millis(200));
    /// assert_eq!(policy.backoff(3), Duration::from_millis(800));
    /// assert_eq!(policy.backoff(30), Duration::from_secs(5));
    /// ```
    #[must_use]
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..failed_attempts {
            if delay >= self.max_backoff {
                break;
            }
            delay = delay.saturating_mul(self.multiplier);
        }
        delay.min(self.max_backoff)
    }
}

/// Blocking pause between attempts.
pub trait Sleeper: Send + Sync {
    /// Block the current thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Provider that retries transient failures of an inner provider.
///
/// # Examples
/// ```
/// use dispatch_core::GeoCostProvider;
/// use dispatch_core::test_support::UnitGeoCostProvider;
/// use dispatch_data::routing::{RetryPolicy, RetryingGeoCostProvider};
/// use geo::Coord;
///
/// let provider = RetryingGeoCostProvider::new(UnitGeoCostProvider, RetryPolicy::default());
/// let matrix = provider.get_matrix(&[Coord { x: 0.0, y: 0.0 }])?;
/// assert_eq!(matrix.len(), 1);
/// # Ok::<(), dispatch_core::GeoCostError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RetryingGeoCostProvider<P, S = ThreadSleeper> {
    inner: P,
    policy: RetryPolicy,
    sleeper: S,
}

impl<P> RetryingGeoCostProvider<P> {
    /// Wrap `inner`, sleeping the calling thread between attempts.
    #[must_use]
    pub const fn new(inner: P, policy: RetryPolicy) -> Self {
        Self::with_sleeper(inner, policy, ThreadSleeper)
    }
}

impl<P, S> RetryingGeoCostProvider<P, S> {
    /// Wrap `inner` with a custom [`Sleeper`].
    #[must_use]
    pub const fn with_sleeper(inner: P, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The wrapped provider.
    #[must_use]
    pub const fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P, S: Sleeper> RetryingGeoCostProvider<P, S> {
    fn run<T>(
        &self,
        what: &str,
        mut attempt: impl FnMut() -> Result<T, GeoCostError>,
    ) -> Result<T, GeoCostError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut failures = 0;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && failures + 1 < max_attempts => {
                    failures += 1;
                    let delay = self.policy.backoff(failures);
                    log::warn!(
                        "{what} failed (attempt {failures}/{max_attempts}), retrying in {delay:?}: {err}"
                    );
                    self.sleeper.sleep(delay);
                }
                Err(err) => {
                    if err.is_transient() {
                        log::warn!("{what} failed after {max_attempts} attempts: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl<P, S> GeoCostProvider for RetryingGeoCostProvider<P, S>
where
    P: GeoCostProvider,
    S: Sleeper,
{
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        self.run("cost matrix request", || self.inner.get_matrix(points))
    }

    fn get_eta(
        &self,
        from: Coord<f64>,
        to: Coord<f64>,
        depart_at: Duration,
    ) -> Result<Duration, GeoCostError> {
        self.run("ETA request", || self.inner.get_eta(from, to, depart_at))
    }
}
