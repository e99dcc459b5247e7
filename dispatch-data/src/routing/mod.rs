//! HTTP-based travel cost providers for routing services.
//!
//! [`HttpGeoCostProvider`] fetches duration and distance matrices from an
//! OSRM routing service. The synchronous [`GeoCostProvider`] trait is
//! implemented by blocking on async HTTP calls internally, so the solver
//! stays usable from plain threads.
//!
//! [`RetryingGeoCostProvider`] wraps any provider and retries transient
//! failures (timeouts, connection errors, HTTP 429 and 5xx) before surfacing
//! the last error.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use dispatch_core::GeoCostProvider;
//! use dispatch_data::routing::{
//!     HttpGeoCostProvider, HttpGeoCostProviderConfig, RetryPolicy, RetryingGeoCostProvider,
//! };
//! use geo::Coord;
//!
//! let config = HttpGeoCostProviderConfig::new("http://localhost:5000")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_user_agent("depot-planner/1.0");
//! let provider = RetryingGeoCostProvider::new(
//!     HttpGeoCostProvider::with_config(config)?,
//!     RetryPolicy::default(),
//! );
//!
//! let points = [Coord { x: -0.1, y: 51.5 }, Coord { x: -0.2, y: 51.6 }];
//! let matrix = provider.get_matrix(&points)?;
//! println!("metres: {:?}", matrix.distance(0, 1));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`GeoCostProvider`]: dispatch_core::GeoCostProvider

mod osrm;
mod provider;
mod retry;

#[doc(hidden)]
pub mod test_support;

pub use provider::{
    DEFAULT_PROFILE, DEFAULT_USER_AGENT, HttpGeoCostProvider, HttpGeoCostProviderConfig,
    ProviderBuildError,
};
pub use retry::{RetryPolicy, RetryingGeoCostProvider, Sleeper, ThreadSleeper};
