//! OSRM-backed [`GeoCostProvider`].
//!
//! The trait is synchronous so the solver can run on plain worker threads.
//! This provider bridges to async `reqwest` calls by blocking on a Tokio
//! runtime it owns, or on the caller's runtime when that one is
//! multi-threaded.

use std::time::Duration;

use dispatch_core::{CostMatrix, GeoCostError, GeoCostProvider};
use geo::Coord;
use reqwest::Client;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use url::Url;

use super::osrm::TableResponse;

/// Failures while constructing an [`HttpGeoCostProvider`].
#[derive(Debug, Error)]
pub enum ProviderBuildError {
    /// The configured base URL does not parse.
    #[error("invalid routing service URL '{url}': {source}")]
    InvalidBaseUrl {
        /// Rejected URL.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Default user agent for routing requests.
pub const DEFAULT_USER_AGENT: &str = "cylinder-dispatch/0.1";

/// Default OSRM routing profile.
pub const DEFAULT_PROFILE: &str = "driving";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for [`HttpGeoCostProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpGeoCostProviderConfig {
    /// Base URL of the OSRM service, e.g. `"http://localhost:5000"`.
    pub base_url: String,
    /// OSRM profile segment of the request path.
    pub profile: String,
    /// Connect and request timeout.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpGeoCostProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_owned(),
            profile: DEFAULT_PROFILE.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpGeoCostProviderConfig {
    /// Configuration for `base_url` with default settings otherwise.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the OSRM profile.
    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Cost provider querying the OSRM Table API for durations and distances.
///
/// # Runtime behaviour
///
/// Outside any Tokio runtime the provider blocks on its own
/// `current_thread` runtime. Inside a multi-threaded runtime it uses
/// [`tokio::task::block_in_place`] on the caller's handle. Inside a
/// `current_thread` runtime it falls back to its own runtime, which can
/// stall the caller if the request depends on the caller's IO driver; run
/// solves through `spawn_blocking` in that case.
pub struct HttpGeoCostProvider {
    client: Client,
    config: HttpGeoCostProviderConfig,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpGeoCostProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGeoCostProvider")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpGeoCostProvider {
    /// Provider for `base_url` with default configuration.
    ///
    /// # Errors
    /// See [`HttpGeoCostProvider::with_config`].
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderBuildError> {
        Self::with_config(HttpGeoCostProviderConfig::new(base_url))
    }

    /// Provider with explicit configuration.
    ///
    /// # Errors
    /// Returns [`ProviderBuildError`] when the base URL is malformed or the
    /// HTTP client or runtime cannot be built.
    pub fn with_config(config: HttpGeoCostProviderConfig) -> Result<Self, ProviderBuildError> {
        Url::parse(&config.base_url).map_err(|source| ProviderBuildError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ProviderBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ProviderBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpGeoCostProviderConfig {
        &self.config
    }

    /// `{base}/table/v1/{profile}/{lon,lat;...}?annotations=duration,distance`
    fn build_table_url(&self, points: &[Coord<f64>]) -> String {
        let coords = points
            .iter()
            .map(|point| format!("{},{}", point.x, point.y))
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{}/table/v1/{}/{}?annotations=duration,distance",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords
        )
    }

    async fn fetch_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        let url = self.build_table_url(points);
        log::debug!("requesting {}x{} cost table", points.len(), points.len());

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, &url))?
            .error_for_status()
            .map_err(|err| self.convert_reqwest_error(&err, &url))?;

        let table: TableResponse =
            response
                .json()
                .await
                .map_err(|err| GeoCostError::ParseError {
                    message: err.to_string(),
                })?;

        let matrix = convert_response(table)?;
        matrix.ensure_len(points.len())?;
        Ok(matrix)
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &str) -> GeoCostError {
        if error.is_timeout() {
            return GeoCostError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }
        if let Some(status) = error.status() {
            return GeoCostError::HttpError {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }
        GeoCostError::NetworkError {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|&v| v >= 0.0 && v.is_finite())
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is finite, non-negative and rounded before the cast"
)]
fn to_metres(value: f64) -> u64 {
    value.round() as u64
}

/// Turn an OSRM table into a [`CostMatrix`].
///
/// Null, negative and non-finite cells mark unreachable pairs.
fn convert_response(response: TableResponse) -> Result<CostMatrix, GeoCostError> {
    if !response.is_ok() {
        return Err(GeoCostError::ServiceError {
            code: response.code,
            message: response.message.unwrap_or_default(),
        });
    }
    let missing = |what: &str| GeoCostError::ParseError {
        message: format!("OSRM response missing {what} array"),
    };
    let durations = response.durations.ok_or_else(|| missing("durations"))?;
    let distances = response.distances.ok_or_else(|| missing("distances"))?;

    let durations = durations
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| usable(cell).map_or(Duration::MAX, Duration::from_secs_f64))
                .collect()
        })
        .collect();
    let distances = distances
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| usable(cell).map_or(u64::MAX, to_metres))
                .collect()
        })
        .collect();
    CostMatrix::new(durations, distances)
}

impl GeoCostProvider for HttpGeoCostProvider {
    /// Fetch durations and distances for `points` in one request.
    ///
    /// When called inside a Tokio runtime, that runtime should be
    /// multi-threaded; see the type-level documentation.
    fn get_matrix(&self, points: &[Coord<f64>]) -> Result<CostMatrix, GeoCostError> {
        if points.is_empty() {
            return Err(GeoCostError::EmptyInput);
        }
        let future = self.fetch_matrix(points);
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}
