use thiserror::Error;

/// Errors from [`crate::GeoCostProvider`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoCostError {
    /// No locations were provided.
    #[error("at least one location is required")]
    EmptyInput,
    /// The routing service did not answer in time.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured timeout.
        timeout_secs: u64,
    },
    /// The routing service answered with a non-success HTTP status.
    #[error("request to {url} failed with HTTP {status}: {message}")]
    HttpError {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Error detail.
        message: String,
    },
    /// The request could not be sent.
    #[error("network error requesting {url}: {message}")]
    NetworkError {
        /// Requested URL.
        url: String,
        /// Error detail.
        message: String,
    },
    /// The routing service reported a failure in its response body.
    #[error("routing service error {code}: {message}")]
    ServiceError {
        /// Service status code, e.g. `"InvalidQuery"`.
        code: String,
        /// Error detail.
        message: String,
    },
    /// The response could not be decoded.
    #[error("failed to parse routing response: {message}")]
    ParseError {
        /// Error detail.
        message: String,
    },
    /// The returned matrix does not match the requested locations.
    #[error("expected a {expected}x{expected} matrix, got {actual} rows")]
    DimensionMismatch {
        /// Number of requested locations.
        expected: usize,
        /// Number of rows received.
        actual: usize,
    },
    /// No road connection exists between two locations.
    #[error("no route from location {from} to location {to}")]
    Unreachable {
        /// Index of the origin.
        from: usize,
        /// Index of the destination.
        to: usize,
    },
}

impl GeoCostError {
    /// `true` for failures worth retrying with backoff.
    ///
    /// Timeouts, connection failures, throttling (HTTP 429) and server-side
    /// errors (HTTP 5xx) are transient. Malformed requests and responses are
    /// not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::NetworkError { .. } => true,
            Self::HttpError { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyInput
            | Self::ServiceError { .. }
            | Self::ParseError { .. }
            | Self::DimensionMismatch { .. }
            | Self::Unreachable { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn http(status: u16) -> GeoCostError {
        GeoCostError::HttpError {
            url: "http://osrm.test".to_owned(),
            status,
            message: String::new(),
        }
    }

    #[rstest]
    #[case(http(503), true)]
    #[case(http(429), true)]
    #[case(http(400), false)]
    #[case(GeoCostError::EmptyInput, false)]
    #[case(
        GeoCostError::Timeout { url: "http://osrm.test".to_owned(), timeout_secs: 5 },
        true
    )]
    fn classifies_transient_failures(#[case] error: GeoCostError, #[case] transient: bool) {
        assert_eq!(error.is_transient(), transient);
    }
}
