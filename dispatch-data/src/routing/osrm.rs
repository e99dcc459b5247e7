//! OSRM Table API response types.
//!
//! Requests ask for both `duration` and `distance` annotations, so a
//! successful response carries two parallel matrices.
//!
//! See: <http://project-osrm.org/docs/v5.24.0/api/#table-service>

use serde::Deserialize;

/// OSRM Table API response.
#[derive(Debug, Deserialize)]
pub struct TableResponse {
    /// Status code from OSRM; `"Ok"` on success, otherwise values such as
    /// `"InvalidQuery"`, `"InvalidOptions"` or `"NoTable"`.
    pub code: String,

    /// Error message when `code` is not `"Ok"`.
    pub message: Option<String>,

    /// Durations in seconds; `None` cells have no route.
    pub durations: Option<Vec<Vec<Option<f64>>>>,

    /// Distances in metres; `None` cells have no route.
    pub distances: Option<Vec<Vec<Option<f64>>>>,
}

impl TableResponse {
    /// Check if the response indicates success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == "Ok"
    }
}
