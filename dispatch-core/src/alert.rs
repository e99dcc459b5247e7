//! Structured alerts for the external alerting collaborator.
//!
//! Alerts are fire-and-forget: sinks receive each alert once and the engine
//! never retries delivery.

use std::collections::BTreeMap;

/// How urgently a human needs to look at an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    /// Degraded but self-recovering.
    Warning,
    /// Needs dispatcher action.
    Critical,
}

/// Machine-readable alert category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum AlertCode {
    /// An emergency deadline cannot be met.
    UnmetSla,
    /// A planning cycle failed.
    SolverFailure,
    /// The routing service stayed unavailable after retries.
    TransportFailure,
}

impl AlertCode {
    /// Wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnmetSla => "UNMET_SLA",
            Self::SolverFailure => "SOLVER_FAILURE",
            Self::TransportFailure => "TRANSPORT_FAILURE",
        }
    }
}

impl std::fmt::Display for AlertCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{severity, code, context}` record sent to alert sinks.
///
/// # Examples
/// ```
/// use dispatch_core::{Alert, AlertCode, Severity};
///
/// let alert = Alert::new(Severity::Critical, AlertCode::UnmetSla)
///     .with_context("emergency_id", 7);
/// assert_eq!(alert.context.get("emergency_id").map(String::as_str), Some("7"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Alert {
    /// Severity.
    pub severity: Severity,
    /// Category.
    pub code: AlertCode,
    /// Free-form key/value detail.
    pub context: BTreeMap<String, String>,
}

impl Alert {
    /// An alert with empty context.
    #[must_use]
    pub const fn new(severity: Severity, code: AlertCode) -> Self {
        Self {
            severity,
            code,
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        self.context.insert(key.to_owned(), value.to_string());
        self
    }
}

/// Receives alerts.
pub trait AlertSink: Send + Sync {
    /// Deliver `alert`. Implementations must not block for long.
    fn emit(&self, alert: &Alert);
}

/// Sink writing alerts through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn emit(&self, alert: &Alert) {
        match alert.severity {
            Severity::Critical => log::error!("{}: {:?}", alert.code, alert.context),
            Severity::Warning => log::warn!("{}: {:?}", alert.code, alert.context),
        }
    }
}
