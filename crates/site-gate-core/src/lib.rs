//! Maintenance flag and gate decision primitives.
//!
//! Pure functions only: no I/O, no clocks. The HTTP lookup, the TTL cache and
//! the axum middleware live in the `site-gate` crate and build on these.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phrase that marks the site as under maintenance (matched case-insensitively).
pub const MAINTENANCE_PHRASE: &str = "under maintenance";

/// Tri-state maintenance flag as resolved from the content source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceFlag {
    /// The content source says the site is under maintenance
    UnderMaintenance,
    /// The content source answered with any other status text
    Active,
    /// Lookup failed, was not configured, or the field was absent
    Unknown,
}

impl MaintenanceFlag {
    /// Classify a free-text status value.
    ///
    /// Empty text is treated as absent.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        if status.is_empty() {
            Self::Unknown
        } else if status.to_lowercase().contains(MAINTENANCE_PHRASE) {
            Self::UnderMaintenance
        } else {
            Self::Active
        }
    }

    /// Classify a whole lookup payload (single record or list of records).
    #[must_use]
    pub fn from_payload(payload: &Value) -> Self {
        status_field(payload).map_or(Self::Unknown, |status| Self::from_status(&status))
    }

    /// Whether the gate should divert traffic for this flag.
    #[must_use]
    pub fn is_under_maintenance(self) -> bool {
        self == Self::UnderMaintenance
    }
}

impl fmt::Display for MaintenanceFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnderMaintenance => write!(f, "under_maintenance"),
            Self::Active => write!(f, "active"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Extract `acf.maintenance_mode` from the first record of a payload.
///
/// Arrays contribute their first element; any other value is taken as the
/// record itself. Returns `None` when the field is missing or falsy (`null`,
/// `false`, `0`, `""`). Other non-string values are read as text the way the
/// CMS front end always has: lists joined with commas, objects as an opaque
/// placeholder, scalars as written.
#[must_use]
pub fn status_field(payload: &Value) -> Option<Cow<'_, str>> {
    let record = match payload {
        Value::Array(items) => items.first()?,
        other => other,
    };

    let value = record.get("acf")?.get("maintenance_mode")?;
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64().is_some_and(|f| f.abs() < f64::EPSILON) => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => Some(Cow::Owned(as_text(other))),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(as_text).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Outcome of evaluating the gate for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Serve the request as addressed
    PassThrough,
    /// Serve the maintenance page under the original URL
    Rewrite,
}

/// Decide what to do with a request given the current flag.
///
/// The maintenance page itself always passes, otherwise a rewrite would loop.
#[must_use]
pub fn decide(flag: MaintenanceFlag, path: &str, maintenance_path: &str) -> GateDecision {
    if flag.is_under_maintenance() && path != maintenance_path {
        GateDecision::Rewrite
    } else {
        GateDecision::PassThrough
    }
}
