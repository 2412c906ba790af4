//! Transit service alerts.
//!
//! Alerts arrive with string dates. An alert is shown while "today" lies
//! inside its `[fromDate, toDate]` window, compared at day granularity in
//! UTC with both ends inclusive.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A service alert as served by `GET /service-alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAlert {
    #[serde(rename = "fromDate")]
    pub from_date: String,
    #[serde(rename = "toDate")]
    pub to_date: String,
    /// Remaining alert fields (text, url, ...), passed through untouched.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ServiceAlert {
    /// Create an alert with the given window and no details.
    #[must_use]
    pub fn new(from_date: impl Into<String>, to_date: impl Into<String>) -> Self {
        Self {
            from_date: from_date.into(),
            to_date: to_date.into(),
            details: Map::new(),
        }
    }

    /// The alert's active window as UTC days, if both dates parse.
    #[must_use]
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((parse_day(&self.from_date)?, parse_day(&self.to_date)?))
    }

    /// Whether `day` lies inside the alert window (inclusive on both ends).
    ///
    /// Alerts with unparseable dates are never active.
    #[must_use]
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.window()
            .is_some_and(|(from, to)| from <= day && day <= to)
    }
}

/// Keep only the alerts active on `today`, preserving order.
#[must_use]
pub fn filter_active(alerts: Vec<ServiceAlert>, today: NaiveDate) -> Vec<ServiceAlert> {
    alerts
        .into_iter()
        .filter(|alert| alert.is_active_on(today))
        .collect()
}

/// Parse an alert date to its UTC calendar day.
///
/// Accepts RFC 3339 timestamps (converted to UTC), naive timestamps
/// (taken as UTC) and plain `YYYY-MM-DD` dates.
fn parse_day(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}
