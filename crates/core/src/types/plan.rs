//! Trip plan derived from a commuter's stored options.
//!
//! A plan is never persisted on its own; it is rebuilt from
//! `Commuter::opts` whenever a session loads.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::commuter::LatLng;

const KNOWN_KEYS: &[&str] = &[
    "from",
    "from_ll",
    "to",
    "to_ll",
    "modes",
    "days",
    "start_time",
    "end_time",
];

/// A commuter's trip plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Origin address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_ll: Option<LatLng>,
    /// Destination address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_ll: Option<LatLng>,
    /// Enabled travel modes (e.g. `BUS`, `BICYCLE`).
    #[serde(default)]
    pub modes: Vec<String>,
    /// Day filter (e.g. `M-F`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<String>,
    /// Earliest departure hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u32>,
    /// Latest departure hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u32>,
    /// Option keys the plan does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Plan {
    /// Build a plan from stored options.
    ///
    /// Never fails: a key holding a value of the wrong shape is ignored
    /// and the field keeps its default.
    #[must_use]
    pub fn from_options(opts: &Map<String, Value>) -> Self {
        let extra = opts
            .iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self {
            from: field(opts, "from"),
            from_ll: field(opts, "from_ll"),
            to: field(opts, "to"),
            to_ll: field(opts, "to_ll"),
            modes: field(opts, "modes").unwrap_or_default(),
            days: field(opts, "days"),
            start_time: field(opts, "start_time"),
            end_time: field(opts, "end_time"),
            extra,
        }
    }

    /// Whether both ends of the trip are known.
    #[must_use]
    pub const fn has_locations(&self) -> bool {
        self.from.is_some() && self.to.is_some()
    }
}

fn field<T: DeserializeOwned>(opts: &Map<String, Value>, key: &str) -> Option<T> {
    opts.get(key)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}
