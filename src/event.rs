//! Event model published once per tick.
//!
//! ```json
//! {"@timestamp": "...", "type": "wmibeat-ohm2",
//!  "wmi": {"Fan": {"Fan1": {"Name": "Fan1", "RPM": 1200}},
//!          "OpenHardwareMonitor_Sensor_Temperature_CPUCore1": "45.3"}}
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::provider::Value;

/// Field values read from one row, in configured field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowValues {
    entries: Vec<(String, Value)>,
}

impl RowValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` under `name`. A repeated name keeps its position and takes the new value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for RowValues {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        let mut values = RowValues::new();
        for (name, value) in iter {
            values.insert(name, value);
        }
        values
    }
}

impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Aggregated rows of one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ClassValue {
    /// Rows keyed by title (or by row index when the title is empty).
    Keyed(BTreeMap<String, RowValues>),
    /// Rows in result order.
    Rows(Vec<RowValues>),
}

impl ClassValue {
    /// Number of rows held.
    pub fn len(&self) -> usize {
        match self {
            ClassValue::Keyed(map) => map.len(),
            ClassValue::Rows(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One top-level entry of the `wmi` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WmiValue {
    Class(ClassValue),
    Metric(String),
}

/// Merged per-tick output of all classes and namespaces.
pub type WmiFields = BTreeMap<String, WmiValue>;

/// The event handed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub wmi: WmiFields,
}

impl MetricEvent {
    pub fn new(kind: impl Into<String>, wmi: WmiFields) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: kind.into(),
            wmi,
        }
    }
}
