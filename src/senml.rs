//! Minimal SenML (RFC 8428) pack model for LwM2M sensor payloads.
//!
//! Only the fields the sensor-pack readings rely on are modelled. Base fields
//! (`bn`, `bt`) apply to the record carrying them and every following record
//! until overridden, so lookups always operate on resolved records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record name carrying the object URN; its base name starts with the device ID.
pub const DEVICE_RECORD: &str = "0";

/// LwM2M resource 5700, "Sensor Value".
pub const SENSOR_VALUE: &str = "5700";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "bn", default, skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    #[serde(rename = "bt", default, skip_serializing_if = "Option::is_none")]
    pub base_time: Option<f64>,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(rename = "vs", default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(rename = "vb", default, skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

/// A record with base name and base time folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub name: String,
    pub unit: Option<String>,
    pub value: Option<f64>,
    pub string_value: Option<String>,
    pub bool_value: Option<bool>,
    time: f64,
}

impl ResolvedRecord {
    /// Last path segment of the resolved name, e.g. `5700` for `dev/3303/5700`.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn matches(&self, name: &str) -> bool {
        self.name == name || self.short_name() == name
    }

    /// Absolute time of the measurement, if the pack carried one.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        if self.time == 0.0 || !self.time.is_finite() {
            return None;
        }

        let secs = self.time.trunc() as i64;
        let nanos = ((self.time.fract().abs() * 1e9).round() as u32).min(999_999_999);
        DateTime::from_timestamp(secs, nanos)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pack(pub Vec<Record>);

impl Pack {
    #[must_use]
    pub fn resolve(&self) -> Vec<ResolvedRecord> {
        let mut base_name = String::new();
        let mut base_time = 0.0_f64;

        self.0
            .iter()
            .map(|r| {
                if let Some(bn) = &r.base_name {
                    base_name.clone_from(bn);
                }
                if let Some(bt) = r.base_time {
                    base_time = bt;
                }

                ResolvedRecord {
                    name: format!("{base_name}{}", r.name.as_deref().unwrap_or_default()),
                    unit: r.unit.clone(),
                    value: r.value,
                    string_value: r.string_value.clone(),
                    bool_value: r.bool_value,
                    time: base_time + r.time.unwrap_or_default(),
                }
            })
            .collect()
    }

    /// First record whose resolved name, or its last segment, equals `name`.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<ResolvedRecord> {
        self.resolve().into_iter().find(|r| r.matches(name))
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.record(name).and_then(|r| r.value)
    }

    #[must_use]
    pub fn string_value(&self, name: &str) -> Option<String> {
        self.record(name).and_then(|r| r.string_value)
    }

    #[must_use]
    pub fn time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.record(name).and_then(|r| r.time())
    }

    /// Device identifier: the resolved name of record `"0"` up to the first `/`.
    #[must_use]
    pub fn device_id(&self) -> Option<String> {
        let record = self.record(DEVICE_RECORD)?;
        let id = record.name.split('/').next().unwrap_or_default();

        if id.is_empty() || id == DEVICE_RECORD {
            None
        } else {
            Some(id.to_string())
        }
    }
}
