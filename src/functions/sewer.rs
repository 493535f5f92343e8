use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{advance, differs, newest, resolve_once, HandleError, SensorPayload};
use crate::messaging::IncomingMessage;
use crate::senml::{DEVICE_RECORD, SENSOR_VALUE};
use crate::things::{Thing, ThingsClient};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sewer {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(rename = "deviceID", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default)]
    pub level_observed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_observed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_observed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_observed: Option<DateTime<Utc>>,
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sewer: Option<Thing>,
}

impl Sewer {
    #[must_use]
    pub fn new(id: &str, tenant: &str) -> Self {
        Self {
            id: id.to_string(),
            entity_type: "Sewer".to_string(),
            tenant: tenant.to_string(),
            ..Self::default()
        }
    }

    /// Apply a distance sensor pack and/or a level reading.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::Decode` if the body is not valid JSON.
    pub async fn handle(
        &mut self,
        msg: &IncomingMessage,
        things: &dyn ThingsClient,
    ) -> Result<bool, HandleError> {
        let m: SensorPayload = serde_json::from_slice(&msg.body)?;

        if m.pack.is_none() && m.level.is_none() {
            return Ok(false);
        }

        resolve_once(&mut self.sewer, &self.id, things).await;

        // one device per sewer
        if self.device_id.is_none() {
            self.device_id.clone_from(&m.device_id);
        }

        let mut changed = false;
        let envelope_time = m.observed_at();

        if let Some(pack) = &m.pack
            && let Some(record) = pack.record(SENSOR_VALUE)
        {
            let ts = newest(record.time(), envelope_time);

            if let Some(ts) = ts {
                changed |= advance(&mut self.date_observed, ts);
            }

            if let Some(distance) = record.value
                && differs(self.distance, distance)
            {
                self.distance = Some(distance);
                self.distance_observed = Some(ts.unwrap_or_else(Utc::now));
                changed = true;
            }

            tracing::debug!(
                entity_id = %self.id,
                urn = ?pack.string_value(DEVICE_RECORD),
                distance = ?record.value,
                changed,
                "Sewer received distance measurement"
            );
        }

        if let Some(level) = &m.level {
            let observed = envelope_time.unwrap_or_else(Utc::now);

            if differs(self.level, level.current) {
                self.level = Some(level.current);
                self.level_observed = Some(observed);
                changed = true;
            }

            if let Some(percent) = level.percent
                && differs(self.percent, percent)
            {
                self.percent = Some(percent);
                self.percent_observed = Some(observed);
                changed = true;
            }

            if let Some(ts) = envelope_time {
                changed |= advance(&mut self.date_observed, ts);
            }

            tracing::debug!(
                entity_id = %self.id,
                level = level.current,
                changed,
                "Sewer received level"
            );
        }

        if changed && self.date_observed.is_none() {
            self.date_observed = Some(Utc::now());
        }

        Ok(changed)
    }
}
