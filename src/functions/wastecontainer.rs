use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{advance, differs, newest, resolve_once, HandleError, SensorPayload};
use crate::messaging::IncomingMessage;
use crate::senml::SENSOR_VALUE;
use crate::things::{Thing, ThingsClient};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteContainer {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub date_observed: Option<DateTime<Utc>>,
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waste_container: Option<Thing>,
}

impl WasteContainer {
    #[must_use]
    pub fn new(id: &str, tenant: &str) -> Self {
        Self {
            id: id.to_string(),
            entity_type: "WasteContainer".to_string(),
            tenant: tenant.to_string(),
            ..Self::default()
        }
    }

    /// Apply a level reading and/or a temperature sensor pack.
    ///
    /// Percent is rounded to the nearest integer before comparison, and
    /// `dateObserved` only ever moves forward.
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

        resolve_once(&mut self.waste_container, &self.id, things).await;

        let mut changed = false;
        let envelope_time = m.observed_at();

        if let Some(level) = &m.level {
            if differs(self.level, level.current) {
                self.level = Some(level.current);
                changed = true;
            }

            if let Some(percent) = level.percent.map(f64::round)
                && differs(self.percent, percent)
            {
                self.percent = Some(percent);
                changed = true;
            }

            if let Some(ts) = envelope_time {
                changed |= advance(&mut self.date_observed, ts);
            }
        }

        if let Some(record) = m.pack.as_ref().and_then(|p| p.record(SENSOR_VALUE)) {
            if let Some(temperature) = record.value
                && differs(self.temperature, temperature)
            {
                self.temperature = Some(temperature);
                changed = true;
            }

            if let Some(ts) = newest(record.time(), envelope_time) {
                changed |= advance(&mut self.date_observed, ts);
            }
        }

        if changed && self.date_observed.is_none() {
            self.date_observed = Some(Utc::now());
        }

        self.warn_if_out_of_range();

        tracing::debug!(
            entity_id = %self.id,
            level = ?self.level,
            percent = ?self.percent,
            temperature = ?self.temperature,
            changed,
            "Waste container handled"
        );

        Ok(changed)
    }

    fn warn_if_out_of_range(&self) {
        if let Some(level) = self.level
            && level < 0.0
        {
            tracing::warn!(entity_id = %self.id, level, "Level is negative");
        }

        if let Some(percent) = self.percent
            && !(0.0..=100.0).contains(&percent)
        {
            tracing::warn!(entity_id = %self.id, percent, "Percent outside 0..=100");
        }

        if let Some(temperature) = self.temperature
            && !(-50.0..=100.0).contains(&temperature)
        {
            tracing::warn!(entity_id = %self.id, temperature, "Temperature outside -50..=100");
        }
    }
}
