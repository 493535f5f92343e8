use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{is_zero_time, resolve_once, HandleError};
use crate::messaging::IncomingMessage;
use crate::things::{Thing, ThingsClient};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SewagePumpingStation {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub state: bool,
    pub tenant: String,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "sewagepumpingstation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sewage_pumping_station: Option<Thing>,
}

#[derive(Debug, Default, Deserialize)]
struct PumpEvent {
    #[serde(default)]
    tenant: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(
        rename = "digitalInput",
        alias = "DigitalInput",
        alias = "digitalinput",
        default
    )]
    digital_input: Option<DigitalInput>,
    #[serde(default)]
    stopwatch: Option<StopwatchState>,
}

#[derive(Debug, Default, Deserialize)]
struct DigitalInput {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    state: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopwatchState {
    #[serde(default)]
    state: bool,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    stop_time: Option<DateTime<Utc>>,
}

impl PumpEvent {
    /// Pump state and the time it was observed.
    fn reading(&self) -> Option<(bool, Option<DateTime<Utc>>)> {
        let envelope = self.timestamp.filter(|t| !is_zero_time(t));

        if let Some(di) = &self.digital_input {
            let own = di
                .timestamp
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc));
            return Some((di.state, envelope.or(own)));
        }

        if let Some(sw) = &self.stopwatch {
            let own = if sw.state { sw.start_time } else { sw.stop_time };
            return Some((sw.state, envelope.or(own.filter(|t| !is_zero_time(t)))));
        }

        None
    }
}

impl SewagePumpingStation {
    #[must_use]
    pub fn new(id: &str, tenant: &str) -> Self {
        Self {
            id: id.to_string(),
            entity_type: "SewagePumpingStation".to_string(),
            tenant: tenant.to_string(),
            ..Self::default()
        }
    }

    /// Last write wins: the incoming state and observation time always replace
    /// the stored ones; the change flag reports whether either differed.
    ///
    /// # Errors
    ///
    /// Returns `HandleError::Decode` if the body is not valid JSON.
    pub async fn handle(
        &mut self,
        msg: &IncomingMessage,
        things: &dyn ThingsClient,
    ) -> Result<bool, HandleError> {
        let event: PumpEvent = serde_json::from_slice(&msg.body)?;

        let Some((state, observed_at)) = event.reading() else {
            return Ok(false);
        };

        let changed = self.state != state || self.observed_at != observed_at;

        if self.tenant.is_empty()
            && let Some(tenant) = event.tenant
        {
            self.tenant = tenant;
        }

        resolve_once(&mut self.sewage_pumping_station, &self.id, things).await;

        self.state = state;
        self.observed_at = observed_at;

        tracing::debug!(entity_id = %self.id, state, changed, "Sewage pumping station handled");

        Ok(changed)
    }
}
