//! Combined sewer overflow monitor.
//!
//! A monitor reports stopwatch events: an overflow starts (`state = true`)
//! and later stops (`state = false`, with a stop time). Every distinct start
//! time becomes one [`Overflow`] whose ID is derived from the start time, so a
//! redelivered event lands on the same interval. Closed intervals are
//! immutable.

use chrono::{DateTime, TimeDelta, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{is_zero_time, nanos, resolve_once, HandleError};
use crate::messaging::IncomingMessage;
use crate::things::{Thing, ThingsClient};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSewageOverflow {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(rename = "overflow", default)]
    pub overflows: Vec<Overflow>,
    #[serde(default)]
    pub date_observed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow_observed: Option<DateTime<Utc>>,
    #[serde(with = "nanos", default = "TimeDelta::zero")]
    pub cumulative_time: TimeDelta,
    #[serde(default)]
    pub state: bool,
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combined_sewage_overflow: Option<Thing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overflow {
    pub id: String,
    pub state: bool,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub stop_time: Option<DateTime<Utc>>,
    #[serde(with = "nanos", default = "TimeDelta::zero")]
    pub duration: TimeDelta,
}

impl Overflow {
    fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            id: overflow_id(&start_time),
            state: false,
            start_time,
            stop_time: None,
            duration: TimeDelta::zero(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StopwatchFunction {
    #[serde(default)]
    stopwatch: Stopwatch,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stopwatch {
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    stop_time: Option<DateTime<Utc>>,
    /// Nanoseconds.
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    state: bool,
}

impl Stopwatch {
    fn duration(&self) -> Option<TimeDelta> {
        self.duration.map(TimeDelta::nanoseconds)
    }
}

/// Deterministic interval identity: MD5 of the start time's Unix nanoseconds,
/// the first 16 hex characters of the digest taken as the UUID bytes.
#[must_use]
pub fn overflow_id(start_time: &DateTime<Utc>) -> String {
    let nanos = start_time
        .timestamp_nanos_opt()
        .unwrap_or_else(|| start_time.timestamp().saturating_mul(1_000_000_000));

    let digest = format!("{:x}", Md5::digest(nanos.to_string().as_bytes()));

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);

    Uuid::from_bytes(bytes).to_string()
}

impl CombinedSewageOverflow {
    #[must_use]
    pub fn new(id: &str, tenant: &str) -> Self {
        Self {
            id: id.to_string(),
            entity_type: "CombinedSewageOverflow".to_string(),
            overflows: Vec::new(),
            date_observed: None,
            overflow_observed: None,
            cumulative_time: TimeDelta::zero(),
            state: false,
            tenant: tenant.to_string(),
            combined_sewage_overflow: None,
        }
    }

    /// Apply a stopwatch event to the interval for its start time.
    ///
    /// # Errors
    ///
    /// - `HandleError::OverflowAlreadyEnded` if the interval is already closed
    /// - `HandleError::MissingStopTime` if a stop event carries no stop time
    /// - `HandleError::Decode` if the body is not valid JSON
    pub async fn handle(
        &mut self,
        msg: &IncomingMessage,
        things: &dyn ThingsClient,
    ) -> Result<bool, HandleError> {
        let event: StopwatchFunction = serde_json::from_slice(&msg.body)?;
        let sw = event.stopwatch;

        let Some(start_time) = sw.start_time.filter(|t| !is_zero_time(t)) else {
            // heartbeat
            self.date_observed = Some(Utc::now());
            resolve_once(&mut self.combined_sewage_overflow, &self.id, things).await;
            return Ok(true);
        };

        let changed = self.apply(&sw, start_time, Utc::now())?;

        resolve_once(&mut self.combined_sewage_overflow, &self.id, things).await;

        tracing::debug!(
            entity_id = %self.id,
            overflows = self.overflows.len(),
            cumulative_secs = self.cumulative_time.num_seconds(),
            state = self.state,
            changed,
            "Combined sewage overflow handled"
        );

        Ok(changed)
    }

    fn apply(
        &mut self,
        sw: &Stopwatch,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, HandleError> {
        let id = overflow_id(&start_time);
        let existing = self.overflows.iter().position(|o| o.id == id);

        if let Some(idx) = existing
            && self.overflows[idx].stop_time.is_some()
        {
            return Err(HandleError::OverflowAlreadyEnded);
        }

        // an unseen start counts as not overflowing
        let current_state = existing.is_some_and(|idx| self.overflows[idx].state);
        let transition = current_state != sw.state;

        if transition && !sw.state && sw.stop_time.is_none() {
            return Err(HandleError::MissingStopTime);
        }

        let mut changed = false;

        let idx = match existing {
            Some(idx) => idx,
            None => {
                self.overflows.push(Overflow::new(start_time));
                changed = true;
                self.overflows.len() - 1
            }
        };

        if transition {
            let overflow = &mut self.overflows[idx];

            if sw.state {
                overflow.duration = sw.duration().unwrap_or(now - overflow.start_time);
                self.date_observed = Some(overflow.start_time);
                self.overflow_observed = Some(overflow.start_time);
            } else {
                let stop_time = sw.stop_time.ok_or(HandleError::MissingStopTime)?;
                overflow.stop_time = Some(stop_time);
                overflow.duration = sw.duration().unwrap_or(stop_time - overflow.start_time);
                self.date_observed = Some(stop_time);
                self.overflow_observed = Some(stop_time);
            }

            overflow.state = sw.state;
            changed = true;
        }

        self.overflows.sort_by_key(|o| o.start_time);

        let cumulative_time = self.total_duration();
        if cumulative_time != self.cumulative_time {
            self.cumulative_time = cumulative_time;
            changed = true;
        }

        let state = self.overflows.last().is_some_and(|o| o.state);
        if state != self.state {
            self.state = state;
            changed = true;
        }

        if changed && self.date_observed.is_none() {
            self.date_observed = Some(now);
        }

        Ok(changed)
    }

    /// Sum of all interval durations, accumulated in integer nanoseconds.
    fn total_duration(&self) -> TimeDelta {
        let total = self
            .overflows
            .iter()
            .map(|o| o.duration.num_nanoseconds().unwrap_or(i64::MAX))
            .fold(0_i64, i64::saturating_add);

        TimeDelta::nanoseconds(total)
    }
}
