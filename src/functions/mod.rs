//! Entity state machines.
//!
//! Each entity type owns its data shape and a transition
//! `handle(&mut self, message, things) -> Result<changed, HandleError>`.
//! [`EntityKind`] is the lookup table the router and reconciler dispatch on;
//! [`EntityState`] is the loaded state of any one of them.

pub mod combinedsewageoverflow;
pub mod sewagepumpingstation;
pub mod sewer;
pub mod wastecontainer;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::messaging::{IncomingMessage, OutgoingMessage, PublishError};
use crate::senml::Pack;
use crate::storage::{self, Storage, StoreError};
use crate::things::{Thing, ThingsClient};

pub use combinedsewageoverflow::{CombinedSewageOverflow, Overflow};
pub use sewagepumpingstation::SewagePumpingStation;
pub use sewer::Sewer;
pub use wastecontainer::WasteContainer;

/// Topic every updated entity is published on.
pub const TOPIC_NAME: &str = "cip-function.updated";

/// Tolerance used when comparing measurements.
pub const EPSILON: f64 = 0.0001;

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("current overflow already ended")]
    OverflowAlreadyEnded,

    #[error("overflow stop event without a stop time")]
    MissingStopTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    WasteContainer,
    Sewer,
    CombinedSewageOverflow,
    SewagePumpingStation,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [
        Self::WasteContainer,
        Self::Sewer,
        Self::CombinedSewageOverflow,
        Self::SewagePumpingStation,
    ];

    /// Type name used both for registry matching and as the storage key.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Self::WasteContainer => "WasteContainer",
            Self::Sewer => "Sewer",
            Self::CombinedSewageOverflow => "CombinedSewageOverflow",
            Self::SewagePumpingStation => "SewagePumpingStation",
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::WasteContainer => "application/vnd.diwise.wastecontainer+json",
            Self::Sewer => "application/vnd.diwise.sewer+json",
            Self::CombinedSewageOverflow => "application/vnd.diwise.combinedsewageoverflow+json",
            Self::SewagePumpingStation => "application/vnd.diwise.sewagepumpingstation+json",
        }
    }

    /// Zero-value state for an entity seen for the first time.
    #[must_use]
    pub fn new_state(self, id: &str, tenant: &str) -> EntityState {
        match self {
            Self::WasteContainer => EntityState::WasteContainer(WasteContainer::new(id, tenant)),
            Self::Sewer => EntityState::Sewer(Sewer::new(id, tenant)),
            Self::CombinedSewageOverflow => {
                EntityState::CombinedSewageOverflow(CombinedSewageOverflow::new(id, tenant))
            }
            Self::SewagePumpingStation => {
                EntityState::SewagePumpingStation(SewagePumpingStation::new(id, tenant))
            }
        }
    }

    /// Load the stored state for `id`, or the zero value if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns any store or decode failure other than a missing record.
    pub async fn load_or_default(
        self,
        store: &dyn Storage,
        id: &str,
        tenant: &str,
    ) -> Result<EntityState, StoreError> {
        let type_name = self.type_name();

        let state = match self {
            Self::WasteContainer => EntityState::WasteContainer(
                storage::get_or_default(store, id, type_name, WasteContainer::new(id, tenant))
                    .await?,
            ),
            Self::Sewer => EntityState::Sewer(
                storage::get_or_default(store, id, type_name, Sewer::new(id, tenant)).await?,
            ),
            Self::CombinedSewageOverflow => EntityState::CombinedSewageOverflow(
                storage::get_or_default(
                    store,
                    id,
                    type_name,
                    CombinedSewageOverflow::new(id, tenant),
                )
                .await?,
            ),
            Self::SewagePumpingStation => EntityState::SewagePumpingStation(
                storage::get_or_default(
                    store,
                    id,
                    type_name,
                    SewagePumpingStation::new(id, tenant),
                )
                .await?,
            ),
        };

        Ok(state)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Current state of one entity of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityState {
    WasteContainer(WasteContainer),
    Sewer(Sewer),
    CombinedSewageOverflow(CombinedSewageOverflow),
    SewagePumpingStation(SewagePumpingStation),
}

impl EntityState {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::WasteContainer(_) => EntityKind::WasteContainer,
            Self::Sewer(_) => EntityKind::Sewer,
            Self::CombinedSewageOverflow(_) => EntityKind::CombinedSewageOverflow,
            Self::SewagePumpingStation(_) => EntityKind::SewagePumpingStation,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::WasteContainer(s) => &s.id,
            Self::Sewer(s) => &s.id,
            Self::CombinedSewageOverflow(s) => &s.id,
            Self::SewagePumpingStation(s) => &s.id,
        }
    }

    /// Apply an incoming message, returning whether the observable state changed.
    ///
    /// # Errors
    ///
    /// Returns `HandleError` for malformed payloads and rejected transitions.
    pub async fn handle(
        &mut self,
        msg: &IncomingMessage,
        things: &dyn ThingsClient,
    ) -> Result<bool, HandleError> {
        match self {
            Self::WasteContainer(s) => s.handle(msg, things).await,
            Self::Sewer(s) => s.handle(msg, things).await,
            Self::CombinedSewageOverflow(s) => s.handle(msg, things).await,
            Self::SewagePumpingStation(s) => s.handle(msg, things).await,
        }
    }

    /// Outbound notification carrying this state.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Serialization` if the state cannot be encoded.
    pub fn to_message(&self) -> Result<OutgoingMessage, PublishError> {
        Ok(OutgoingMessage {
            topic: TOPIC_NAME.to_string(),
            content_type: self.kind().content_type().to_string(),
            body: serde_json::to_vec(self)?,
        })
    }
}

/// Body shared by level readings (`function.updated`) and sensor packs (`message.accepted`).
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SensorPayload {
    #[serde(rename = "deviceID", default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub pack: Option<Pack>,
    #[serde(default)]
    pub level: Option<LevelReading>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SensorPayload {
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.filter(|t| !is_zero_time(t))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LevelReading {
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub percent: Option<f64>,
}

#[must_use]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON
}

/// True when `incoming` differs from the stored value, or nothing is stored.
pub(crate) fn differs(stored: Option<f64>, incoming: f64) -> bool {
    stored.is_none_or(|s| !approx_eq(s, incoming))
}

/// Zero timestamps (`0001-01-01T00:00:00Z`) arrive from senders that leave the field unset.
#[must_use]
pub fn is_zero_time(t: &DateTime<Utc>) -> bool {
    t.year() <= 1
}

/// The later of two optional timestamps.
pub(crate) fn newest(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Move `observed` forward to `ts`; never backwards.
pub(crate) fn advance(observed: &mut Option<DateTime<Utc>>, ts: DateTime<Utc>) -> bool {
    if observed.is_none_or(|current| ts > current) {
        *observed = Some(ts);
        return true;
    }
    false
}

/// Fetch the registry record into `slot` unless it is already present.
///
/// Failures leave the slot empty so a later event retries the lookup.
pub(crate) async fn resolve_once(slot: &mut Option<Thing>, id: &str, things: &dyn ThingsClient) {
    if slot.is_some() {
        return;
    }

    match things.find_by_id(id).await {
        Ok(thing) => *slot = Some(thing),
        Err(e) => tracing::debug!(entity_id = %id, error = %e, "Could not resolve registry record"),
    }
}

/// Serialize `chrono::TimeDelta` as an integer nanosecond count.
pub mod nanos {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_nanoseconds().unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TimeDelta, D::Error> {
        Ok(TimeDelta::nanoseconds(i64::deserialize(d)?))
    }
}
