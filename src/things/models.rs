use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON:API document returned by `/api/v0/things/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonApiResponse {
    #[serde(default)]
    pub data: Option<Thing>,
    #[serde(default)]
    pub included: Vec<Thing>,
}

/// A registry record describing a physical asset.
///
/// Everything beyond the well-known fields is kept in `properties`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    pub id: String,
    #[serde(rename = "type")]
    pub thing_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Thing {
    /// Tenant of the record, `"default"` when the registry supplies none.
    #[must_use]
    pub fn tenant_or_default(&self) -> String {
        match self.tenant.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => "default".to_string(),
        }
    }

    #[must_use]
    pub fn is_type(&self, type_name: &str) -> bool {
        self.thing_type.eq_ignore_ascii_case(type_name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}
