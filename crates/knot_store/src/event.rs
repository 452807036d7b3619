//! Event typing
//!
//! Every event sent to a store carries a string tag that selects its assigner.
//! Typed applications implement [`EventObject`] on an enum; dynamic callers can
//! use [`JsonEvent`], which mirrors the `{ "type": ..., ...fields }` wire shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::StoreError;

/// A tagged event value
pub trait EventObject {
    /// The tag used to look up this event's assigner
    fn event_type(&self) -> &str;

    /// Closed set of tags this event type can carry.
    ///
    /// When non-empty, the store builder rejects transitions registered for
    /// any other tag. An empty slice means the set is open.
    fn known_event_types() -> &'static [&'static str]
    where
        Self: Sized,
    {
        &[]
    }
}

impl EventObject for String {
    fn event_type(&self) -> &str {
        self
    }
}

impl EventObject for &'static str {
    fn event_type(&self) -> &str {
        self
    }
}

/// Dynamic event with a `type` tag and free-form payload fields.
///
/// Deserializing rejects a missing or empty `type`. [`JsonEvent::new`] does
/// not check its tag; an empty tag simply matches no assigner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawJsonEvent")]
pub struct JsonEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawJsonEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl TryFrom<RawJsonEvent> for JsonEvent {
    type Error = StoreError;

    fn try_from(raw: RawJsonEvent) -> Result<Self, Self::Error> {
        if raw.event_type.is_empty() {
            return Err(StoreError::InvalidEvent("`type` must not be empty".into()));
        }
        Ok(Self {
            event_type: raw.event_type,
            fields: raw.fields,
        })
    }
}

impl JsonEvent {
    /// Event with a tag and no payload
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            fields: Map::new(),
        }
    }

    /// Add a payload field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "type" {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Look up a payload field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All payload fields, without `type`
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Parse an event from a JSON value, requiring a non-empty string `type`
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        serde_json::from_value(value).map_err(|e| StoreError::InvalidEvent(e.to_string()))
    }

    /// Serialize back to the `{ "type": ..., ...fields }` shape
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert("type".into(), Value::String(self.event_type.clone()));
        Value::Object(object)
    }
}

impl FromStr for JsonEvent {
    type Err = StoreError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        let value: Value =
            serde_json::from_str(src).map_err(|e| StoreError::InvalidEvent(e.to_string()))?;
        Self::from_value(value)
    }
}

impl EventObject for JsonEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }
}
