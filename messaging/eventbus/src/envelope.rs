use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ---- Wire schema (events on the broker) ----
///
/// Envelopes are self-describing: a consumer decides how to process one
/// from `event_type` and the payload fields alone, never by calling back
/// into the producer's store.

/// Lifecycle action carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    ValueChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
            EventKind::ValueChanged => "value_changed",
        }
    }

    /// Parses the action suffix of a dotted event type, e.g.
    /// `sensor.created` -> `Created`. Unknown actions yield `None`; the
    /// consumer acknowledges those without processing so that future
    /// event types never block the queue.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type.split_once('.')?.1 {
            "created" => Some(EventKind::Created),
            "updated" => Some(EventKind::Updated),
            "deleted" => Some(EventKind::Deleted),
            "value_changed" => Some(EventKind::ValueChanged),
            _ => None,
        }
    }
}

/// Event id convention: `{domain}-{action}-{source_id}-{unix_timestamp}`.
///
/// Unique per publish attempt in practice, but not collision-resistant
/// across rapid redeliveries. Never used for dedup; consumers rely on
/// idempotent apply instead.
fn event_id(domain: &str, action: &str, source_id: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}-{}-{}", domain, action, source_id, now.timestamp())
}

/// A sensor lifecycle event published by the legacy smart-home store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorEvent {
    pub event_id: String,

    /// Dotted tag: `sensor.created`, `sensor.updated`, `sensor.deleted`,
    /// `sensor.value_changed`.
    pub event_type: String,

    pub sensor_id: i32,

    pub name: String,

    #[serde(rename = "type")]
    pub sensor_type: String,

    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Producer clock.
    pub timestamp: DateTime<Utc>,
}

impl SensorEvent {
    pub fn new(kind: EventKind, sensor_id: i32, name: &str, sensor_type: &str, location: &str) -> Self {
        let now = Utc::now();
        Self {
            event_id: event_id("sensor", kind.as_str(), &sensor_id.to_string(), now),
            event_type: format!("sensor.{}", kind.as_str()),
            sensor_id,
            name: name.to_string(),
            sensor_type: sensor_type.to_string(),
            location: location.to_string(),
            value: None,
            status: None,
            timestamp: now,
        }
    }

    pub fn with_reading(mut self, value: f64, status: &str) -> Self {
        self.value = Some(value);
        self.status = Some(status.to_string());
        self
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_event_type(&self.event_type)
    }
}

/// A device lifecycle event published by the device registry.
///
/// `device.deleted` is the cascade contract: it carries everything a
/// downstream consumer needs to locate its own mapped record (identity,
/// owning house/location, display name, type name) without a callback
/// query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub event_id: String,

    /// Dotted tag: `device.created`, `device.updated`, `device.deleted`.
    pub event_type: String,

    pub device_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub house_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_type: String,

    pub timestamp: DateTime<Utc>,
}

impl DeviceEvent {
    pub fn new(
        kind: EventKind,
        device_id: &str,
        house_id: &str,
        location_id: &str,
        device_name: &str,
        device_type: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            event_id: event_id("device", kind.as_str(), device_id, now),
            event_type: format!("device.{}", kind.as_str()),
            device_id: device_id.to_string(),
            house_id: house_id.to_string(),
            location_id: location_id.to_string(),
            device_name: device_name.to_string(),
            device_type: device_type.to_string(),
            timestamp: now,
        }
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_event_type(&self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_event_wire_fields() {
        let ev = SensorEvent::new(EventKind::Created, 7, "Hall", "temperature", "hallway");
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();

        assert_eq!(v["event_type"], "sensor.created");
        assert_eq!(v["sensor_id"], 7);
        assert_eq!(v["type"], "temperature");
        // Reading fields are omitted unless present
        assert!(v.get("value").is_none());
        assert!(v.get("status").is_none());
    }

    #[test]
    fn value_changed_carries_reading() {
        let ev = SensorEvent::new(EventKind::ValueChanged, 3, "Attic", "temperature", "attic")
            .with_reading(21.5, "active");
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();

        assert_eq!(v["event_type"], "sensor.value_changed");
        assert_eq!(v["value"], 21.5);
        assert_eq!(v["status"], "active");
    }

    #[test]
    fn event_id_convention() {
        let ts = Utc::now();
        let id = event_id("sensor", "deleted", "42", ts);
        assert_eq!(id, format!("sensor-deleted-42-{}", ts.timestamp()));
    }

    #[test]
    fn kind_parsing_tolerates_unknown_actions() {
        assert_eq!(EventKind::from_event_type("sensor.created"), Some(EventKind::Created));
        assert_eq!(
            EventKind::from_event_type("sensor.value_changed"),
            Some(EventKind::ValueChanged)
        );
        assert_eq!(EventKind::from_event_type("sensor.unknown"), None);
        assert_eq!(EventKind::from_event_type("garbage"), None);
    }

    #[test]
    fn device_deleted_contract_fields() {
        let ev = DeviceEvent::new(
            EventKind::Deleted,
            "0b8f8a10-1111-2222-3333-444455556666",
            "house-1",
            "loc-1",
            "Hall sensor",
            "Temperature Sensor",
        );
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();

        assert_eq!(v["event_type"], "device.deleted");
        assert_eq!(v["device_id"], "0b8f8a10-1111-2222-3333-444455556666");
        assert_eq!(v["house_id"], "house-1");
        assert_eq!(v["location_id"], "loc-1");
        assert_eq!(v["device_name"], "Hall sensor");
        assert_eq!(v["device_type"], "Temperature Sensor");
    }
}
