//! Delivery topology: per-domain topic namespaces and named consumer
//! queues with wildcard bindings.
//!
//! Exchange-style namespaces map onto MQTT topics: an event with type
//! `sensor.created` is published under `events/sensor/created`, and a
//! consumer binds `events/sensor/+` to receive every sensor lifecycle
//! event. Queue durability comes from persistent broker sessions keyed by
//! the queue name (used as the client id), so declaration is repeatable:
//! reconnecting with the same name resumes the same session.

pub const SENSOR_EVENTS: &str = "events/sensor";
pub const DEVICE_EVENTS: &str = "events/device";
pub const TELEMETRY_EVENTS: &str = "events/telemetry";

/// Maps a dotted event type to its publish topic:
/// `sensor.created` -> `events/sensor/created`.
pub fn topic_for(event_type: &str) -> Option<String> {
    let (domain, action) = event_type.split_once('.')?;
    if domain.is_empty() || action.is_empty() || action.contains('.') {
        return None;
    }
    Some(format!("events/{}/{}", domain, action))
}

/// Wildcard binding covering every event type of a namespace.
pub fn wildcard(namespace: &str) -> String {
    format!("{}/+", namespace)
}

/// A named consumer queue and its bindings.
///
/// The name doubles as the broker client id and should follow the
/// `{service}.{purpose}` convention, e.g. `device-registry.sensor-events`.
#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub name: String,
    pub bindings: Vec<String>,
}

impl QueueSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bindings: Vec::new(),
        }
    }

    /// Binds the queue to all event types of a topic namespace.
    pub fn bind(mut self, namespace: &str) -> Self {
        self.bindings.push(wildcard(namespace));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_key_maps_to_topic() {
        assert_eq!(topic_for("sensor.created").as_deref(), Some("events/sensor/created"));
        assert_eq!(
            topic_for("sensor.value_changed").as_deref(),
            Some("events/sensor/value_changed")
        );
        assert_eq!(topic_for("device.deleted").as_deref(), Some("events/device/deleted"));
    }

    #[test]
    fn malformed_routing_keys_are_rejected() {
        assert_eq!(topic_for("sensor"), None);
        assert_eq!(topic_for("sensor."), None);
        assert_eq!(topic_for(".created"), None);
        // Three-token keys do not fit the single-level wildcard bindings.
        assert_eq!(topic_for("sensor.value.changed"), None);
    }

    #[test]
    fn queue_bindings_cover_namespace() {
        let q = QueueSpec::new("device-registry.sensor-events").bind(SENSOR_EVENTS);
        assert_eq!(q.bindings, vec!["events/sensor/+".to_string()]);
    }
}
