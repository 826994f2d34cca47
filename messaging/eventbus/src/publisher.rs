use std::time::Duration;

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tracing::debug;

use crate::envelope::{DeviceEvent, EventKind, SensorEvent};
use crate::error::EventBusError;
use crate::topology;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes JSON envelopes at QoS 1 under a bounded timeout.
///
/// Cheap to clone; every clone shares the underlying connection. A publish
/// either completes within the timeout or surfaces `PublishFailed` to the
/// caller - it is never silently dropped. The timeout bounds handoff into
/// the client's outgoing request channel, not broker confirmation: the
/// client exposes no per-publish ack, so `Ok` means the message is queued
/// on a live connection and confirmation is left to the QoS 1
/// retransmission machinery.
#[derive(Clone)]
pub struct EventPublisher {
    client: AsyncClient,
    timeout: Duration,
}

impl EventPublisher {
    pub(crate) fn new(client: AsyncClient) -> Self {
        Self {
            client,
            timeout: PUBLISH_TIMEOUT,
        }
    }

    /// Serializes `body` and publishes it under the topic derived from the
    /// dotted `event_type` routing key.
    pub async fn publish_json<T: Serialize>(
        &self,
        event_type: &str,
        body: &T,
    ) -> Result<(), EventBusError> {
        let topic = topology::topic_for(event_type)
            .ok_or_else(|| EventBusError::PublishFailed(format!("bad routing key '{event_type}'")))?;
        let payload = serde_json::to_vec(body)?;

        let publish = self
            .client
            .publish(topic.clone(), QoS::AtLeastOnce, false, payload);

        match tokio::time::timeout(self.timeout, publish).await {
            Ok(Ok(())) => {
                debug!("published {} to {}", event_type, topic);
                Ok(())
            }
            Ok(Err(e)) => Err(EventBusError::PublishFailed(e.to_string())),
            Err(_) => Err(EventBusError::PublishFailed(format!(
                "timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Sensor lifecycle publisher used by the legacy smart-home service.
///
/// One envelope per local mutation, routed by its event type into the
/// `events/sensor` namespace.
#[derive(Clone)]
pub struct SensorEventPublisher {
    bus: EventPublisher,
}

impl SensorEventPublisher {
    pub fn new(bus: EventPublisher) -> Self {
        Self { bus }
    }

    pub async fn created(
        &self,
        sensor_id: i32,
        name: &str,
        sensor_type: &str,
        location: &str,
    ) -> Result<(), EventBusError> {
        let ev = SensorEvent::new(EventKind::Created, sensor_id, name, sensor_type, location);
        self.bus.publish_json(&ev.event_type, &ev).await
    }

    pub async fn updated(
        &self,
        sensor_id: i32,
        name: &str,
        sensor_type: &str,
        location: &str,
    ) -> Result<(), EventBusError> {
        let ev = SensorEvent::new(EventKind::Updated, sensor_id, name, sensor_type, location);
        self.bus.publish_json(&ev.event_type, &ev).await
    }

    pub async fn deleted(
        &self,
        sensor_id: i32,
        name: &str,
        sensor_type: &str,
        location: &str,
    ) -> Result<(), EventBusError> {
        let ev = SensorEvent::new(EventKind::Deleted, sensor_id, name, sensor_type, location);
        self.bus.publish_json(&ev.event_type, &ev).await
    }

    pub async fn value_changed(
        &self,
        sensor_id: i32,
        name: &str,
        sensor_type: &str,
        location: &str,
        value: f64,
        status: &str,
    ) -> Result<(), EventBusError> {
        let ev = SensorEvent::new(EventKind::ValueChanged, sensor_id, name, sensor_type, location)
            .with_reading(value, status);
        self.bus.publish_json(&ev.event_type, &ev).await
    }
}

/// Device lifecycle publisher used by the device registry, including the
/// `device.deleted` cascade contract.
#[derive(Clone)]
pub struct DeviceEventPublisher {
    bus: EventPublisher,
}

impl DeviceEventPublisher {
    pub fn new(bus: EventPublisher) -> Self {
        Self { bus }
    }

    pub async fn publish(&self, event: &DeviceEvent) -> Result<(), EventBusError> {
        self.bus.publish_json(&event.event_type, event).await
    }

    pub async fn created(
        &self,
        device_id: &str,
        house_id: &str,
        location_id: &str,
        device_name: &str,
        device_type: &str,
    ) -> Result<(), EventBusError> {
        let ev = DeviceEvent::new(
            EventKind::Created,
            device_id,
            house_id,
            location_id,
            device_name,
            device_type,
        );
        self.publish(&ev).await
    }

    pub async fn updated(
        &self,
        device_id: &str,
        house_id: &str,
        location_id: &str,
        device_name: &str,
        device_type: &str,
    ) -> Result<(), EventBusError> {
        let ev = DeviceEvent::new(
            EventKind::Updated,
            device_id,
            house_id,
            location_id,
            device_name,
            device_type,
        );
        self.publish(&ev).await
    }

    pub async fn deleted(
        &self,
        device_id: &str,
        house_id: &str,
        location_id: &str,
        device_name: &str,
        device_type: &str,
    ) -> Result<(), EventBusError> {
        let ev = DeviceEvent::new(
            EventKind::Deleted,
            device_id,
            house_id,
            location_id,
            device_name,
            device_type,
        );
        self.publish(&ev).await
    }
}
