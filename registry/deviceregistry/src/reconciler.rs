use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use eventbus::{EventHandler, EventKind, SensorEvent};

use crate::models::{DeviceUpdate, NewDevice};
use crate::store::{DeviceStore, StoreError};
use crate::typemap;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("device type not found: {0}")]
    TypeNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Identifiers stamped onto devices created from inbound sensor events.
///
/// The sensor store has no notion of houses, locations or registering
/// users, so these come from deployment configuration rather than the
/// event payload.
#[derive(Debug, Clone)]
pub struct ReconcilerDefaults {
    pub house_id: Uuid,
    pub location_id: Uuid,
    pub registered_by: Uuid,
}

impl ReconcilerDefaults {
    pub fn from_env() -> Self {
        Self {
            house_id: env_uuid("DEFAULT_HOUSE_ID", "550e8400-e29b-41d4-a716-446655440001"),
            location_id: env_uuid("DEFAULT_LOCATION_ID", "550e8400-e29b-41d4-a716-446655440002"),
            registered_by: env_uuid("SYSTEM_USER_ID", "00000000-0000-0000-0000-000000000001"),
        }
    }
}

fn env_uuid(key: &str, fallback: &str) -> Uuid {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| fallback.parse().unwrap_or_else(|_| Uuid::nil()))
}

/// Turns inbound sensor lifecycle events into idempotent device store
/// mutations.
///
/// Delivery is at-least-once, so every path tolerates redelivery:
/// creation guards on `legacy_sensor_id`, update and delete treat a
/// missing counterpart as success. A returned error means "retry later"
/// and causes the delivery loop to leave the message for redelivery.
pub struct SensorReconciler {
    store: Arc<dyn DeviceStore>,
    defaults: ReconcilerDefaults,
}

impl SensorReconciler {
    pub fn new(store: Arc<dyn DeviceStore>, defaults: ReconcilerDefaults) -> Self {
        Self { store, defaults }
    }

    async fn on_created(&self, event: &SensorEvent) -> Result<(), ReconcileError> {
        // Redelivery guard: the mapping may already exist.
        if let Some(existing) = self.store.find_by_legacy_sensor_id(event.sensor_id).await? {
            info!(
                "sensor {} already mapped to device {}",
                event.sensor_id, existing.device_id
            );
            return Ok(());
        }

        let type_name = typemap::device_type_for(&event.sensor_type);
        let types = self.store.list_types(None, None).await?;
        let type_id = types
            .iter()
            .find(|t| t.type_name == type_name)
            .map(|t| t.type_id)
            .ok_or_else(|| ReconcileError::TypeNotFound(type_name.to_string()))?;

        let new = NewDevice {
            type_id,
            house_id: self.defaults.house_id,
            location_id: self.defaults.location_id,
            device_name: event.name.clone(),
            serial_number: format!("SENSOR_{}", event.sensor_id),
            firmware_version: None,
            configuration: json!({
                "source": "sensor_migration",
                "sensor_id": event.sensor_id,
                "created_by": "event_subscriber",
                "location": event.location,
            }),
            legacy_sensor_id: Some(event.sensor_id),
        };

        match self.store.create(new, self.defaults.registered_by).await {
            Ok(device) => {
                info!(
                    "created device {} for sensor {}",
                    device.device_id, event.sensor_id
                );
                Ok(())
            }
            // A concurrent redelivery won the race; the mapping exists.
            Err(StoreError::AlreadyExists(what)) => {
                info!("device for sensor {} already exists ({what})", event.sensor_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_updated(&self, event: &SensorEvent) -> Result<(), ReconcileError> {
        let Some(device) = self.store.find_by_legacy_sensor_id(event.sensor_id).await? else {
            info!("no device mapped to sensor {}, nothing to update", event.sensor_id);
            return Ok(());
        };

        let changes = DeviceUpdate {
            device_name: Some(event.name.clone()),
            ..Default::default()
        };
        self.store.update(device.device_id, changes).await?;

        info!("updated device {} from sensor {}", device.device_id, event.sensor_id);
        Ok(())
    }

    async fn on_deleted(&self, event: &SensorEvent) -> Result<(), ReconcileError> {
        let Some(device) = self.store.find_by_legacy_sensor_id(event.sensor_id).await? else {
            info!("no device mapped to sensor {}, nothing to delete", event.sensor_id);
            return Ok(());
        };

        // Deleting an already-absent row is success, not an error.
        match self.store.delete(device.device_id).await {
            Ok(_) | Err(StoreError::NotFound(_)) => {
                info!("deleted device {} for sensor {}", device.device_id, event.sensor_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_value_changed(&self, event: &SensorEvent) -> Result<(), ReconcileError> {
        let Some(device) = self.store.find_by_legacy_sensor_id(event.sensor_id).await? else {
            info!("no device mapped to sensor {}, ignoring reading", event.sensor_id);
            return Ok(());
        };

        // Only live-state fields; metadata is untouched.
        let changes = DeviceUpdate {
            is_online: event.status.as_deref().map(|s| s == "active"),
            last_seen: Some(event.timestamp),
            ..Default::default()
        };
        self.store.update(device.device_id, changes).await?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for SensorReconciler {
    type Event = SensorEvent;

    async fn handle(&self, event: SensorEvent) -> anyhow::Result<()> {
        info!("received {} for sensor {}", event.event_type, event.sensor_id);

        match event.kind() {
            Some(EventKind::Created) => self.on_created(&event).await?,
            Some(EventKind::Updated) => self.on_updated(&event).await?,
            Some(EventKind::Deleted) => self.on_deleted(&event).await?,
            Some(EventKind::ValueChanged) => self.on_value_changed(&event).await?,
            None => {
                // Forward compatibility: unknown event types are acked,
                // never requeued.
                warn!("ignoring unknown event type '{}'", event.event_type);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDeviceStore;

    fn defaults() -> ReconcilerDefaults {
        ReconcilerDefaults {
            house_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            registered_by: Uuid::new_v4(),
        }
    }

    fn catalog() -> Arc<MemoryDeviceStore> {
        MemoryDeviceStore::with_types(&[
            ("Temperature Sensor", "sensor"),
            ("Motion Sensor", "sensor"),
            ("Smart Lock", "actuator"),
            ("Smart Light", "actuator"),
        ])
    }

    fn created_event(sensor_id: i32, sensor_type: &str) -> SensorEvent {
        SensorEvent::new(EventKind::Created, sensor_id, "Hall sensor", sensor_type, "hallway")
    }

    #[tokio::test]
    async fn created_event_maps_and_creates_device() {
        let store = catalog();
        let rec = SensorReconciler::new(store.clone(), defaults());

        rec.handle(created_event(7, "door")).await.unwrap();

        let device = store.find_by_legacy_sensor_id(7).await.unwrap().unwrap();
        assert_eq!(device.legacy_sensor_id, Some(7));
        assert_eq!(device.serial_number, "SENSOR_7");
        assert_eq!(device.type_name(), "Smart Lock");
        assert_eq!(device.configuration["source"], "sensor_migration");
    }

    #[tokio::test]
    async fn duplicate_created_event_is_idempotent() {
        let store = catalog();
        let rec = SensorReconciler::new(store.clone(), defaults());
        let event = created_event(7, "temperature");

        rec.handle(event.clone()).await.unwrap();
        rec.handle(event).await.unwrap();

        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn unrecognized_category_uses_fallback_type() {
        let store = catalog();
        let rec = SensorReconciler::new(store.clone(), defaults());

        rec.handle(created_event(3, "unrecognized")).await.unwrap();

        let device = store.find_by_legacy_sensor_id(3).await.unwrap().unwrap();
        assert_eq!(device.type_name(), "Temperature Sensor");
    }

    #[tokio::test]
    async fn missing_device_type_fails_for_retry() {
        // Catalog without the mapped type: handler must error so the
        // delivery loop leaves the message for redelivery.
        let store = MemoryDeviceStore::with_types(&[("Smart Light", "actuator")]);
        let rec = SensorReconciler::new(store.clone(), defaults());

        let err = rec.handle(created_event(9, "motion")).await.unwrap_err();
        assert!(err.to_string().contains("Motion Sensor"));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn update_applies_only_present_fields() {
        let store = catalog();
        let rec = SensorReconciler::new(store.clone(), defaults());

        rec.handle(created_event(5, "temperature")).await.unwrap();

        // Give the device a firmware version the event knows nothing about.
        let device = store.find_by_legacy_sensor_id(5).await.unwrap().unwrap();
        store
            .update(
                device.device_id,
                DeviceUpdate {
                    firmware_version: Some("1.0".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut update = created_event(5, "temperature");
        update.event_type = "sensor.updated".to_string();
        update.name = "Renamed".to_string();
        rec.handle(update).await.unwrap();

        let device = store.find_by_legacy_sensor_id(5).await.unwrap().unwrap();
        assert_eq!(device.device_name, "Renamed");
        assert_eq!(device.firmware_version.as_deref(), Some("1.0"));
    }

    #[tokio::test]
    async fn update_without_counterpart_is_a_noop() {
        let store = catalog();
        let rec = SensorReconciler::new(store.clone(), defaults());

        let mut event = created_event(42, "temperature");
        event.event_type = "sensor.updated".to_string();

        rec.handle(event).await.unwrap();
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn redelivered_delete_is_idempotent() {
        let store = catalog();
        let rec = SensorReconciler::new(store.clone(), defaults());

        rec.handle(created_event(5, "temperature")).await.unwrap();

        let mut delete = created_event(5, "temperature");
        delete.event_type = "sensor.deleted".to_string();

        rec.handle(delete.clone()).await.unwrap();
        assert_eq!(store.count().await, 0);

        // Redelivery of the same deletion: success, store untouched.
        rec.handle(delete).await.unwrap();
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn value_changed_touches_live_state_only() {
        let store = catalog();
        let rec = SensorReconciler::new(store.clone(), defaults());

        rec.handle(created_event(6, "temperature")).await.unwrap();

        let mut reading = created_event(6, "temperature");
        reading.event_type = "sensor.value_changed".to_string();
        reading.value = Some(22.5);
        reading.status = Some("active".to_string());
        rec.handle(reading).await.unwrap();

        let device = store.find_by_legacy_sensor_id(6).await.unwrap().unwrap();
        assert!(device.is_online);
        assert!(device.last_seen.is_some());
        assert_eq!(device.device_name, "Hall sensor");
    }

    #[tokio::test]
    async fn unknown_event_type_is_acked_noop() {
        let store = catalog();
        let rec = SensorReconciler::new(store.clone(), defaults());

        let mut event = created_event(11, "temperature");
        event.event_type = "sensor.unknown".to_string();

        // Ok(()) means the delivery loop acks it; nothing was stored.
        rec.handle(event).await.unwrap();
        assert_eq!(store.count().await, 0);
    }
}
