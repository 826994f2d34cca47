use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use eventbus::{DeviceEventPublisher, EventBusError};

use crate::models::{Device, DeviceFilter, DeviceType, DeviceUpdate, NewDevice};
use crate::store::{DeviceStore, StoreError};

/// Outbound device lifecycle notifications.
///
/// Seam between the service and the event bus so that tests can observe
/// and fail publishes without a broker.
#[async_trait]
pub trait CascadePublisher: Send + Sync {
    async fn device_created(&self, device: &Device) -> Result<(), EventBusError>;
    async fn device_updated(&self, device: &Device) -> Result<(), EventBusError>;
    async fn device_deleted(&self, device: &Device) -> Result<(), EventBusError>;
}

#[async_trait]
impl CascadePublisher for DeviceEventPublisher {
    async fn device_created(&self, device: &Device) -> Result<(), EventBusError> {
        self.created(
            &device.device_id.to_string(),
            &device.house_id.to_string(),
            &device.location_id.to_string(),
            &device.device_name,
            device.type_name(),
        )
        .await
    }

    async fn device_updated(&self, device: &Device) -> Result<(), EventBusError> {
        self.updated(
            &device.device_id.to_string(),
            &device.house_id.to_string(),
            &device.location_id.to_string(),
            &device.device_name,
            device.type_name(),
        )
        .await
    }

    async fn device_deleted(&self, device: &Device) -> Result<(), EventBusError> {
        self.deleted(
            &device.device_id.to_string(),
            &device.house_id.to_string(),
            &device.location_id.to_string(),
            &device.device_name,
            device.type_name(),
        )
        .await
    }
}

/// Device operations behind the HTTP API.
///
/// Mutations commit to the store first, then notify downstream consumers
/// best-effort: a failed publish is logged and never rolls back or fails
/// the store mutation. Only this direct path emits device events - the
/// reconciler mutates the store without a publisher, so inbound sensor
/// events can never echo back out as device events in a loop.
pub struct DeviceService {
    store: Arc<dyn DeviceStore>,
    publisher: Option<Arc<dyn CascadePublisher>>,
}

impl DeviceService {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn CascadePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError> {
        self.store.list(filter).await
    }

    pub async fn get_device(&self, device_id: Uuid) -> Result<Option<Device>, StoreError> {
        self.store.get(device_id).await
    }

    pub async fn list_types(
        &self,
        category: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Vec<DeviceType>, StoreError> {
        self.store.list_types(category, is_active).await
    }

    pub async fn register_device(
        &self,
        new: NewDevice,
        registered_by: Uuid,
    ) -> Result<Device, StoreError> {
        let device = self.store.create(new, registered_by).await?;

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.device_created(&device).await {
                warn!("failed to publish device.created for {}: {e}", device.device_id);
            }
        }

        Ok(device)
    }

    pub async fn update_device(
        &self,
        device_id: Uuid,
        changes: DeviceUpdate,
    ) -> Result<Device, StoreError> {
        let device = self.store.update(device_id, changes).await?;

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.device_updated(&device).await {
                warn!("failed to publish device.updated for {}: {e}", device.device_id);
            }
        }

        Ok(device)
    }

    /// Deletes a device and emits the `device.deleted` cascade event.
    ///
    /// The deletion is the local source of truth: it has already committed
    /// by the time the event is published, and a publish failure only
    /// produces a warning.
    pub async fn delete_device(&self, device_id: Uuid) -> Result<(), StoreError> {
        let device = self
            .store
            .get(device_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(device_id.to_string()))?;

        if !self.store.delete(device_id).await? {
            return Err(StoreError::NotFound(device_id.to_string()));
        }

        if let Some(publisher) = &self.publisher {
            match publisher.device_deleted(&device).await {
                Ok(()) => info!("published device.deleted for {}", device_id),
                Err(e) => warn!("failed to publish device.deleted for {}: {e}", device_id),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::store::memory::MemoryDeviceStore;

    #[derive(Default)]
    struct RecordingPublisher {
        fail: AtomicBool,
        deleted: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CascadePublisher for RecordingPublisher {
        async fn device_created(&self, _device: &Device) -> Result<(), EventBusError> {
            Ok(())
        }

        async fn device_updated(&self, _device: &Device) -> Result<(), EventBusError> {
            Ok(())
        }

        async fn device_deleted(&self, device: &Device) -> Result<(), EventBusError> {
            self.deleted
                .lock()
                .await
                .push((device.device_id.to_string(), device.type_name().to_string()));
            if self.fail.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed("broker gone".to_string()));
            }
            Ok(())
        }
    }

    async fn registered_device(store: &Arc<MemoryDeviceStore>) -> Device {
        let types = store.list_types(None, None).await.unwrap();
        store
            .create(
                NewDevice {
                    type_id: types[0].type_id,
                    house_id: Uuid::new_v4(),
                    location_id: Uuid::new_v4(),
                    device_name: "Porch lock".to_string(),
                    serial_number: "SL-0001".to_string(),
                    firmware_version: None,
                    configuration: serde_json::json!({}),
                    legacy_sensor_id: None,
                },
                Uuid::new_v4(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn delete_emits_one_cascade_event() {
        let store = MemoryDeviceStore::with_types(&[("Smart Lock", "actuator")]);
        let publisher = Arc::new(RecordingPublisher::default());
        let service =
            DeviceService::new(store.clone()).with_publisher(publisher.clone());

        let device = registered_device(&store).await;
        service.delete_device(device.device_id).await.unwrap();

        let deleted = publisher.deleted.lock().await;
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].0, device.device_id.to_string());
        assert_eq!(deleted[0].1, "Smart Lock");
    }

    #[tokio::test]
    async fn delete_commits_even_when_publish_fails() {
        let store = MemoryDeviceStore::with_types(&[("Smart Lock", "actuator")]);
        let publisher = Arc::new(RecordingPublisher::default());
        publisher.fail.store(true, Ordering::SeqCst);
        let service =
            DeviceService::new(store.clone()).with_publisher(publisher.clone());

        let device = registered_device(&store).await;
        service.delete_device(device.device_id).await.unwrap();

        // Deletion stands, and exactly one publish attempt was made.
        assert!(store.get(device.device_id).await.unwrap().is_none());
        assert_eq!(publisher.deleted.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn delete_of_absent_device_is_not_found() {
        let store = MemoryDeviceStore::with_types(&[("Smart Lock", "actuator")]);
        let service = DeviceService::new(store);

        let err = service.delete_device(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
