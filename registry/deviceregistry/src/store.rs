use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Device, DeviceFilter, DeviceType, DeviceUpdate, NewDevice};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

/// Capability boundary over the device store.
///
/// `find_by_legacy_sensor_id` is an indexed lookup, not a paged scan over
/// the collection; the reconciler depends on it being cheap.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn list(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError>;

    async fn get(&self, device_id: Uuid) -> Result<Option<Device>, StoreError>;

    async fn find_by_legacy_sensor_id(&self, sensor_id: i32) -> Result<Option<Device>, StoreError>;

    async fn list_types(
        &self,
        category: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Vec<DeviceType>, StoreError>;

    /// Fails with `AlreadyExists` when the serial number or legacy sensor
    /// id is already taken; callers creating from redelivered events treat
    /// that as idempotent success.
    async fn create(&self, new: NewDevice, registered_by: Uuid) -> Result<Device, StoreError>;

    async fn update(&self, device_id: Uuid, changes: DeviceUpdate) -> Result<Device, StoreError>;

    /// Returns whether a row was actually removed.
    async fn delete(&self, device_id: Uuid) -> Result<bool, StoreError>;
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store for handler and service tests.

    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::sync::RwLock;

    use super::*;

    pub struct MemoryDeviceStore {
        devices: RwLock<HashMap<Uuid, Device>>,
        types: Vec<DeviceType>,
    }

    impl MemoryDeviceStore {
        pub fn with_types(type_names: &[(&str, &str)]) -> Arc<Self> {
            let now = Utc::now();
            let types = type_names
                .iter()
                .map(|(name, category)| DeviceType {
                    type_id: Uuid::new_v4(),
                    type_name: name.to_string(),
                    category: category.to_string(),
                    manufacturer: "Generic".to_string(),
                    model: "G-1".to_string(),
                    protocol: "MQTT".to_string(),
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                })
                .collect();

            Arc::new(Self {
                devices: RwLock::new(HashMap::new()),
                types,
            })
        }

        pub async fn count(&self) -> usize {
            self.devices.read().await.len()
        }

        fn type_by_id(&self, type_id: Uuid) -> Option<DeviceType> {
            self.types.iter().find(|t| t.type_id == type_id).cloned()
        }
    }

    #[async_trait]
    impl DeviceStore for MemoryDeviceStore {
        async fn list(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError> {
            let devices = self.devices.read().await;
            let mut out: Vec<Device> = devices
                .values()
                .filter(|d| filter.house_id.map_or(true, |h| d.house_id == h))
                .filter(|d| filter.type_id.map_or(true, |t| d.type_id == t))
                .filter(|d| filter.is_online.map_or(true, |o| d.is_online == o))
                .cloned()
                .collect();
            out.sort_by_key(|d| std::cmp::Reverse(d.created_at));
            Ok(out)
        }

        async fn get(&self, device_id: Uuid) -> Result<Option<Device>, StoreError> {
            Ok(self.devices.read().await.get(&device_id).cloned())
        }

        async fn find_by_legacy_sensor_id(
            &self,
            sensor_id: i32,
        ) -> Result<Option<Device>, StoreError> {
            Ok(self
                .devices
                .read()
                .await
                .values()
                .find(|d| d.legacy_sensor_id == Some(sensor_id))
                .cloned())
        }

        async fn list_types(
            &self,
            category: Option<&str>,
            is_active: Option<bool>,
        ) -> Result<Vec<DeviceType>, StoreError> {
            Ok(self
                .types
                .iter()
                .filter(|t| category.map_or(true, |c| t.category == c))
                .filter(|t| is_active.map_or(true, |a| t.is_active == a))
                .cloned()
                .collect())
        }

        async fn create(&self, new: NewDevice, registered_by: Uuid) -> Result<Device, StoreError> {
            let mut devices = self.devices.write().await;

            if devices.values().any(|d| d.serial_number == new.serial_number) {
                return Err(StoreError::AlreadyExists(new.serial_number));
            }
            if let Some(sensor_id) = new.legacy_sensor_id {
                if devices.values().any(|d| d.legacy_sensor_id == Some(sensor_id)) {
                    return Err(StoreError::AlreadyExists(format!("legacy sensor {sensor_id}")));
                }
            }

            let now = Utc::now();
            let device = Device {
                device_id: Uuid::new_v4(),
                type_id: new.type_id,
                house_id: new.house_id,
                location_id: new.location_id,
                registered_by,
                device_name: new.device_name,
                serial_number: new.serial_number,
                firmware_version: new.firmware_version,
                configuration: new.configuration,
                is_online: false,
                last_seen: None,
                legacy_sensor_id: new.legacy_sensor_id,
                created_at: now,
                updated_at: now,
                device_type: self.type_by_id(new.type_id),
            };

            devices.insert(device.device_id, device.clone());
            Ok(device)
        }

        async fn update(
            &self,
            device_id: Uuid,
            changes: DeviceUpdate,
        ) -> Result<Device, StoreError> {
            let mut devices = self.devices.write().await;
            let device = devices
                .get_mut(&device_id)
                .ok_or_else(|| StoreError::NotFound(device_id.to_string()))?;

            if let Some(name) = changes.device_name {
                device.device_name = name;
            }
            if let Some(fw) = changes.firmware_version {
                device.firmware_version = Some(fw);
            }
            if let Some(cfg) = changes.configuration {
                device.configuration = cfg;
            }
            if let Some(online) = changes.is_online {
                device.is_online = online;
            }
            if let Some(seen) = changes.last_seen {
                device.last_seen = Some(seen);
            }
            device.updated_at = Utc::now();

            Ok(device.clone())
        }

        async fn delete(&self, device_id: Uuid) -> Result<bool, StoreError> {
            Ok(self.devices.write().await.remove(&device_id).is_some())
        }
    }
}
