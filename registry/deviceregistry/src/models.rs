use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered smart-home device.
///
/// `device_id` is the registry's own identity. `legacy_sensor_id` records
/// the originating sensor store's integer id for devices created through
/// event reconciliation; it exists solely to support reconciliation
/// lookups and is unique where present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: Uuid,
    pub type_id: Uuid,
    pub house_id: Uuid,
    pub location_id: Uuid,
    pub registered_by: Uuid,
    pub device_name: String,
    pub serial_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,

    #[serde(default)]
    pub configuration: serde_json::Value,

    pub is_online: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_sensor_id: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Joined catalog entry, populated on reads.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
}

impl Device {
    /// Display type name for events and API responses; empty when the
    /// joined catalog entry is absent.
    pub fn type_name(&self) -> &str {
        self.device_type.as_ref().map(|t| t.type_name.as_str()).unwrap_or("")
    }
}

/// Catalog entry describing a kind of device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceType {
    pub type_id: Uuid,
    pub type_name: String,
    pub category: String,
    pub manufacturer: String,
    pub model: String,
    pub protocol: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration request for a new device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub type_id: Uuid,
    pub house_id: Uuid,
    pub location_id: Uuid,
    pub device_name: String,
    pub serial_number: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,

    #[serde(default)]
    pub configuration: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_sensor_id: Option<i32>,
}

/// Partial update: absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl DeviceUpdate {
    pub fn is_empty(&self) -> bool {
        self.device_name.is_none()
            && self.firmware_version.is_none()
            && self.configuration.is_none()
            && self.is_online.is_none()
            && self.last_seen.is_none()
    }
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

/// Query filters for device listing.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceFilter {
    #[serde(default)]
    pub house_id: Option<Uuid>,

    #[serde(default)]
    pub location_id: Option<Uuid>,

    #[serde(default)]
    pub type_id: Option<Uuid>,

    #[serde(default)]
    pub is_online: Option<bool>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            house_id: None,
            location_id: None,
            type_id: None,
            is_online: None,
            category: None,
            page: default_page(),
            limit: default_limit(),
        }
    }
}

const MAX_PAGE_SIZE: i64 = 100;

impl DeviceFilter {
    /// Requested page size clamped to `1..=100`; query-string values are
    /// untrusted and must never reach the store unbounded or negative.
    pub fn page_size(&self) -> i64 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.page_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let mut filter = DeviceFilter::default();
        assert_eq!(filter.page_size(), 20);

        filter.limit = -5;
        assert_eq!(filter.page_size(), 1);

        filter.limit = 0;
        assert_eq!(filter.page_size(), 1);

        filter.limit = 10_000;
        assert_eq!(filter.page_size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn offset_tolerates_out_of_range_paging() {
        let mut filter = DeviceFilter::default();
        filter.page = -3;
        filter.limit = -5;
        assert_eq!(filter.offset(), 0);

        filter.page = 4;
        filter.limit = 25;
        assert_eq!(filter.offset(), 75);
    }
}
