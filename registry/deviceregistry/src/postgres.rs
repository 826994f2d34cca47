use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{Device, DeviceFilter, DeviceType, DeviceUpdate, NewDevice};
use crate::store::{DeviceStore, StoreError};

type SqlParam = Box<dyn tokio_postgres::types::ToSql + Sync + Send>;

fn as_refs(params: &[SqlParam]) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
    params
        .iter()
        .map(|p| (&**p) as &(dyn tokio_postgres::types::ToSql + Sync))
        .collect()
}

/// Thin shared handle over one `tokio_postgres` connection; the
/// connection itself is driven by a background task.
#[derive(Clone)]
pub struct PostgresClient {
    client: Arc<Client>,
}

impl PostgresClient {
    pub async fn connect(pg_url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(pg_url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {e}");
            }
        });

        info!("connected to postgres");
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub async fn execute(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64, StoreError> {
        Ok(self.client.execute(sql, params).await?)
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<Row>, StoreError> {
        Ok(self.client.query(sql, params).await?)
    }

    pub async fn is_healthy(&self) -> bool {
        self.client.simple_query("SELECT 1").await.is_ok()
    }
}

const DEVICE_SELECT: &str = r#"
    SELECT d.device_id, d.type_id, d.house_id, d.location_id, d.registered_by,
           d.device_name, d.serial_number, d.firmware_version, d.configuration,
           d.is_online, d.last_seen, d.legacy_sensor_id, d.created_at, d.updated_at,
           dt.type_name, dt.category, dt.manufacturer, dt.model, dt.protocol,
           dt.is_active, dt.created_at AS type_created_at, dt.updated_at AS type_updated_at
    FROM devices d
    JOIN device_types dt ON d.type_id = dt.type_id
"#;

fn device_from_row(row: &Row) -> Device {
    let type_id: Uuid = row.get("type_id");

    Device {
        device_id: row.get("device_id"),
        type_id,
        house_id: row.get("house_id"),
        location_id: row.get("location_id"),
        registered_by: row.get("registered_by"),
        device_name: row.get("device_name"),
        serial_number: row.get("serial_number"),
        firmware_version: row.get("firmware_version"),
        configuration: row.get("configuration"),
        is_online: row.get("is_online"),
        last_seen: row.get("last_seen"),
        legacy_sensor_id: row.get("legacy_sensor_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        device_type: Some(DeviceType {
            type_id,
            type_name: row.get("type_name"),
            category: row.get("category"),
            manufacturer: row.get("manufacturer"),
            model: row.get("model"),
            protocol: row.get("protocol"),
            is_active: row.get("is_active"),
            created_at: row.get("type_created_at"),
            updated_at: row.get("type_updated_at"),
        }),
    }
}

/// Postgres-backed device store.
///
/// Relies on unique constraints on `serial_number` and (where present)
/// `legacy_sensor_id`, and on an index over `legacy_sensor_id` for the
/// reconciliation lookup.
pub struct PostgresDeviceStore {
    client: PostgresClient,
}

impl PostgresDeviceStore {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceStore for PostgresDeviceStore {
    async fn list(&self, filter: &DeviceFilter) -> Result<Vec<Device>, StoreError> {
        let mut sql = format!("{DEVICE_SELECT} WHERE 1=1");
        let mut params: Vec<SqlParam> = Vec::new();

        if let Some(house_id) = filter.house_id {
            params.push(Box::new(house_id));
            sql.push_str(&format!(" AND d.house_id = ${}", params.len()));
        }
        if let Some(location_id) = filter.location_id {
            params.push(Box::new(location_id));
            sql.push_str(&format!(" AND d.location_id = ${}", params.len()));
        }
        if let Some(type_id) = filter.type_id {
            params.push(Box::new(type_id));
            sql.push_str(&format!(" AND d.type_id = ${}", params.len()));
        }
        if let Some(is_online) = filter.is_online {
            params.push(Box::new(is_online));
            sql.push_str(&format!(" AND d.is_online = ${}", params.len()));
        }
        if let Some(category) = &filter.category {
            params.push(Box::new(category.clone()));
            sql.push_str(&format!(" AND dt.category = ${}", params.len()));
        }

        params.push(Box::new(filter.page_size()));
        sql.push_str(&format!(" ORDER BY d.created_at DESC LIMIT ${}", params.len()));
        params.push(Box::new(filter.offset()));
        sql.push_str(&format!(" OFFSET ${}", params.len()));

        let rows = self.client.query(&sql, &as_refs(&params)).await?;
        Ok(rows.iter().map(device_from_row).collect())
    }

    async fn get(&self, device_id: Uuid) -> Result<Option<Device>, StoreError> {
        let sql = format!("{DEVICE_SELECT} WHERE d.device_id = $1");
        let rows = self.client.query(&sql, &[&device_id]).await?;
        Ok(rows.first().map(device_from_row))
    }

    async fn find_by_legacy_sensor_id(
        &self,
        sensor_id: i32,
    ) -> Result<Option<Device>, StoreError> {
        let sql = format!("{DEVICE_SELECT} WHERE d.legacy_sensor_id = $1");
        let rows = self.client.query(&sql, &[&sensor_id]).await?;
        Ok(rows.first().map(device_from_row))
    }

    async fn list_types(
        &self,
        category: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Vec<DeviceType>, StoreError> {
        let mut sql = String::from(
            r#"
            SELECT type_id, type_name, category, manufacturer, model, protocol,
                   is_active, created_at, updated_at
            FROM device_types
            WHERE 1=1
            "#,
        );
        let mut params: Vec<SqlParam> = Vec::new();

        if let Some(category) = category {
            params.push(Box::new(category.to_string()));
            sql.push_str(&format!(" AND category = ${}", params.len()));
        }
        if let Some(is_active) = is_active {
            params.push(Box::new(is_active));
            sql.push_str(&format!(" AND is_active = ${}", params.len()));
        }
        sql.push_str(" ORDER BY type_name ASC");

        let rows = self.client.query(&sql, &as_refs(&params)).await?;
        Ok(rows
            .iter()
            .map(|row| DeviceType {
                type_id: row.get("type_id"),
                type_name: row.get("type_name"),
                category: row.get("category"),
                manufacturer: row.get("manufacturer"),
                model: row.get("model"),
                protocol: row.get("protocol"),
                is_active: row.get("is_active"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn create(&self, new: NewDevice, registered_by: Uuid) -> Result<Device, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT EXISTS(SELECT 1 FROM devices WHERE serial_number = $1)",
                &[&new.serial_number],
            )
            .await?;
        if rows.first().map(|r| r.get::<_, bool>(0)).unwrap_or(false) {
            return Err(StoreError::AlreadyExists(new.serial_number));
        }

        if let Some(sensor_id) = new.legacy_sensor_id {
            let rows = self
                .client
                .query(
                    "SELECT EXISTS(SELECT 1 FROM devices WHERE legacy_sensor_id = $1)",
                    &[&sensor_id],
                )
                .await?;
            if rows.first().map(|r| r.get::<_, bool>(0)).unwrap_or(false) {
                return Err(StoreError::AlreadyExists(format!("legacy sensor {sensor_id}")));
            }
        }

        let device_id = Uuid::new_v4();
        let now = Utc::now();

        self.client
            .execute(
                r#"
                INSERT INTO devices (device_id, type_id, house_id, location_id, registered_by,
                                     device_name, serial_number, firmware_version, configuration,
                                     is_online, legacy_sensor_id, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, false, $10, $11, $11)
                "#,
                &[
                    &device_id,
                    &new.type_id,
                    &new.house_id,
                    &new.location_id,
                    &registered_by,
                    &new.device_name,
                    &new.serial_number,
                    &new.firmware_version,
                    &new.configuration,
                    &new.legacy_sensor_id,
                    &now,
                ],
            )
            .await?;

        self.get(device_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(device_id.to_string()))
    }

    async fn update(&self, device_id: Uuid, changes: DeviceUpdate) -> Result<Device, StoreError> {
        if changes.is_empty() {
            return self
                .get(device_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(device_id.to_string()));
        }

        // Fixed set of optional field descriptors; column names are static
        // and values are always bound parameters.
        let mut set_parts: Vec<String> = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();

        if let Some(name) = changes.device_name {
            params.push(Box::new(name));
            set_parts.push(format!("device_name = ${}", params.len()));
        }
        if let Some(firmware) = changes.firmware_version {
            params.push(Box::new(firmware));
            set_parts.push(format!("firmware_version = ${}", params.len()));
        }
        if let Some(configuration) = changes.configuration {
            params.push(Box::new(configuration));
            set_parts.push(format!("configuration = ${}", params.len()));
        }
        if let Some(is_online) = changes.is_online {
            params.push(Box::new(is_online));
            set_parts.push(format!("is_online = ${}", params.len()));
        }
        if let Some(last_seen) = changes.last_seen {
            params.push(Box::new(last_seen));
            set_parts.push(format!("last_seen = ${}", params.len()));
        }

        params.push(Box::new(Utc::now()));
        set_parts.push(format!("updated_at = ${}", params.len()));

        params.push(Box::new(device_id));
        let sql = format!(
            "UPDATE devices SET {} WHERE device_id = ${}",
            set_parts.join(", "),
            params.len()
        );

        let affected = self.client.execute(&sql, &as_refs(&params)).await?;
        if affected == 0 {
            return Err(StoreError::NotFound(device_id.to_string()));
        }

        self.get(device_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(device_id.to_string()))
    }

    async fn delete(&self, device_id: Uuid) -> Result<bool, StoreError> {
        let affected = self
            .client
            .execute("DELETE FROM devices WHERE device_id = $1", &[&device_id])
            .await?;
        Ok(affected > 0)
    }
}
