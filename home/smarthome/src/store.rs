use std::sync::Arc;

use chrono::Utc;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

use crate::models::{Sensor, SensorCreate, SensorType, SensorUpdate};

type SqlParam = Box<dyn tokio_postgres::types::ToSql + Sync + Send>;

fn as_refs(params: &[SqlParam]) -> Vec<&(dyn tokio_postgres::types::ToSql + Sync)> {
    params
        .iter()
        .map(|p| (&**p) as &(dyn tokio_postgres::types::ToSql + Sync))
        .collect()
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("sensor not found: {0}")]
    NotFound(i32),

    #[error("insert returned no row")]
    NoRowReturned,
}

fn sensor_from_row(row: &Row) -> Sensor {
    let type_raw: String = row.get("type");

    Sensor {
        id: row.get("id"),
        name: row.get("name"),
        // Rows predating a known category read as temperature, the
        // store's oldest kind.
        sensor_type: SensorType::parse(&type_raw).unwrap_or(SensorType::Temperature),
        location: row.get("location"),
        value: row.get("value"),
        status: row.get("status"),
        last_updated: row.get("last_updated"),
    }
}

/// Sensor store over one shared postgres connection.
#[derive(Clone)]
pub struct SensorDb {
    client: Arc<Client>,
}

impl SensorDb {
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

    pub async fn list(&self) -> Result<Vec<Sensor>, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT id, name, type, location, value, status, last_updated
                 FROM sensors ORDER BY id ASC",
                &[],
            )
            .await?;
        Ok(rows.iter().map(sensor_from_row).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Sensor, StoreError> {
        let rows = self
            .client
            .query(
                "SELECT id, name, type, location, value, status, last_updated
                 FROM sensors WHERE id = $1",
                &[&id],
            )
            .await?;
        rows.first()
            .map(sensor_from_row)
            .ok_or(StoreError::NotFound(id))
    }

    pub async fn create(&self, new: SensorCreate) -> Result<Sensor, StoreError> {
        let now = Utc::now();
        let rows = self
            .client
            .query(
                "INSERT INTO sensors (name, type, location, value, status, last_updated)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, name, type, location, value, status, last_updated",
                &[
                    &new.name,
                    &new.sensor_type.as_str(),
                    &new.location,
                    &new.value,
                    &new.status,
                    &now,
                ],
            )
            .await?;
        rows.first()
            .map(sensor_from_row)
            .ok_or(StoreError::NoRowReturned)
    }

    pub async fn update(&self, id: i32, changes: SensorUpdate) -> Result<Sensor, StoreError> {
        if changes.is_empty() {
            return self.get(id).await;
        }

        let mut set_parts: Vec<String> = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();

        if let Some(name) = changes.name {
            params.push(Box::new(name));
            set_parts.push(format!("name = ${}", params.len()));
        }
        if let Some(sensor_type) = changes.sensor_type {
            params.push(Box::new(sensor_type.as_str()));
            set_parts.push(format!("type = ${}", params.len()));
        }
        if let Some(location) = changes.location {
            params.push(Box::new(location));
            set_parts.push(format!("location = ${}", params.len()));
        }

        params.push(Box::new(id));
        let sql = format!(
            "UPDATE sensors SET {} WHERE id = ${}",
            set_parts.join(", "),
            params.len()
        );

        let affected = self.client.execute(&sql, &as_refs(&params)).await?;
        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }

        self.get(id).await
    }

    pub async fn update_value(&self, id: i32, value: f64, status: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let affected = self
            .client
            .execute(
                "UPDATE sensors SET value = $1, status = $2, last_updated = $3 WHERE id = $4",
                &[&value, &status, &now, &id],
            )
            .await?;
        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i32) -> Result<(), StoreError> {
        let affected = self
            .client
            .execute("DELETE FROM sensors WHERE id = $1", &[&id])
            .await?;
        if affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_insert_row_is_not_a_lookup_miss() {
        // An INSERT ... RETURNING that yields no row is an internal fault,
        // never a "sensor not found" with a fabricated id.
        let e = StoreError::NoRowReturned;
        assert!(!matches!(e, StoreError::NotFound(_)));
        assert_eq!(e.to_string(), "insert returned no row");
    }
}
