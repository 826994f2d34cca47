use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum TemperatureError {
    #[error("temperature api request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reading returned by the external temperature API.
#[derive(Debug, Clone, Deserialize)]
pub struct TemperatureData {
    #[serde(default)]
    pub sensor_id: Option<String>,
    pub location: String,
    pub value: f64,
    pub unit: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Client for the external temperature-lookup service. Used to enrich
/// temperature sensor reads with live values; callers fall back to stored
/// values when a lookup fails.
#[derive(Clone)]
pub struct TemperatureClient {
    base_url: String,
    http: reqwest::Client,
}

impl TemperatureClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn by_location(&self, location: &str) -> Result<TemperatureData, TemperatureError> {
        let data = self
            .http
            .get(format!("{}/temperature", self.base_url))
            .query(&[("location", location)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(data)
    }

    pub async fn by_sensor_id(&self, sensor_id: i32) -> Result<TemperatureData, TemperatureError> {
        let data = self
            .http
            .get(format!("{}/temperature/{}", self.base_url, sensor_id))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(data)
    }
}
