use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sensor categories known to the legacy store. The wire format and the
/// database both carry the lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorType {
    Temperature,
    Humidity,
    Motion,
    Door,
    Window,
    Light,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Motion => "motion",
            SensorType::Door => "door",
            SensorType::Window => "window",
            SensorType::Light => "light",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "temperature" => Some(SensorType::Temperature),
            "humidity" => Some(SensorType::Humidity),
            "motion" => Some(SensorType::Motion),
            "door" => Some(SensorType::Door),
            "window" => Some(SensorType::Window),
            "light" => Some(SensorType::Light),
            _ => None,
        }
    }
}

/// A sensor row. `id` is a serial integer, the identity the device
/// registry records as `legacy_sensor_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: i32,
    pub name: String,

    #[serde(rename = "type")]
    pub sensor_type: SensorType,

    pub location: String,
    pub value: f64,
    pub status: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorCreate {
    pub name: String,

    #[serde(rename = "type")]
    pub sensor_type: SensorType,

    pub location: String,

    #[serde(default)]
    pub value: f64,

    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "inactive".to_string()
}

/// Partial metadata update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorUpdate {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "type")]
    pub sensor_type: Option<SensorType>,

    #[serde(default)]
    pub location: Option<String>,
}

impl SensorUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.sensor_type.is_none() && self.location.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_type_round_trips_lowercase() {
        for t in [
            SensorType::Temperature,
            SensorType::Humidity,
            SensorType::Motion,
            SensorType::Door,
            SensorType::Window,
            SensorType::Light,
        ] {
            assert_eq!(SensorType::parse(t.as_str()), Some(t));
        }
        assert_eq!(SensorType::parse("thermostat"), None);
    }

    #[test]
    fn sensor_serializes_type_field() {
        let sensor = Sensor {
            id: 1,
            name: "Hall".to_string(),
            sensor_type: SensorType::Door,
            location: "hallway".to_string(),
            value: 0.0,
            status: "active".to_string(),
            last_updated: Utc::now(),
        };
        let v: serde_json::Value = serde_json::to_value(&sensor).unwrap();
        assert_eq!(v["type"], "door");
    }
}
