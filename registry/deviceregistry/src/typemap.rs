//! Static mapping from legacy sensor categories to registry type names.

pub const DEFAULT_DEVICE_TYPE: &str = "Temperature Sensor";

/// Pure lookup; anything unrecognized falls back to the default type.
pub fn device_type_for(sensor_type: &str) -> &'static str {
    match sensor_type {
        "temperature" => "Temperature Sensor",
        // Temperature Sensor hardware reports both temperature and humidity
        "humidity" => "Temperature Sensor",
        "motion" => "Motion Sensor",
        // Door and window contact sensors ride on the smart lock type
        "door" => "Smart Lock",
        "window" => "Smart Lock",
        "light" => "Smart Light",
        _ => DEFAULT_DEVICE_TYPE,
    }
}
