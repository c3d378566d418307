use std::collections::HashMap;

use crate::types::{RawDevice, SensorReading};

/// Flatten hub devices into one reading per allowed sensor.
///
/// Devices whose model code is not in `device_codes` are dropped, as are
/// sensors whose code is not in `sensor_codes`. Output order follows input order.
pub fn map_readings(
    devices: &[RawDevice],
    device_codes: &[String],
    sensor_codes: &[String],
) -> Vec<SensorReading> {
    devices
        .iter()
        .filter(|d| device_codes.contains(&d.model_code))
        .flat_map(|device| {
            device
                .sensors
                .iter()
                .filter(|s| sensor_codes.contains(&s.sensor_code))
                .map(move |sensor| SensorReading {
                    id: sensor.id.clone(),
                    device_name: device.name.clone(),
                    model: device.model.clone(),
                    battery_level: device.battery_level.clone(),
                    sensor_name: sensor.sensor_name.clone(),
                    sensor_code: sensor.sensor_code.clone(),
                    last_reading_value: sensor.last_reading_value.clone(),
                    chart_unit: sensor.chart_unit.clone(),
                })
        })
        .collect()
}

/// Display name for a reading: an override keyed by sensor id, then one keyed
/// by `"<device>:<sensor>"`, then `"<device> <sensor>"`.
pub fn display_name(reading: &SensorReading, overrides: &HashMap<String, String>) -> String {
    let lookup = |key: &str| {
        overrides
            .get(key)
            .filter(|name| !name.is_empty())
            .cloned()
    };
    lookup(&reading.id.to_string())
        .or_else(|| lookup(&format!("{}:{}", reading.device_name, reading.sensor_name)))
        .unwrap_or_else(|| format!("{} {}", reading.device_name, reading.sensor_name))
}
