use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::change::ChangeDetector;
use crate::mapper::display_name;
use crate::types::{Channel, Id, Metadata, SensorReading};

pub const MANUFACTURER: &str = "Acurite";

const KEY_NAMESPACE: Uuid = Uuid::from_u128(0x5b0e_93c4_7d21_5a6f_8c3e_1f42_a9d0_6e17);

/// Host-side store of device entries. The poller only ever holds handles.
pub trait Registry {
    type Handle: Clone;

    fn upsert(&mut self, key: &str) -> Self::Handle;
    fn remove(&mut self, handle: Self::Handle);
    fn set_channel_value(&mut self, handle: &Self::Handle, channel: Channel, value: f64);
    fn set_metadata(&mut self, handle: &Self::Handle, metadata: &Metadata);
    fn set_battery(&mut self, handle: &Self::Handle, level: f64, is_low: bool);

    /// Whether the last reading for `channel` could be used.
    fn set_channel_active(&mut self, _handle: &Self::Handle, _channel: Channel, _active: bool) {}
}

/// Stable registry key for a sensor, identical across polls and restarts.
pub fn identity_key(sensor_id: &Id, sensor_name: &str) -> String {
    let name = format!("{sensor_id}:{sensor_name}");
    Uuid::new_v5(&KEY_NAMESPACE, name.as_bytes()).to_string()
}

/// Keeps the registry in line with what the last poll cycle saw.
pub struct RegistryReconciler<R: Registry> {
    registry: R,
    entries: HashMap<String, R::Handle>,
    seen: HashSet<String>,
    changes: ChangeDetector,
    name_overrides: HashMap<String, String>,
    battery_low_threshold: f64,
}

impl<R: Registry> RegistryReconciler<R> {
    pub fn new(
        registry: R,
        name_overrides: HashMap<String, String>,
        battery_low_threshold: f64,
    ) -> Self {
        Self {
            registry,
            entries: HashMap::new(),
            seen: HashSet::new(),
            changes: ChangeDetector::new(),
            name_overrides,
            battery_low_threshold,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Last value propagated for `key`. Survives pruning of the entry.
    pub fn last_value(&self, key: &str) -> Option<f64> {
        self.changes.last_value(key)
    }

    /// Take over an entry the host restored from a previous run. It is pruned
    /// after the first complete cycle that does not see it.
    pub fn adopt(&mut self, key: impl Into<String>, handle: R::Handle) {
        let key = key.into();
        if self.entries.contains_key(&key) {
            warn!(key = %key, "duplicate restored entry, releasing it");
            self.registry.remove(handle);
            return;
        }
        debug!(key = %key, "adopted restored entry");
        self.entries.insert(key, handle);
    }

    pub fn begin_cycle(&mut self) {
        self.seen.clear();
    }

    pub fn apply(&mut self, reading: &SensorReading) {
        let key = identity_key(&reading.id, &reading.sensor_name);
        let name = display_name(reading, &self.name_overrides);

        let (handle, created) = match self.entries.get(&key) {
            Some(handle) => (handle.clone(), false),
            None => {
                info!(key = %key, name = %name, "registering entry");
                let handle = self.registry.upsert(&key);
                self.entries.insert(key.clone(), handle.clone());
                (handle, true)
            }
        };
        self.seen.insert(key.clone());

        match reading.channel() {
            Some(channel) => match reading.normalized_value() {
                Ok(value) => {
                    // A fresh handle has no value yet, whatever the cache holds.
                    let propagate = if created {
                        self.changes.record(&key, value);
                        true
                    } else {
                        self.changes.should_propagate(&key, value)
                    };
                    if propagate {
                        debug!(name = %name, ?channel, value, "propagating value");
                        self.registry.set_channel_value(&handle, channel, value);
                    }
                    self.registry.set_channel_active(&handle, channel, true);
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "skipping channel update");
                    self.registry.set_channel_active(&handle, channel, false);
                }
            },
            None => info!(
                sensor_name = %reading.sensor_name,
                sensor_code = %reading.sensor_code,
                "unsupported sensor type"
            ),
        }

        let metadata = Metadata {
            manufacturer: MANUFACTURER.to_string(),
            model: reading.model.description.clone(),
            serial: reading.model.id.to_string(),
            display_name: name,
        };
        self.registry.set_metadata(&handle, &metadata);

        if let Some(raw) = &reading.battery_level {
            match raw.as_f64() {
                Some(level) => {
                    let is_low = level <= self.battery_low_threshold;
                    self.registry.set_battery(&handle, level, is_low);
                }
                None => warn!(sensor = %reading.id, value = %raw, "skipping invalid battery level"),
            }
        }
    }

    /// Release every known entry the current cycle did not see.
    /// Returns how many were removed.
    pub fn finish_cycle(&mut self) -> usize {
        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|key| !self.seen.contains(*key))
            .cloned()
            .collect();
        for key in &stale {
            if let Some(handle) = self.entries.remove(key) {
                info!(key = %key, "removing stale entry");
                self.registry.remove(handle);
            }
        }
        self.seen.clear();
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Model, ReadingValue};

    #[derive(Default)]
    struct Recorder {
        next: u32,
        upserts: Vec<String>,
        removed: Vec<u32>,
        values: Vec<(u32, Channel, f64)>,
        active: Vec<(u32, Channel, bool)>,
        metadata: Vec<(u32, Metadata)>,
        battery: Vec<(u32, f64, bool)>,
    }

    impl Registry for Recorder {
        type Handle = u32;

        fn upsert(&mut self, key: &str) -> u32 {
            self.next += 1;
            self.upserts.push(key.to_string());
            self.next
        }

        fn remove(&mut self, handle: u32) {
            self.removed.push(handle);
        }

        fn set_channel_value(&mut self, handle: &u32, channel: Channel, value: f64) {
            self.values.push((*handle, channel, value));
        }

        fn set_metadata(&mut self, handle: &u32, metadata: &Metadata) {
            self.metadata.push((*handle, metadata.clone()));
        }

        fn set_battery(&mut self, handle: &u32, level: f64, is_low: bool) {
            self.battery.push((*handle, level, is_low));
        }

        fn set_channel_active(&mut self, handle: &u32, channel: Channel, active: bool) {
            self.active.push((*handle, channel, active));
        }
    }

    fn reading(id: i64, sensor: &str, value: ReadingValue) -> SensorReading {
        SensorReading {
            id: Id::Number(id),
            device_name: "Backyard".to_string(),
            model: Model {
                id: Id::Number(9),
                description: "5-in-1 Weather Station".to_string(),
            },
            battery_level: None,
            sensor_name: sensor.to_string(),
            sensor_code: sensor.to_string(),
            last_reading_value: value,
            chart_unit: None,
        }
    }

    fn reconciler() -> RegistryReconciler<Recorder> {
        RegistryReconciler::new(Recorder::default(), HashMap::new(), 20.0)
    }

    fn cycle(r: &mut RegistryReconciler<Recorder>, readings: &[SensorReading]) -> usize {
        r.begin_cycle();
        for reading in readings {
            r.apply(reading);
        }
        r.finish_cycle()
    }

    #[test]
    fn identity_key_is_stable_and_distinct() {
        let a = identity_key(&Id::Number(1), "Temperature");
        assert_eq!(a, identity_key(&Id::Number(1), "Temperature"));
        assert_eq!(a, identity_key(&Id::from("1"), "Temperature"));
        assert_ne!(a, identity_key(&Id::Number(1), "Humidity"));
        assert_ne!(a, identity_key(&Id::Number(2), "Temperature"));
    }

    #[test]
    fn prunes_keys_missing_from_cycle() {
        let mut r = reconciler();
        let a = reading(1, "Temperature", ReadingValue::Number(20.0));
        let b = reading(2, "Humidity", ReadingValue::Number(40.0));

        assert_eq!(cycle(&mut r, &[a.clone(), b.clone()]), 0);
        assert_eq!(r.registry().upserts.len(), 2);

        assert_eq!(cycle(&mut r, &[a.clone()]), 1);
        assert_eq!(r.registry().removed, vec![2]);
        assert!(!r.contains(&identity_key(&b.id, &b.sensor_name)));
        assert!(r.contains(&identity_key(&a.id, &a.sensor_name)));

        assert_eq!(cycle(&mut r, &[a]), 0);
        assert_eq!(r.registry().removed, vec![2]);
    }

    #[test]
    fn reappearing_sensor_gets_value_on_new_handle() {
        let mut r = reconciler();
        let a = reading(1, "Temperature", ReadingValue::Number(20.0));
        let b = reading(2, "Humidity", ReadingValue::Number(40.0));
        let b_key = identity_key(&b.id, &b.sensor_name);

        cycle(&mut r, &[a.clone(), b.clone()]);
        assert_eq!(cycle(&mut r, &[a.clone()]), 1);
        assert_eq!(r.last_value(&b_key), Some(40.0));

        cycle(&mut r, &[a.clone(), b.clone()]);
        let rec = r.registry();
        assert_eq!(rec.upserts.len(), 3);
        assert_eq!(rec.removed, vec![2]);
        assert_eq!(
            rec.values,
            vec![
                (1, Channel::Temperature, 20.0),
                (2, Channel::Humidity, 40.0),
                (3, Channel::Humidity, 40.0),
            ]
        );

        cycle(&mut r, &[a, b]);
        assert_eq!(r.registry().values.len(), 3, "unchanged value stays gated");
    }

    #[test]
    fn upserts_once_per_key() {
        let mut r = reconciler();
        let a = reading(1, "Temperature", ReadingValue::Number(20.0));
        cycle(&mut r, &[a.clone()]);
        cycle(&mut r, &[a]);
        assert_eq!(r.registry().upserts.len(), 1);
    }

    #[test]
    fn value_writes_gated_metadata_unconditional() {
        let mut r = reconciler();
        let a = reading(1, "Humidity", ReadingValue::Number(40.0));
        cycle(&mut r, &[a.clone()]);
        cycle(&mut r, &[a]);
        cycle(&mut r, &[reading(1, "Humidity", ReadingValue::Number(41.0))]);

        let rec = r.registry();
        assert_eq!(
            rec.values,
            vec![(1, Channel::Humidity, 40.0), (1, Channel::Humidity, 41.0)]
        );
        assert_eq!(rec.metadata.len(), 3);
        let (_, meta) = &rec.metadata[0];
        assert_eq!(meta.manufacturer, "Acurite");
        assert_eq!(meta.model, "5-in-1 Weather Station");
        assert_eq!(meta.serial, "9");
        assert_eq!(meta.display_name, "Backyard Humidity");
    }

    #[test]
    fn fahrenheit_normalized_before_propagation() {
        let mut r = reconciler();
        let mut a = reading(1, "Temperature", ReadingValue::Number(32.0));
        a.chart_unit = Some("F".to_string());
        cycle(&mut r, &[a]);
        assert_eq!(r.registry().values, vec![(1, Channel::Temperature, 0.0)]);
    }

    #[test]
    fn invalid_value_skips_update_but_keeps_entry() {
        let mut r = reconciler();
        let a = reading(1, "Humidity", ReadingValue::from("n/a"));
        assert_eq!(cycle(&mut r, &[a.clone()]), 0);
        let rec = r.registry();
        assert!(rec.values.is_empty());
        assert_eq!(rec.active, vec![(1, Channel::Humidity, false)]);
        assert_eq!(rec.metadata.len(), 1);
        assert!(r.contains(&identity_key(&a.id, &a.sensor_name)));
    }

    #[test]
    fn numeric_string_values_accepted() {
        let mut r = reconciler();
        cycle(&mut r, &[reading(1, "Humidity", ReadingValue::from(" 55.5 "))]);
        assert_eq!(r.registry().values, vec![(1, Channel::Humidity, 55.5)]);
        assert_eq!(r.registry().active, vec![(1, Channel::Humidity, true)]);
    }

    #[test]
    fn battery_low_threshold_is_inclusive() {
        let mut r = reconciler();
        let mut a = reading(1, "Temperature", ReadingValue::Number(20.0));
        a.battery_level = Some(ReadingValue::Number(20.0));
        let mut b = reading(2, "Humidity", ReadingValue::Number(40.0));
        b.battery_level = Some(ReadingValue::Number(21.0));
        let c = reading(3, "Humidity", ReadingValue::Number(40.0));
        cycle(&mut r, &[a, b, c]);
        assert_eq!(r.registry().battery, vec![(1, 20.0, true), (2, 21.0, false)]);
    }

    #[test]
    fn unsupported_sensor_keeps_entry_without_channel() {
        let mut r = reconciler();
        cycle(&mut r, &[reading(5, "Wind Speed", ReadingValue::Number(3.0))]);
        let rec = r.registry();
        assert_eq!(rec.upserts.len(), 1);
        assert!(rec.values.is_empty());
        assert!(rec.active.is_empty());
        assert_eq!(rec.metadata.len(), 1);
    }

    #[test]
    fn adopted_entries_reused_or_pruned() {
        let mut r = reconciler();
        let a = reading(1, "Temperature", ReadingValue::Number(20.0));
        r.adopt(identity_key(&a.id, &a.sensor_name), 100);
        r.adopt("gone", 200);
        r.adopt("gone", 201);
        assert_eq!(r.registry().removed, vec![201]);

        assert_eq!(cycle(&mut r, &[a]), 1);
        let rec = r.registry();
        assert!(rec.upserts.is_empty());
        assert_eq!(rec.values, vec![(100, Channel::Temperature, 20.0)]);
        assert_eq!(rec.removed, vec![201, 200]);
    }

    #[test]
    fn name_overrides_applied_to_metadata() {
        let overrides = HashMap::from([("1".to_string(), "Patio".to_string())]);
        let mut r = RegistryReconciler::new(Recorder::default(), overrides, 20.0);
        cycle(&mut r, &[reading(1, "Temperature", ReadingValue::Number(20.0))]);
        assert_eq!(r.registry().metadata[0].1.display_name, "Patio");
    }
}
