//! Device Registry: device id to live device state.
//!
//! Devices are created on the first message that mentions them and are
//! never evicted during a session. Every device carries exactly the catalog's
//! sensor set, seeded with catalog defaults. Mutations addressed to an
//! unknown device or sensor are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    Device, DeviceSnapshot, HistoryPoint, SensorCatalog, SensorState, StatusReport, Tier,
    WifiStatus,
};

// ---

/// Result of applying one reading to a device.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedReading {
    // ---
    pub device_id: String,
    pub operator: String,
    pub sensor_id: String,
    pub sensor_name: String,
    pub unit: String,
    pub value: f64,
    pub min_threshold: f64,
    pub max_threshold: f64,
    pub status: Tier,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DeviceRegistry {
    // ---
    catalog: Arc<SensorCatalog>,
    history_capacity: usize,
    operator_prefix: String,
    default_ssid: String,
    devices: HashMap<String, Device>,
    /// Registration order.
    order: Vec<String>,
    current: Option<String>,
}

impl DeviceRegistry {
    // ---
    pub fn new(
        catalog: Arc<SensorCatalog>,
        history_capacity: usize,
        operator_prefix: impl Into<String>,
        default_ssid: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            history_capacity,
            operator_prefix: operator_prefix.into(),
            default_ssid: default_ssid.into(),
            devices: HashMap::new(),
            order: Vec::new(),
            current: None,
        }
    }

    /// Register `device_id` if unseen. Returns `true` when a device was created.
    ///
    /// The first registered device becomes the current one when nothing is
    /// selected yet.
    pub fn ensure_device(&mut self, device_id: &str, now: DateTime<Utc>) -> bool {
        // ---
        let created = if self.devices.contains_key(device_id) {
            false
        } else {
            let sensors = self
                .catalog
                .iter()
                .map(|def| {
                    (
                        def.id.clone(),
                        SensorState::from_definition(def, self.history_capacity),
                    )
                })
                .collect();

            let device = Device {
                id: device_id.to_string(),
                operator: format!("{}{}", self.operator_prefix, device_id),
                ssid: self.default_ssid.clone(),
                wifi_status: WifiStatus::Online,
                wifi_signal: None,
                heap_memory: None,
                uptime: None,
                reported_id: None,
                last_update: now,
                sensors,
            };

            self.devices.insert(device_id.to_string(), device);
            self.order.push(device_id.to_string());
            info!(device_id, total = self.order.len(), "Registered new device");
            true
        };

        if self.current.is_none() {
            self.current = Some(device_id.to_string());
        }

        created
    }

    pub fn touch(&mut self, device_id: &str, timestamp: DateTime<Utc>) {
        // ---
        if let Some(device) = self.devices.get_mut(device_id) {
            device.last_update = timestamp;
        }
    }

    /// Select the device that feeds live views. Unknown ids are ignored.
    pub fn set_current_device(&mut self, device_id: &str) -> bool {
        // ---
        if self.devices.contains_key(device_id) {
            self.current = Some(device_id.to_string());
            true
        } else {
            debug!(device_id, "Ignoring selection of unknown device");
            false
        }
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Device> {
        self.current.as_deref().and_then(|id| self.devices.get(id))
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn snapshot(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.devices
            .get(device_id)
            .map(|d| d.snapshot(&self.catalog))
    }

    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    /// Store a reading, classify it against the sensor's live thresholds and
    /// refresh `last_update`. `None` when the device or sensor is unknown.
    pub fn apply_reading(
        &mut self,
        device_id: &str,
        sensor_id: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<AcceptedReading> {
        // ---
        let policy = self.catalog.policy();
        let device = self.devices.get_mut(device_id)?;
        let sensor = device.sensors.get_mut(sensor_id)?;

        sensor.current_value = value;
        sensor.history.push(HistoryPoint { value, timestamp });
        sensor.status = policy.classify(value, sensor.min_threshold, sensor.max_threshold);

        let accepted = AcceptedReading {
            device_id: device_id.to_string(),
            operator: device.operator.clone(),
            sensor_id: sensor_id.to_string(),
            sensor_name: sensor.name.clone(),
            unit: sensor.unit.clone(),
            value,
            min_threshold: sensor.min_threshold,
            max_threshold: sensor.max_threshold,
            status: sensor.status,
            timestamp,
        };

        device.last_update = timestamp;
        Some(accepted)
    }

    /// Apply a parsed status line. Fields absent from the report are kept.
    pub fn apply_status(
        &mut self,
        device_id: &str,
        report: &StatusReport,
        timestamp: DateTime<Utc>,
    ) -> bool {
        // ---
        let Some(device) = self.devices.get_mut(device_id) else {
            return false;
        };

        if let Some(id) = &report.reported_id {
            device.reported_id = Some(id.clone());
        }
        if let Some(dbm) = report.wifi_signal {
            device.wifi_signal = Some(dbm);
            device.wifi_status = WifiStatus::from_signal(dbm);
        }
        if let Some(heap) = report.heap_memory {
            device.heap_memory = Some(heap);
        }
        if let Some(uptime) = report.uptime {
            device.uptime = Some(uptime);
        }
        device.last_update = timestamp;
        true
    }

    /// Overwrite one sensor's live thresholds. Does not re-classify.
    pub fn set_thresholds(
        &mut self,
        device_id: &str,
        sensor_id: &str,
        min_threshold: f64,
        max_threshold: f64,
    ) -> bool {
        // ---
        match self
            .devices
            .get_mut(device_id)
            .and_then(|d| d.sensors.get_mut(sensor_id))
        {
            Some(sensor) => {
                sensor.min_threshold = min_threshold;
                sensor.max_threshold = max_threshold;
                true
            }
            None => false,
        }
    }

    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(
            Arc::new(SensorCatalog::dual_bound()),
            20,
            "Operator ",
            "FoodTray_WiFi",
        )
    }

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, sec).unwrap()
    }

    #[test]
    fn test_ensure_device_seeds_catalog_sensors() {
        // ---
        let mut reg = registry();
        assert!(reg.ensure_device("D1", at(0)));

        let device = reg.get("D1").unwrap();
        let mut ids: Vec<_> = device.sensors.keys().cloned().collect();
        let mut expected: Vec<_> = reg.catalog().iter().map(|s| s.id.clone()).collect();
        ids.sort();
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(device.operator, "Operator D1");
        assert_eq!(device.ssid, "FoodTray_WiFi");
        assert_eq!(device.wifi_status, WifiStatus::Online);
        assert_eq!(device.last_update, at(0));
    }

    #[test]
    fn test_ensure_device_is_idempotent() {
        // ---
        let mut reg = registry();
        assert!(reg.ensure_device("D1", at(0)));
        reg.apply_reading("D1", "sensor1", 12.0, at(1));
        assert!(!reg.ensure_device("D1", at(2)));

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("D1").unwrap().sensors["sensor1"].current_value, 12.0);
    }

    #[test]
    fn test_first_device_becomes_current() {
        // ---
        let mut reg = registry();
        assert_eq!(reg.current_id(), None);
        reg.ensure_device("D1", at(0));
        reg.ensure_device("D2", at(0));
        assert_eq!(reg.current_id(), Some("D1"));

        assert!(reg.set_current_device("D2"));
        assert_eq!(reg.current_id(), Some("D2"));

        assert!(!reg.set_current_device("nope"));
        assert_eq!(reg.current_id(), Some("D2"));
        assert_eq!(reg.ids(), &["D1".to_string(), "D2".to_string()]);
    }

    #[test]
    fn test_unknown_device_mutations_are_ignored() {
        // ---
        let mut reg = registry();
        reg.touch("ghost", at(5));
        assert!(reg.apply_reading("ghost", "sensor1", 1.0, at(5)).is_none());
        assert!(!reg.set_thresholds("ghost", "sensor1", 1.0, 2.0));
        assert!(!reg.apply_status("ghost", &StatusReport::default(), at(5)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_unknown_sensor_reading_is_ignored() {
        // ---
        let mut reg = registry();
        reg.ensure_device("D1", at(0));
        assert!(reg.apply_reading("D1", "sensor99", 1.0, at(3)).is_none());
        assert_eq!(reg.get("D1").unwrap().last_update, at(0));
    }

    #[test]
    fn test_apply_reading_classifies_and_tracks_history() {
        // ---
        let mut reg = registry();
        reg.ensure_device("D1", at(0));

        // sensor1: min 10, max 25 -> danger from 20
        let accepted = reg.apply_reading("D1", "sensor1", 21.0, at(1)).unwrap();
        assert_eq!(accepted.status, Tier::Danger);
        assert_eq!(accepted.max_threshold, 25.0);

        let accepted = reg.apply_reading("D1", "sensor1", 4.0, at(2)).unwrap();
        assert_eq!(accepted.status, Tier::Normal);

        let sensor = &reg.get("D1").unwrap().sensors["sensor1"];
        assert_eq!(sensor.current_value, 4.0);
        assert_eq!(sensor.history.len(), 2);
        assert_eq!(reg.get("D1").unwrap().last_update, at(2));
    }

    #[test]
    fn test_sensor_history_is_bounded() {
        // ---
        let mut reg = registry();
        reg.ensure_device("D1", at(0));
        for i in 0..21 {
            reg.apply_reading("D1", "sensor2", i as f64, at(0));
        }
        let history = &reg.get("D1").unwrap().sensors["sensor2"].history;
        assert_eq!(history.len(), 20);
        assert_eq!(history.get(0).unwrap().value, 1.0);
    }

    #[test]
    fn test_apply_status_updates_wifi() {
        // ---
        let mut reg = registry();
        reg.ensure_device("D1", at(0));
        let report = StatusReport {
            reported_id: Some("FT123ABCDEF".to_string()),
            wifi_signal: Some(-85),
            heap_memory: Some(200_000),
            uptime: None,
        };
        assert!(reg.apply_status("D1", &report, at(9)));

        let device = reg.get("D1").unwrap();
        assert_eq!(device.wifi_status, WifiStatus::Poor);
        assert_eq!(device.wifi_signal, Some(-85));
        assert_eq!(device.heap_memory, Some(200_000));
        assert_eq!(device.uptime, None);
        assert_eq!(device.reported_id.as_deref(), Some("FT123ABCDEF"));
        assert_eq!(device.last_update, at(9));
    }

    #[test]
    fn test_set_thresholds_does_not_reclassify() {
        // ---
        let mut reg = registry();
        reg.ensure_device("D1", at(0));
        reg.apply_reading("D1", "sensor1", 15.0, at(1));
        assert!(reg.set_thresholds("D1", "sensor1", 1.0, 10.0));

        let sensor = &reg.get("D1").unwrap().sensors["sensor1"];
        assert_eq!(sensor.status, Tier::Warning);
        assert_eq!(sensor.max_threshold, 10.0);
    }
}
