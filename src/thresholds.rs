//! Threshold Reconciler.
//!
//! Three threshold sources meet here: the compiled-in catalog defaults, the
//! operator's edits and the values devices broadcast on their `thresholds`
//! topic. Edits and broadcasts both write the device's live `SensorState`
//! directly, so whichever arrives last wins. Outbound payloads take the
//! device's live value per sensor and fall back to the catalog default.
//!
//! The operator-editable default template is persisted as JSON in a local
//! file and reloaded at startup; a missing or corrupt file reseeds it from
//! the catalog.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{DeviceRegistry, SensorCatalog};

// ---

/// Wire shape of one sensor's thresholds, shared by both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    pub sensor_type: String,
    pub min_threshold: f64,
    pub max_threshold: f64,
}

/// Outbound payload published to `<base>/<deviceId>/thresholds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPublish {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub thresholds: Vec<ThresholdEntry>,
    /// ISO-8601.
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdSource {
    Device,
    Catalog,
}

/// Current per-sensor thresholds as shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdView {
    pub sensor_id: String,
    pub name: String,
    pub unit: String,
    pub min_threshold: f64,
    pub max_threshold: f64,
    pub source: ThresholdSource,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("minimum threshold must be >= 0, got {0}")]
    InvalidMin(f64),
    #[error("maximum threshold must be > 0, got {0}")]
    InvalidMax(f64),
    #[error("unknown device `{0}`")]
    UnknownDevice(String),
    #[error("unknown sensor `{0}`")]
    UnknownSensor(String),
    #[error("no device selected")]
    NoDeviceSelected,
}

#[derive(Debug, Error)]
pub enum DefaultsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode default thresholds: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("default thresholds writer stopped: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

fn valid_min(min: f64) -> bool {
    min.is_finite() && min >= 0.0
}

fn valid_max(max: f64) -> bool {
    max.is_finite() && max > 0.0
}

/// Validate an edit as a whole; nothing is applied if either side fails.
pub fn validate_edit(min: Option<f64>, max: Option<f64>) -> Result<(), ThresholdError> {
    // ---
    if let Some(min) = min.filter(|m| !valid_min(*m)) {
        return Err(ThresholdError::InvalidMin(min));
    }
    if let Some(max) = max.filter(|m| !valid_max(*m)) {
        return Err(ThresholdError::InvalidMax(max));
    }
    Ok(())
}

/// Operator-editable default template, independent of any device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefaultThresholds(BTreeMap<String, Bounds>);

impl DefaultThresholds {
    // ---
    pub fn from_catalog(catalog: &SensorCatalog) -> Self {
        Self(
            catalog
                .iter()
                .map(|s| {
                    (
                        s.id.clone(),
                        Bounds {
                            min: s.min_threshold,
                            max: s.max_threshold,
                        },
                    )
                })
                .collect(),
        )
    }

    pub fn get(&self, sensor_id: &str) -> Option<Bounds> {
        self.0.get(sensor_id).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Bounds)> {
        self.0.iter()
    }

    /// Update one sensor's template. Each side is applied only if valid;
    /// returns whether anything changed.
    pub fn update(&mut self, catalog: &SensorCatalog, sensor_id: &str, min: Option<f64>, max: Option<f64>) -> bool {
        // ---
        let Some(def) = catalog.get(sensor_id) else {
            return false;
        };
        let bounds = self.0.entry(sensor_id.to_string()).or_insert(Bounds {
            min: def.min_threshold,
            max: def.max_threshold,
        });
        let before = *bounds;
        if let Some(min) = min.filter(|m| valid_min(*m)) {
            bounds.min = min;
        }
        if let Some(max) = max.filter(|m| valid_max(*m)) {
            bounds.max = max;
        }
        *bounds != before
    }
}

/// JSON file acting as the durable key/value store for the default template.
#[derive(Debug, Clone)]
pub struct DefaultsStore {
    path: PathBuf,
}

impl DefaultsStore {
    // ---
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the template, reseeding from the catalog if absent or corrupt.
    pub fn load(&self, catalog: &SensorCatalog) -> DefaultThresholds {
        // ---
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                info!(path = %self.path.display(), "No stored default thresholds ({}), seeding from catalog", e);
                return DefaultThresholds::from_catalog(catalog);
            }
        };

        match serde_json::from_str::<DefaultThresholds>(&raw) {
            Ok(defaults) => {
                debug!(path = %self.path.display(), sensors = defaults.len(), "Loaded default thresholds");
                defaults
            }
            Err(e) => {
                warn!(path = %self.path.display(), "Corrupt default thresholds, seeding from catalog: {}", e);
                DefaultThresholds::from_catalog(catalog)
            }
        }
    }

    pub fn save(&self, defaults: &DefaultThresholds) -> Result<(), DefaultsError> {
        // ---
        let encoded = serde_json::to_string_pretty(defaults)?;
        fs::write(&self.path, encoded).map_err(|source| DefaultsError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "Saved default thresholds");
        Ok(())
    }
}

#[derive(Debug)]
pub struct ThresholdReconciler {
    // ---
    defaults: DefaultThresholds,
    store: Option<DefaultsStore>,
}

impl ThresholdReconciler {
    // ---
    pub fn new(catalog: &SensorCatalog, store: Option<DefaultsStore>) -> Self {
        let mut reconciler = Self {
            defaults: DefaultThresholds::from_catalog(catalog),
            store,
        };
        reconciler.load_defaults(catalog);
        reconciler
    }

    /// Overwrite a device's live thresholds with broadcast values. Unknown
    /// sensors are skipped. Existing readings are not re-classified.
    pub fn apply_device_broadcast(
        &self,
        registry: &mut DeviceRegistry,
        device_id: &str,
        entries: &[ThresholdEntry],
    ) -> usize {
        // ---
        if !registry.contains(device_id) {
            debug!(device_id, "Threshold broadcast for unknown device dropped");
            return 0;
        }

        let mut applied = 0;
        for entry in entries {
            if registry.set_thresholds(device_id, &entry.sensor_type, entry.min_threshold, entry.max_threshold) {
                applied += 1;
            } else {
                debug!(device_id, sensor_id = %entry.sensor_type, "Broadcast for unknown sensor skipped");
            }
        }
        info!(device_id, applied, "Applied device threshold broadcast");
        applied
    }

    /// Validate and apply an operator edit. Returns whether the live state
    /// changed; an unchanged edit publishes nothing.
    pub fn apply_operator_edit(
        &self,
        registry: &mut DeviceRegistry,
        device_id: &str,
        sensor_id: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<bool, ThresholdError> {
        // ---
        validate_edit(min, max)?;

        let device = registry
            .get(device_id)
            .ok_or_else(|| ThresholdError::UnknownDevice(device_id.to_string()))?;
        let sensor = device
            .sensors
            .get(sensor_id)
            .ok_or_else(|| ThresholdError::UnknownSensor(sensor_id.to_string()))?;

        let new_min = min.unwrap_or(sensor.min_threshold);
        let new_max = max.unwrap_or(sensor.max_threshold);
        if new_min == sensor.min_threshold && new_max == sensor.max_threshold {
            return Ok(false);
        }

        registry.set_thresholds(device_id, sensor_id, new_min, new_max);
        info!(device_id, sensor_id, min = new_min, max = new_max, "Operator threshold edit applied");
        Ok(true)
    }

    /// Copy the default template onto a device, validated per sensor like an
    /// operator edit. Returns the number of sensors that changed.
    pub fn apply_defaults(&self, registry: &mut DeviceRegistry, device_id: &str) -> Result<usize, ThresholdError> {
        // ---
        if !registry.contains(device_id) {
            return Err(ThresholdError::UnknownDevice(device_id.to_string()));
        }
        let mut changed = 0;
        for (sensor_id, bounds) in self.defaults.iter() {
            match self.apply_operator_edit(registry, device_id, sensor_id, Some(bounds.min), Some(bounds.max)) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => warn!(device_id, sensor_id = %sensor_id, "Skipping default: {}", e),
            }
        }
        Ok(changed)
    }

    /// Merged thresholds for `device_id`: live device value, else catalog.
    pub fn merged_entries(&self, registry: &DeviceRegistry, device_id: &str) -> Vec<ThresholdEntry> {
        // ---
        let device = registry.get(device_id);
        registry
            .catalog()
            .iter()
            .map(|def| match device.and_then(|d| d.sensors.get(&def.id)) {
                Some(sensor) => ThresholdEntry {
                    sensor_type: def.id.clone(),
                    min_threshold: sensor.min_threshold,
                    max_threshold: sensor.max_threshold,
                },
                None => ThresholdEntry {
                    sensor_type: def.id.clone(),
                    min_threshold: def.min_threshold,
                    max_threshold: def.max_threshold,
                },
            })
            .collect()
    }

    /// Outbound payload for the currently selected device.
    pub fn build_publish(&self, registry: &DeviceRegistry, now: DateTime<Utc>) -> Option<ThresholdPublish> {
        // ---
        let device_id = registry.current_id()?;
        Some(self.payload_for(registry, device_id, now))
    }

    pub fn payload_for(&self, registry: &DeviceRegistry, device_id: &str, now: DateTime<Utc>) -> ThresholdPublish {
        // ---
        ThresholdPublish {
            device_id: device_id.to_string(),
            thresholds: self.merged_entries(registry, device_id),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Per-sensor threshold view of the currently selected device.
    pub fn current_view(&self, registry: &DeviceRegistry) -> Vec<ThresholdView> {
        // ---
        let device = registry.current();
        registry
            .catalog()
            .iter()
            .map(|def| match device.and_then(|d| d.sensors.get(&def.id)) {
                Some(sensor) => ThresholdView {
                    sensor_id: def.id.clone(),
                    name: def.name.clone(),
                    unit: def.unit.clone(),
                    min_threshold: sensor.min_threshold,
                    max_threshold: sensor.max_threshold,
                    source: ThresholdSource::Device,
                },
                None => ThresholdView {
                    sensor_id: def.id.clone(),
                    name: def.name.clone(),
                    unit: def.unit.clone(),
                    min_threshold: def.min_threshold,
                    max_threshold: def.max_threshold,
                    source: ThresholdSource::Catalog,
                },
            })
            .collect()
    }

    pub fn defaults(&self) -> &DefaultThresholds {
        &self.defaults
    }

    /// Reload the template from the store (catalog seed without a store).
    pub fn load_defaults(&mut self, catalog: &SensorCatalog) -> &DefaultThresholds {
        // ---
        self.defaults = match &self.store {
            Some(store) => store.load(catalog),
            None => DefaultThresholds::from_catalog(catalog),
        };
        &self.defaults
    }

    pub fn store(&self) -> Option<&DefaultsStore> {
        self.store.as_ref()
    }

    /// Replace the in-memory template. Callers persist through
    /// [`DefaultsStore::save`] first and install only on success.
    pub fn install_defaults(&mut self, defaults: DefaultThresholds) -> &DefaultThresholds {
        self.defaults = defaults;
        &self.defaults
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, sec).unwrap()
    }

    fn setup() -> (SensorCatalog, DeviceRegistry, ThresholdReconciler) {
        let catalog = SensorCatalog::dual_bound();
        let mut registry = DeviceRegistry::new(Arc::new(catalog.clone()), 20, "Operator ", "FoodTray_WiFi");
        registry.ensure_device("D1", at(0));
        let reconciler = ThresholdReconciler::new(&catalog, None);
        (catalog, registry, reconciler)
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("defaults-{}.json", uuid::Uuid::new_v4()))
    }

    fn bounds(registry: &DeviceRegistry, sensor: &str) -> (f64, f64) {
        let s = &registry.get("D1").unwrap().sensors[sensor];
        (s.min_threshold, s.max_threshold)
    }

    #[test]
    fn test_invalid_edit_is_rejected_without_mutation() {
        // ---
        let (_, mut registry, reconciler) = setup();
        let before = bounds(&registry, "sensor1");

        let err = reconciler
            .apply_operator_edit(&mut registry, "D1", "sensor1", Some(-1.0), Some(50.0))
            .unwrap_err();
        assert_eq!(err, ThresholdError::InvalidMin(-1.0));

        let err = reconciler
            .apply_operator_edit(&mut registry, "D1", "sensor1", Some(5.0), Some(0.0))
            .unwrap_err();
        assert_eq!(err, ThresholdError::InvalidMax(0.0));

        assert_eq!(bounds(&registry, "sensor1"), before);
    }

    #[test]
    fn test_edit_overwrites_broadcast_value() {
        // ---
        let (_, mut registry, reconciler) = setup();
        let broadcast = vec![ThresholdEntry {
            sensor_type: "sensor1".to_string(),
            min_threshold: 10.0,
            max_threshold: 40.0,
        }];
        assert_eq!(reconciler.apply_device_broadcast(&mut registry, "D1", &broadcast), 1);
        assert_eq!(bounds(&registry, "sensor1"), (10.0, 40.0));

        let changed = reconciler
            .apply_operator_edit(&mut registry, "D1", "sensor1", Some(5.0), Some(50.0))
            .unwrap();
        assert!(changed);
        assert_eq!(bounds(&registry, "sensor1"), (5.0, 50.0));
    }

    #[test]
    fn test_broadcast_after_edit_wins() {
        // ---
        let (_, mut registry, reconciler) = setup();
        reconciler
            .apply_operator_edit(&mut registry, "D1", "sensor2", Some(1.0), Some(2.0))
            .unwrap();
        let broadcast = vec![ThresholdEntry {
            sensor_type: "sensor2".to_string(),
            min_threshold: 7.0,
            max_threshold: 9.0,
        }];
        reconciler.apply_device_broadcast(&mut registry, "D1", &broadcast);
        assert_eq!(bounds(&registry, "sensor2"), (7.0, 9.0));
    }

    #[test]
    fn test_partial_edit_keeps_other_side() {
        // ---
        let (_, mut registry, reconciler) = setup();
        reconciler
            .apply_operator_edit(&mut registry, "D1", "sensor1", None, Some(30.0))
            .unwrap();
        assert_eq!(bounds(&registry, "sensor1"), (10.0, 30.0));

        let unchanged = reconciler
            .apply_operator_edit(&mut registry, "D1", "sensor1", Some(10.0), None)
            .unwrap();
        assert!(!unchanged);
    }

    #[test]
    fn test_edit_unknown_targets() {
        // ---
        let (_, mut registry, reconciler) = setup();
        assert_eq!(
            reconciler.apply_operator_edit(&mut registry, "D9", "sensor1", Some(1.0), None),
            Err(ThresholdError::UnknownDevice("D9".to_string()))
        );
        assert_eq!(
            reconciler.apply_operator_edit(&mut registry, "D1", "sensor42", Some(1.0), None),
            Err(ThresholdError::UnknownSensor("sensor42".to_string()))
        );
    }

    #[test]
    fn test_broadcast_skips_unknown_sensor_and_device() {
        // ---
        let (_, mut registry, reconciler) = setup();
        let broadcast = vec![
            ThresholdEntry {
                sensor_type: "sensor99".to_string(),
                min_threshold: 1.0,
                max_threshold: 2.0,
            },
            ThresholdEntry {
                sensor_type: "sensor3".to_string(),
                min_threshold: 1.0,
                max_threshold: 2.0,
            },
        ];
        assert_eq!(reconciler.apply_device_broadcast(&mut registry, "D1", &broadcast), 1);
        assert_eq!(reconciler.apply_device_broadcast(&mut registry, "ghost", &broadcast), 0);
    }

    #[test]
    fn test_publish_payload_prefers_device_values() {
        // ---
        let (catalog, mut registry, reconciler) = setup();
        reconciler
            .apply_operator_edit(&mut registry, "D1", "sensor1", Some(1.0), Some(2.0))
            .unwrap();

        let payload = reconciler.build_publish(&registry, at(30)).unwrap();
        assert_eq!(payload.device_id, "D1");
        assert_eq!(payload.thresholds.len(), catalog.len());
        assert_eq!(payload.thresholds[0].sensor_type, "sensor1");
        assert_eq!(payload.thresholds[0].max_threshold, 2.0);
        assert_eq!(payload.thresholds[1].max_threshold, 15.0);
        assert_eq!(payload.timestamp, "2025-03-26T18:45:30.000Z");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["deviceId"], "D1");
        assert_eq!(json["thresholds"][0]["min_threshold"], 1.0);
    }

    #[test]
    fn test_publish_requires_selected_device() {
        // ---
        let catalog = SensorCatalog::dual_bound();
        let registry = DeviceRegistry::new(Arc::new(catalog.clone()), 20, "Operator ", "x");
        let reconciler = ThresholdReconciler::new(&catalog, None);
        assert!(reconciler.build_publish(&registry, at(0)).is_none());
        assert!(reconciler
            .current_view(&registry)
            .iter()
            .all(|v| v.source == ThresholdSource::Catalog));
    }

    #[test]
    fn test_defaults_round_trip_through_store() {
        // ---
        let catalog = SensorCatalog::dual_bound();
        let path = temp_path();

        let mut reconciler = ThresholdReconciler::new(&catalog, Some(DefaultsStore::new(&path)));
        let mut defaults = reconciler.defaults().clone();
        assert!(defaults.update(&catalog, "sensor1", Some(3.5), Some(44.0)));
        reconciler.store().unwrap().save(&defaults).unwrap();
        reconciler.install_defaults(defaults.clone());

        // Simulated restart.
        let restarted = ThresholdReconciler::new(&catalog, Some(DefaultsStore::new(&path)));
        assert_eq!(restarted.defaults(), &defaults);
        assert_eq!(restarted.defaults().get("sensor1"), Some(Bounds { min: 3.5, max: 44.0 }));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_or_missing_store_falls_back_to_catalog() {
        // ---
        let catalog = SensorCatalog::dual_bound();
        let path = temp_path();

        let missing = DefaultsStore::new(&path).load(&catalog);
        assert_eq!(missing, DefaultThresholds::from_catalog(&catalog));

        fs::write(&path, "{ definitely not json").unwrap();
        let corrupt = DefaultsStore::new(&path).load(&catalog);
        assert_eq!(corrupt, DefaultThresholds::from_catalog(&catalog));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_failed_save_reports_io_error() {
        // ---
        let catalog = SensorCatalog::dual_bound();
        let path = std::env::temp_dir()
            .join(format!("missing-{}", uuid::Uuid::new_v4()))
            .join("defaults.json");
        let store = DefaultsStore::new(&path);

        let result = store.save(&DefaultThresholds::from_catalog(&catalog));
        assert!(matches!(result, Err(DefaultsError::Io { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_template_update_ignores_invalid_sides() {
        // ---
        let catalog = SensorCatalog::dual_bound();
        let mut defaults = DefaultThresholds::from_catalog(&catalog);
        assert!(defaults.update(&catalog, "sensor1", Some(-4.0), Some(99.0)));
        assert_eq!(defaults.get("sensor1"), Some(Bounds { min: 10.0, max: 99.0 }));
        assert!(!defaults.update(&catalog, "sensor1", None, Some(0.0)));
        assert!(!defaults.update(&catalog, "sensor77", Some(1.0), None));
    }

    #[test]
    fn test_apply_defaults_to_device() {
        // ---
        let (catalog, mut registry, mut reconciler) = setup();
        let mut defaults = reconciler.defaults().clone();
        defaults.update(&catalog, "sensor5", Some(1.0), Some(2.0));
        reconciler.install_defaults(defaults);

        assert_eq!(reconciler.apply_defaults(&mut registry, "D1").unwrap(), 1);
        assert_eq!(bounds(&registry, "sensor5"), (1.0, 2.0));
        assert!(reconciler.apply_defaults(&mut registry, "nope").is_err());
    }
}
