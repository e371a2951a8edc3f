//! Sensor Catalog: the static list of channels every device reports.
//!
//! Two variants ship with the monitor. The `dual` catalog carries eleven
//! channels with min/max thresholds; the older `single` catalog carries ten
//! channels with a single upper threshold (stored as `max_threshold` with a
//! zero floor).

use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

use crate::ThresholdPolicy;

// ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorDefinition {
    // ---
    pub id: String,
    pub name: String,
    pub unit: String,
    pub min_threshold: f64,
    pub max_threshold: f64,
}

impl SensorDefinition {
    fn new(id: &str, name: &str, unit: &str, min_threshold: f64, max_threshold: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
            min_threshold,
            max_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogVariant {
    Dual,
    Single,
}

impl FromStr for CatalogVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dual" => Ok(Self::Dual),
            "single" => Ok(Self::Single),
            other => Err(anyhow!("unknown sensor variant '{}', expected dual|single", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SensorCatalog {
    // ---
    sensors: Vec<SensorDefinition>,
    policy: ThresholdPolicy,
}

impl SensorCatalog {
    // ---
    pub fn new(sensors: Vec<SensorDefinition>, policy: ThresholdPolicy) -> Self {
        Self { sensors, policy }
    }

    pub fn for_variant(variant: CatalogVariant) -> Self {
        match variant {
            CatalogVariant::Dual => Self::dual_bound(),
            CatalogVariant::Single => Self::single_bound(),
        }
    }

    /// Eleven gas/climate channels with min/max thresholds.
    pub fn dual_bound() -> Self {
        // ---
        let sensors = vec![
            SensorDefinition::new("sensor1", "NH3 (Amonia)", "ppm", 10.0, 25.0),
            SensorDefinition::new("sensor2", "H2S (Hidrogen Sulfida)", "ppm", 5.0, 15.0),
            SensorDefinition::new("sensor3", "CH4 (Metana)", "ppm", 50.0, 100.0),
            SensorDefinition::new("sensor4", "CO2 (Karbon Dioksida)", "ppm", 1000.0, 5000.0),
            SensorDefinition::new("sensor5", "VOC (Senyawa Organik Volatil)", "ppm", 100.0, 300.0),
            SensorDefinition::new("sensor6", "Alcohol/Etanol (C2H5OH)", "ppm", 50.0, 200.0),
            SensorDefinition::new("sensor7", "CO (Karbon Monoksida)", "ppm", 10.0, 50.0),
            SensorDefinition::new("sensor8", "Acetone", "ppm", 100.0, 500.0),
            SensorDefinition::new("sensor9", "H2 (Hidrogen)", "ppm", 100.0, 1000.0),
            SensorDefinition::new("sensor10", "Temperature", "°C", 20.0, 35.0),
            SensorDefinition::new("sensor11", "Humidity", "%", 30.0, 80.0),
        ];
        Self::new(sensors, ThresholdPolicy::DualBound)
    }

    /// Ten channels with one upper threshold each.
    pub fn single_bound() -> Self {
        // ---
        let sensors = vec![
            SensorDefinition::new("sensor1", "NH3 (Amonia)", "ppm", 0.0, 25.0),
            SensorDefinition::new("sensor2", "H2S (Hidrogen Sulfida)", "ppm", 0.0, 10.0),
            SensorDefinition::new("sensor3", "CH4 (Metana)", "ppm", 0.0, 1000.0),
            SensorDefinition::new("sensor4", "CO2 (Karbon Dioksida)", "ppm", 0.0, 5000.0),
            SensorDefinition::new("sensor5", "VOC (Senyawa Organik Volatil)", "ppm", 0.0, 500.0),
            SensorDefinition::new("sensor6", "Alcohol/Etanol (C2H5OH)", "ppm", 0.0, 1000.0),
            SensorDefinition::new("sensor7", "CO (Karbon Monoksida)", "ppm", 0.0, 35.0),
            SensorDefinition::new("sensor8", "Acetone", "ppm", 0.0, 250.0),
            SensorDefinition::new("sensor9", "H2 (Hidrogen)", "ppm", 0.0, 1000.0),
            SensorDefinition::new("sensor10", "Temperature", "°C", 0.0, 40.0),
        ];
        Self::new(sensors, ThresholdPolicy::SingleBound)
    }

    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Catalog order, which is also display order.
    pub fn iter(&self) -> impl Iterator<Item = &SensorDefinition> {
        self.sensors.iter()
    }

    pub fn get(&self, sensor_id: &str) -> Option<&SensorDefinition> {
        self.sensors.iter().find(|s| s.id == sensor_id)
    }

    pub fn contains(&self, sensor_id: &str) -> bool {
        self.get(sensor_id).is_some()
    }
}
