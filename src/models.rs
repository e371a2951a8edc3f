//! Data models for the telemetry core.
//!
//! Live device state (`Device`, `SensorState`), the records the core emits
//! (`Alert`, `Frame`, `LogEntry`) and the read-only snapshot shapes handed to
//! renderers.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RingBuffer, SensorCatalog, SensorDefinition, Tier};

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WifiStatus {
    Online,
    Poor,
    Offline,
}

impl WifiStatus {
    /// Signal strength in dBm above which a link counts as healthy.
    pub const POOR_SIGNAL_DBM: i32 = -80;

    pub fn from_signal(dbm: i32) -> Self {
        if dbm > Self::POOR_SIGNAL_DBM {
            Self::Online
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Poor => "poor",
            Self::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Live state of one sensor channel on one device.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorState {
    // ---
    pub id: String,
    pub name: String,
    pub unit: String,
    pub min_threshold: f64,
    pub max_threshold: f64,
    pub current_value: f64,
    pub history: RingBuffer<HistoryPoint>,
    pub status: Tier,
}

impl SensorState {
    pub fn from_definition(def: &SensorDefinition, history_capacity: usize) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            unit: def.unit.clone(),
            min_threshold: def.min_threshold,
            max_threshold: def.max_threshold,
            current_value: 0.0,
            history: RingBuffer::new(history_capacity),
            status: Tier::Normal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    // ---
    pub id: String,
    pub operator: String,
    pub ssid: String,
    pub wifi_status: WifiStatus,
    pub wifi_signal: Option<i32>,
    pub heap_memory: Option<u64>,
    pub uptime: Option<u64>,
    /// Identifier the firmware announces in its `STATUS:` field.
    pub reported_id: Option<String>,
    pub last_update: DateTime<Utc>,
    pub sensors: HashMap<String, SensorState>,
}

impl Device {
    // ---
    pub fn snapshot(&self, catalog: &SensorCatalog) -> DeviceSnapshot {
        // ---
        let sensors = catalog
            .iter()
            .filter_map(|def| self.sensors.get(&def.id))
            .cloned()
            .collect();

        DeviceSnapshot {
            id: self.id.clone(),
            operator: self.operator.clone(),
            ssid: self.ssid.clone(),
            wifi_status: self.wifi_status,
            wifi_signal: self.wifi_signal,
            heap_memory: self.heap_memory,
            uptime: self.uptime,
            reported_id: self.reported_id.clone(),
            last_update: self.last_update,
            sensors,
        }
    }
}

/// Device metadata as handed to the persistence sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub operator: String,
    pub ssid: String,
    pub wifi_status: WifiStatus,
    pub last_online: DateTime<Utc>,
}

impl From<&Device> for DeviceRecord {
    fn from(device: &Device) -> Self {
        Self {
            device_id: device.id.clone(),
            operator: device.operator.clone(),
            ssid: device.ssid.clone(),
            wifi_status: device.wifi_status,
            last_online: device.last_update,
        }
    }
}

/// Serializable view of a device with sensors in catalog order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub id: String,
    pub operator: String,
    pub ssid: String,
    pub wifi_status: WifiStatus,
    pub wifi_signal: Option<i32>,
    pub heap_memory: Option<u64>,
    pub uptime: Option<u64>,
    pub reported_id: Option<String>,
    pub last_update: DateTime<Utc>,
    pub sensors: Vec<SensorState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    // ---
    pub id: i64,
    pub device_id: String,
    pub sensor_id: String,
    pub sensor_name: String,
    pub value: f64,
    pub threshold: f64,
    pub threshold_type: &'static str,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameReading {
    pub value: f64,
    pub status: Tier,
}

/// One reading per catalog sensor for a device at a single sampling instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub operator: String,
    pub sensors: BTreeMap<String, FrameReading>,
}

/// Flat record of every accepted reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub operator: String,
    pub sensor_id: String,
    pub sensor_name: String,
    pub value: f64,
    pub unit: String,
    pub status: Tier,
}
