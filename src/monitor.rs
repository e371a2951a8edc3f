//! The monitor context: one object owning all core state.
//!
//! Inbound transport events are decoded and applied one at a time through
//! [`Monitor::handle`]; operator actions go through the `edit_*`/`select_*`
//! methods. Nothing here performs I/O. Every call returns the list of
//! [`Effect`]s (render triggers, outbound publishes, persistence records)
//! for the caller to carry out, so message order is mutation order and a
//! fixed arrival sequence always yields the same frames.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::protocol::{self, InboundMessage, TransportEvent};
use crate::{
    AcceptedReading, AggregatePoint, Alert, AlertLedger, DefaultThresholds,
    DefaultsStore, DeviceRecord, DeviceRegistry, FrameAssembler, FramePage, FrameQuery,
    HistoryStore, LogEntry, SensorCatalog, ThresholdEntry, ThresholdError, ThresholdPublish,
    ThresholdReconciler, ThresholdView,
};

// ---

/// Tunables for a monitor instance.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    // ---
    pub base_topic: String,
    /// Rolling window length per sensor.
    pub max_data_points: usize,
    pub frame_capacity: usize,
    /// `None` keeps incomplete frame buckets indefinitely.
    pub pending_frame_ttl: Option<Duration>,
    pub operator_prefix: String,
    pub default_ssid: String,
    /// `None` keeps the default template in memory only.
    pub defaults_path: Option<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            base_topic: "foodtray".to_string(),
            max_data_points: 20,
            frame_capacity: 1000,
            pending_frame_ttl: None,
            operator_prefix: "Operator ".to_string(),
            default_ssid: "FoodTray_WiFi".to_string(),
            defaults_path: None,
        }
    }
}

/// Work the caller must carry out after a core call.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// A device was registered; device lists must be refreshed.
    DevicesChanged,
    /// State feeding the live views of the current device changed.
    LiveViewChanged { device_id: String },
    Publish { topic: String, payload: ThresholdPublish },
    PersistDevice(DeviceRecord),
    PersistReading(LogEntry),
    PersistAlert(Alert),
    PersistThreshold { device_id: String, entry: ThresholdEntry },
    PersistAcknowledgement { alert_id: i64 },
}

impl Effect {
    /// Effects destined for the persistence sink.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Effect::PersistDevice(_)
                | Effect::PersistReading(_)
                | Effect::PersistAlert(_)
                | Effect::PersistThreshold { .. }
                | Effect::PersistAcknowledgement { .. }
        )
    }
}

#[derive(Debug)]
pub struct Monitor {
    // ---
    catalog: Arc<SensorCatalog>,
    base_topic: String,
    registry: DeviceRegistry,
    assembler: FrameAssembler,
    ledger: AlertLedger,
    history: HistoryStore,
    reconciler: ThresholdReconciler,
}

impl Monitor {
    // ---
    pub fn new(catalog: SensorCatalog, settings: MonitorSettings) -> Self {
        // ---
        let catalog = Arc::new(catalog);
        let store = settings.defaults_path.clone().map(DefaultsStore::new);

        Self {
            registry: DeviceRegistry::new(
                catalog.clone(),
                settings.max_data_points,
                settings.operator_prefix,
                settings.default_ssid,
            ),
            assembler: FrameAssembler::new(catalog.len(), settings.pending_frame_ttl),
            ledger: AlertLedger::new(),
            history: HistoryStore::new(catalog.len(), settings.frame_capacity),
            reconciler: ThresholdReconciler::new(&catalog, store),
            base_topic: settings.base_topic,
            catalog,
        }
    }

    /// Decode and apply one transport event.
    pub fn handle(&mut self, event: &TransportEvent, now: DateTime<Utc>) -> Vec<Effect> {
        // ---
        let message = protocol::decode(&self.base_topic, event);
        self.dispatch(message, now)
    }

    /// Apply one decoded message.
    pub fn dispatch(&mut self, message: InboundMessage, now: DateTime<Utc>) -> Vec<Effect> {
        // ---
        let mut effects = Vec::new();

        match message {
            InboundMessage::Unrecognized { topic, error } => {
                warn!(%topic, "Dropping message: {}", error);
            }
            InboundMessage::SensorReading {
                device_id,
                sensor_id,
                value,
            } => {
                if !self.catalog.contains(&sensor_id) {
                    warn!(%device_id, %sensor_id, "Dropping reading for sensor outside the catalog");
                    return effects;
                }
                self.register(&device_id, now, &mut effects);
                self.ingest_reading(&device_id, &sensor_id, value, now, &mut effects);
            }
            InboundMessage::StatusUpdate { device_id, report } => {
                self.register(&device_id, now, &mut effects);
                if self.registry.apply_status(&device_id, &report, now) {
                    debug!(%device_id, ?report, "Status applied");
                    if let Some(device) = self.registry.get(&device_id) {
                        effects.push(Effect::PersistDevice(DeviceRecord::from(device)));
                    }
                    self.push_live_view(&device_id, &mut effects);
                }
            }
            InboundMessage::ConfigUpdate { device_id, raw } => {
                self.register(&device_id, now, &mut effects);
                self.registry.touch(&device_id, now);
                info!(%device_id, payload = %raw, "Device config received");
                self.push_live_view(&device_id, &mut effects);
            }
            InboundMessage::BridgeData { device_id, raw } => {
                self.register(&device_id, now, &mut effects);
                self.registry.touch(&device_id, now);
                info!(%device_id, payload = %raw, "Bridge data received");
                self.push_live_view(&device_id, &mut effects);
            }
            InboundMessage::ThresholdBroadcast {
                device_id,
                thresholds,
            } => {
                self.register(&device_id, now, &mut effects);
                self.reconciler
                    .apply_device_broadcast(&mut self.registry, &device_id, &thresholds);
                self.registry.touch(&device_id, now);
                self.push_live_view(&device_id, &mut effects);
            }
        }

        effects
    }

    fn register(&mut self, device_id: &str, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        // ---
        if self.registry.ensure_device(device_id, now) {
            effects.push(Effect::DevicesChanged);
            if let Some(device) = self.registry.get(device_id) {
                effects.push(Effect::PersistDevice(DeviceRecord::from(device)));
            }
        }
    }

    fn push_live_view(&self, device_id: &str, effects: &mut Vec<Effect>) {
        if self.registry.current_id() == Some(device_id) {
            effects.push(Effect::LiveViewChanged {
                device_id: device_id.to_string(),
            });
        }
    }

    fn ingest_reading(
        &mut self,
        device_id: &str,
        sensor_id: &str,
        value: f64,
        now: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        // ---
        let Some(accepted) = self.registry.apply_reading(device_id, sensor_id, value, now) else {
            debug!(device_id, sensor_id, "Reading dropped, device or sensor not registered");
            return;
        };

        if accepted.status.raises_alert() {
            let alert = self.ledger.raise(&accepted);
            debug!(
                device_id,
                sensor_id,
                value,
                threshold = alert.threshold,
                "Danger threshold reached"
            );
            if self.ledger.record(alert.clone()) {
                effects.push(Effect::PersistAlert(alert));
            }
        }

        let entry = log_entry(&accepted);
        self.history.record(entry.clone());
        effects.push(Effect::PersistReading(entry));

        if let Some(frame) = self.assembler.accept(&accepted) {
            self.history.push_frame(frame);
        }

        self.push_live_view(device_id, effects);
    }

    /// Select the device feeding live views. Unknown ids are ignored.
    pub fn select_device(&mut self, device_id: &str) -> Vec<Effect> {
        // ---
        if self.registry.set_current_device(device_id) {
            vec![Effect::LiveViewChanged {
                device_id: device_id.to_string(),
            }]
        } else {
            Vec::new()
        }
    }

    /// Operator threshold edit. `device_id` defaults to the current device.
    ///
    /// A successful change is followed by an immediate publish of the
    /// device's merged thresholds.
    pub fn edit_threshold(
        &mut self,
        device_id: Option<&str>,
        sensor_id: &str,
        min: Option<f64>,
        max: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, ThresholdError> {
        // ---
        let device_id = self.resolve_device(device_id)?;
        let changed =
            self.reconciler
                .apply_operator_edit(&mut self.registry, &device_id, sensor_id, min, max)?;

        let mut effects = Vec::new();
        if !changed {
            return Ok(effects);
        }

        if let Some(sensor) = self
            .registry
            .get(&device_id)
            .and_then(|d| d.sensors.get(sensor_id))
        {
            effects.push(Effect::PersistThreshold {
                device_id: device_id.clone(),
                entry: ThresholdEntry {
                    sensor_type: sensor_id.to_string(),
                    min_threshold: sensor.min_threshold,
                    max_threshold: sensor.max_threshold,
                },
            });
        }
        effects.push(self.publish_for(&device_id, now));
        self.push_live_view(&device_id, &mut effects);
        Ok(effects)
    }

    /// Copy the default template onto a device (current one by default).
    pub fn apply_defaults(
        &mut self,
        device_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, ThresholdError> {
        // ---
        let device_id = self.resolve_device(device_id)?;
        let changed = self.reconciler.apply_defaults(&mut self.registry, &device_id)?;
        info!(%device_id, changed, "Applied default thresholds");

        let mut effects = Vec::new();
        if changed > 0 {
            for entry in self.reconciler.merged_entries(&self.registry, &device_id) {
                effects.push(Effect::PersistThreshold {
                    device_id: device_id.clone(),
                    entry,
                });
            }
            effects.push(self.publish_for(&device_id, now));
            self.push_live_view(&device_id, &mut effects);
        }
        Ok(effects)
    }

    fn resolve_device(&self, device_id: Option<&str>) -> Result<String, ThresholdError> {
        match device_id {
            Some(id) => Ok(id.to_string()),
            None => self
                .registry
                .current_id()
                .map(str::to_string)
                .ok_or(ThresholdError::NoDeviceSelected),
        }
    }

    fn publish_for(&self, device_id: &str, now: DateTime<Utc>) -> Effect {
        Effect::Publish {
            topic: protocol::thresholds_topic(&self.base_topic, device_id),
            payload: self.reconciler.payload_for(&self.registry, device_id, now),
        }
    }

    /// Periodic re-publish of the current device's merged thresholds.
    pub fn publish_thresholds(&self, now: DateTime<Utc>) -> Option<Effect> {
        // ---
        let payload = self.reconciler.build_publish(&self.registry, now)?;
        Some(Effect::Publish {
            topic: protocol::thresholds_topic(&self.base_topic, &payload.device_id),
            payload,
        })
    }

    pub fn acknowledge_alert(&mut self, alert_id: i64) -> Vec<Effect> {
        // ---
        if self.ledger.acknowledge(alert_id) {
            vec![Effect::PersistAcknowledgement { alert_id }]
        } else {
            Vec::new()
        }
    }

    pub fn defaults(&self) -> &DefaultThresholds {
        self.reconciler.defaults()
    }

    /// Current template with per-sensor changes applied (invalid sides
    /// ignored). Nothing is installed until [`Monitor::install_defaults`].
    pub fn draft_defaults(&self, changes: &[(String, Option<f64>, Option<f64>)]) -> DefaultThresholds {
        // ---
        let mut defaults = self.reconciler.defaults().clone();
        for (sensor_id, min, max) in changes {
            defaults.update(&self.catalog, sensor_id, *min, *max);
        }
        defaults
    }

    pub fn defaults_store(&self) -> Option<DefaultsStore> {
        self.reconciler.store().cloned()
    }

    pub fn install_defaults(&mut self, defaults: DefaultThresholds) -> &DefaultThresholds {
        self.reconciler.install_defaults(defaults)
    }

    pub fn threshold_view(&self) -> Vec<ThresholdView> {
        self.reconciler.current_view(&self.registry)
    }

    /// Frame table, restricted to the current device unless one is given.
    pub fn frame_page(&self, query: &FrameQuery) -> FramePage {
        // ---
        let mut query = query.clone();
        if query.device_id.is_none() {
            query.device_id = self.registry.current_id().map(str::to_string);
        }
        self.history.frame_page(&query)
    }

    /// Per-minute averages over the last `hours` for one device sensor.
    pub fn historical_series(
        &self,
        device_id: Option<&str>,
        sensor_id: &str,
        hours: i64,
        now: DateTime<Utc>,
    ) -> Vec<AggregatePoint> {
        // ---
        let device_id = device_id.or(self.registry.current_id());
        self.history.aggregate(device_id, sensor_id, hours, now)
    }

    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }
}

fn log_entry(reading: &AcceptedReading) -> LogEntry {
    LogEntry {
        timestamp: reading.timestamp,
        device_id: reading.device_id.clone(),
        operator: reading.operator.clone(),
        sensor_id: reading.sensor_id.clone(),
        sensor_name: reading.sensor_name.clone(),
        value: reading.value,
        unit: reading.unit.clone(),
        status: reading.status,
    }
}
