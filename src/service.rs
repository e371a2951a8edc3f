//! Async shell around [`Monitor`].
//!
//! The core is synchronous and returns [`Effect`]s. This module owns the
//! shared `Monitor`, serializes every mutation through one lock, and carries
//! out the effects: persistence effects are queued to an ordered writer
//! while the lock is held, then outbound publishes go to the bridge and
//! render triggers to a broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, warn};

use crate::{
    store, Alert, BridgePublisher, DefaultThresholds, DefaultsError, Effect, Monitor,
    RepublishTask, ThresholdError, TransportEvent,
};

// ---

/// Render triggers for subscribed views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ViewEvent {
    DevicesChanged,
    LiveViewChanged { device_id: String },
}

/// External collaborators that effects are dispatched to.
///
/// Either side may be absent; effects that need a missing collaborator are
/// skipped. Persistence effects go through one writer task so database
/// writes happen in the order the core produced them.
#[derive(Debug, Clone)]
pub struct Collaborators {
    // ---
    pub publisher: Option<BridgePublisher>,
    pub persistence: Option<mpsc::UnboundedSender<Effect>>,
    pub events: broadcast::Sender<ViewEvent>,
}

impl Collaborators {
    // ---
    /// Must be called inside a tokio runtime when `pool` is set.
    pub fn new(publisher: Option<BridgePublisher>, pool: Option<PgPool>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            publisher,
            persistence: pool.map(spawn_persistence_writer),
            events,
        }
    }

    /// Queue persistence effects for the writer and return the rest.
    ///
    /// Call while the monitor lock is still held so queue order matches
    /// mutation order.
    fn enqueue_persistence(&self, effects: Vec<Effect>) -> Vec<Effect> {
        // ---
        let (persist, rest): (Vec<Effect>, Vec<Effect>) =
            effects.into_iter().partition(Effect::is_persistence);

        if let Some(tx) = &self.persistence {
            for effect in persist {
                if tx.send(effect).is_err() {
                    warn!("Persistence writer stopped, dropping writes");
                    break;
                }
            }
        }
        rest
    }

    /// Carry out publish and view effects in order. Failures are logged,
    /// never returned. Persistence effects are queued.
    pub async fn execute(&self, effects: Vec<Effect>) {
        // ---
        for effect in self.enqueue_persistence(effects) {
            match effect {
                Effect::DevicesChanged => {
                    let _ = self.events.send(ViewEvent::DevicesChanged);
                }
                Effect::LiveViewChanged { device_id } => {
                    let _ = self.events.send(ViewEvent::LiveViewChanged { device_id });
                }
                Effect::Publish { topic, payload } => match &self.publisher {
                    Some(publisher) => {
                        if let Err(e) = publisher.publish(&topic, &payload).await {
                            warn!(%topic, "Threshold publish failed: {}", e);
                        }
                    }
                    None => debug!(%topic, "No bridge configured, publish skipped"),
                },
                _ => {}
            }
        }
    }
}

fn spawn_persistence_writer(pool: PgPool) -> mpsc::UnboundedSender<Effect> {
    // ---
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(effect) = rx.recv().await {
            persist(&pool, effect).await;
        }
        debug!("Persistence writer stopped");
    });
    tx
}

async fn persist(pool: &PgPool, effect: Effect) {
    // ---
    match effect {
        Effect::PersistDevice(record) => {
            if let Err(e) = store::upsert_device(pool, &record).await {
                warn!(device_id = %record.device_id, "Failed to persist device: {}", e);
            }
        }
        Effect::PersistReading(entry) => {
            if let Err(e) = store::insert_reading(pool, &entry).await {
                warn!(device_id = %entry.device_id, sensor_id = %entry.sensor_id,
                    "Failed to persist reading: {}", e);
            }
        }
        Effect::PersistAlert(alert) => {
            if let Err(e) = store::insert_alert(pool, &alert).await {
                warn!(alert_id = alert.id, "Failed to persist alert: {}", e);
            }
        }
        Effect::PersistThreshold { device_id, entry } => {
            if let Err(e) = store::upsert_threshold(pool, &device_id, &entry).await {
                warn!(%device_id, sensor_id = %entry.sensor_type,
                    "Failed to persist threshold: {}", e);
            }
        }
        Effect::PersistAcknowledgement { alert_id } => {
            if let Err(e) = store::acknowledge_alert(pool, alert_id).await {
                warn!(alert_id, "Failed to persist acknowledgement: {}", e);
            }
        }
        other => debug!(?other, "Not a persistence effect"),
    }
}

/// Shared application state handed to every route.
#[derive(Debug, Clone)]
pub struct Service {
    // ---
    monitor: Arc<Mutex<Monitor>>,
    collaborators: Collaborators,
    republish: Arc<Mutex<RepublishTask>>,
    /// Serializes template writes so drafts never overwrite each other.
    defaults_writer: Arc<Mutex<()>>,
    period: Duration,
}

impl Service {
    // ---
    pub fn new(monitor: Monitor, collaborators: Collaborators, republish_period: Duration) -> Self {
        Self {
            monitor: Arc::new(Mutex::new(monitor)),
            collaborators,
            republish: Arc::new(Mutex::new(RepublishTask::new())),
            defaults_writer: Arc::new(Mutex::new(())),
            period: republish_period,
        }
    }

    /// Run a mutation under the lock, queue its persistence effects before
    /// releasing it, then carry out the remaining effects.
    async fn mutate<T>(&self, f: impl FnOnce(&mut Monitor) -> (Vec<Effect>, T)) -> T {
        // ---
        let (rest, out) = {
            let mut monitor = self.monitor.lock().await;
            let (effects, out) = f(&mut monitor);
            (self.collaborators.enqueue_persistence(effects), out)
        };
        self.collaborators.execute(rest).await;
        out
    }

    /// Apply one inbound transport event and dispatch its effects.
    pub async fn ingest(&self, event: TransportEvent) {
        // ---
        self.mutate(|m| (m.handle(&event, Utc::now()), ())).await
    }

    /// Run a read-only closure against the monitor.
    pub async fn with_monitor<R>(&self, f: impl FnOnce(&Monitor) -> R) -> R {
        let monitor = self.monitor.lock().await;
        f(&monitor)
    }

    /// Select the live device. Returns false for unknown ids.
    pub async fn select_device(&self, device_id: &str) -> bool {
        // ---
        self.mutate(|m| {
            let effects = m.select_device(device_id);
            let changed = !effects.is_empty();
            (effects, changed)
        })
        .await
    }

    pub async fn edit_threshold(
        &self,
        device_id: Option<&str>,
        sensor_id: &str,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<(), ThresholdError> {
        // ---
        self.mutate(|m| match m.edit_threshold(device_id, sensor_id, min, max, Utc::now()) {
            Ok(effects) => (effects, Ok(())),
            Err(e) => (Vec::new(), Err(e)),
        })
        .await
    }

    pub async fn apply_defaults(&self, device_id: Option<&str>) -> Result<(), ThresholdError> {
        // ---
        self.mutate(|m| match m.apply_defaults(device_id, Utc::now()) {
            Ok(effects) => (effects, Ok(())),
            Err(e) => (Vec::new(), Err(e)),
        })
        .await
    }

    /// Apply template changes, write them to the store and install them.
    /// A failed write leaves the in-memory template untouched.
    pub async fn update_defaults(
        &self,
        changes: &[(String, Option<f64>, Option<f64>)],
    ) -> Result<DefaultThresholds, DefaultsError> {
        // ---
        let _writer = self.defaults_writer.lock().await;
        let (draft, store) = {
            let monitor = self.monitor.lock().await;
            (monitor.draft_defaults(changes), monitor.defaults_store())
        };

        if let Some(store) = store {
            let pending = draft.clone();
            tokio::task::spawn_blocking(move || store.save(&pending)).await??;
        }

        self.monitor.lock().await.install_defaults(draft.clone());
        Ok(draft)
    }

    /// Re-read the template from the store, reseeding from the catalog when
    /// the file is missing or corrupt.
    pub async fn reload_defaults(&self) -> Result<DefaultThresholds, DefaultsError> {
        // ---
        let _writer = self.defaults_writer.lock().await;
        let (store, catalog) = {
            let monitor = self.monitor.lock().await;
            (monitor.defaults_store(), monitor.catalog().clone())
        };

        let defaults = match store {
            Some(store) => tokio::task::spawn_blocking(move || store.load(&catalog)).await?,
            None => DefaultThresholds::from_catalog(&catalog),
        };

        self.monitor.lock().await.install_defaults(defaults.clone());
        Ok(defaults)
    }

    /// Acknowledge an alert. `None` if no such alert exists.
    pub async fn acknowledge(&self, alert_id: i64) -> Option<Alert> {
        // ---
        self.mutate(|m| {
            let effects = m.acknowledge_alert(alert_id);
            (effects, m.ledger().get(alert_id).cloned())
        })
        .await
    }

    pub async fn start_republish(&self) {
        // ---
        let monitor = self.monitor.clone();
        let collaborators = self.collaborators.clone();
        self.republish.lock().await.start(self.period, move || {
            let monitor = monitor.clone();
            let collaborators = collaborators.clone();
            async move {
                publish_current(&monitor, &collaborators).await;
            }
        });
    }

    pub async fn stop_republish(&self) -> bool {
        self.republish.lock().await.stop()
    }

    pub async fn republish_running(&self) -> bool {
        self.republish.lock().await.is_running()
    }

    pub fn republish_period(&self) -> Duration {
        self.period
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.collaborators.events.subscribe()
    }

    pub fn publishing_enabled(&self) -> bool {
        self.collaborators.publisher.is_some()
    }

    pub fn persistence_enabled(&self) -> bool {
        self.collaborators.persistence.is_some()
    }
}

/// Publish the current device's thresholds once. Returns false when no
/// device is selected.
async fn publish_current(monitor: &Mutex<Monitor>, collaborators: &Collaborators) -> bool {
    // ---
    let effect = monitor.lock().await.publish_thresholds(Utc::now());
    match effect {
        Some(effect) => {
            collaborators.execute(vec![effect]).await;
            true
        }
        None => {
            debug!("No current device, threshold publish skipped");
            false
        }
    }
}
