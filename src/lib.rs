//! Telemetry aggregation and threshold alerting for multi-sensor gas monitors.
//!
//! Devices publish one broker message per sensor per sampling cycle under
//! `<base>/<deviceId>/...`. This crate turns that stream into live device
//! state, classified readings, alerts, complete multi-sensor frames and a
//! history suitable for charts and tables, and keeps per-device thresholds in
//! sync with the devices.
//!
//! Layout follows the Explicit Module Boundary Pattern (EMBP): this file is
//! the gateway that declares every module and re-exports the public surface;
//! sibling modules import from `crate::` only.
//!
//! - Core (synchronous, no I/O): `catalog`, `classifier`, `ring`, `models`,
//!   `registry`, `frames`, `alerts`, `history`, `thresholds`, `protocol`,
//!   `monitor`.
//! - Service glue (async): `service`, `scheduler`, `transport`, `store`,
//!   `schema`, `routes`, `config`.

mod alerts;
mod catalog;
mod classifier;
mod frames;
mod history;
mod models;
mod monitor;
mod registry;
mod ring;
mod scheduler;
mod service;
mod store;
mod thresholds;
mod transport;

pub mod config;
pub mod protocol;
pub mod routes;
pub mod schema;

pub use alerts::AlertLedger;
pub use catalog::{CatalogVariant, SensorCatalog, SensorDefinition};
pub use classifier::{classify, ThresholdPolicy, Tier, ESCALATION_RATIO};
pub use config::Config;
pub use frames::{bucket_key, FrameAssembler};
pub use history::{AggregatePoint, FramePage, FrameQuery, HistoryStore, DEFAULT_PER_PAGE};
pub use models::{
    Alert, Device, DeviceRecord, DeviceSnapshot, Frame, FrameReading, HistoryPoint, LogEntry,
    SensorState, WifiStatus,
};
pub use monitor::{Effect, Monitor, MonitorSettings};
pub use protocol::{DecodeError, InboundMessage, StatusReport, TransportEvent};
pub use registry::{AcceptedReading, DeviceRegistry};
pub use ring::RingBuffer;
pub use scheduler::RepublishTask;
pub use service::{Collaborators, Service, ViewEvent};
pub use thresholds::{
    Bounds, DefaultThresholds, DefaultsError, DefaultsStore, ThresholdEntry, ThresholdError,
    ThresholdPublish, ThresholdReconciler, ThresholdSource, ThresholdView,
};
pub use transport::BridgePublisher;
