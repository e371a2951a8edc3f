//! Configuration loader for the `foodtray-monitor` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::{env, net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Result};
use chrono::Duration;

use crate::{CatalogVariant, MonitorSettings};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional value of any `FromStr` type, `None` when unset.
macro_rules! parse_env_opt {
    ($var_name:expr, $ty:ty) => {
        env::var($var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
    };
}

/// Read a string environment variable with a default.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name).unwrap_or_else(|_| $default.to_string())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// HTTP listen address.
    pub bind_addr: SocketAddr,

    /// Topic namespace devices publish under.
    pub base_topic: String,

    /// Broker bridge endpoint for outbound publishes. `None` disables publishing.
    pub bridge_url: Option<String>,

    /// Client identifier presented to the bridge.
    pub client_id: String,

    /// PostgreSQL connection string. `None` disables persistence.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Which built-in sensor catalog to run with.
    pub sensor_variant: CatalogVariant,

    /// Rolling chart window per sensor.
    pub max_data_points: u32,

    /// Assembled frames retained for the data table.
    pub frame_capacity: u32,

    /// Period of the threshold re-publish task, in seconds.
    pub threshold_publish_secs: u32,

    /// Start the re-publish task at boot.
    pub auto_publish_thresholds: bool,

    /// Expiry for incomplete frame buckets. `None` keeps them forever.
    pub pending_frame_ttl_secs: Option<u32>,

    /// JSON file holding the default threshold template.
    pub defaults_path: PathBuf,

    pub operator_prefix: String,
    pub default_ssid: String,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `MONITOR_BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `MQTT_BASE_TOPIC` – topic namespace (default: `foodtray`)
/// - `MQTT_BRIDGE_URL` – broker bridge publish endpoint
/// - `MQTT_CLIENT_ID` – client id (default: `foodtray-monitor-<random>`)
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `SENSOR_VARIANT` – `dual` (default) or `single`
/// - `MAX_DATA_POINTS` – chart window (default: 20)
/// - `FRAME_CAPACITY` – retained frames (default: 1000)
/// - `THRESHOLD_PUBLISH_SECS` – re-publish period (default: 60)
/// - `AUTO_PUBLISH_THRESHOLDS` – start re-publishing at boot (default: true)
/// - `PENDING_FRAME_TTL_SECS` – incomplete frame expiry (default: none)
/// - `DEFAULT_THRESHOLDS_PATH` – template file (default: `default_thresholds.json`)
/// - `OPERATOR_PREFIX` – operator label prefix (default: `Operator `)
/// - `DEFAULT_SSID` – SSID assumed for new devices (default: `FoodTray_WiFi`)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let bind_addr = parse_env_opt!("MONITOR_BIND_ADDR", SocketAddr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
    let base_topic = env_or!("MQTT_BASE_TOPIC", "foodtray");
    let bridge_url = parse_env_opt!("MQTT_BRIDGE_URL", String);
    let client_id = parse_env_opt!("MQTT_CLIENT_ID", String).unwrap_or_else(random_client_id);
    let db_url = parse_env_opt!("DATABASE_URL", String);
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let sensor_variant =
        parse_env_opt!("SENSOR_VARIANT", CatalogVariant).unwrap_or(CatalogVariant::Dual);
    let max_data_points = parse_env_u32!("MAX_DATA_POINTS", 20);
    let frame_capacity = parse_env_u32!("FRAME_CAPACITY", 1000);
    let threshold_publish_secs = parse_env_u32!("THRESHOLD_PUBLISH_SECS", 60);
    let auto_publish_thresholds = parse_env_opt!("AUTO_PUBLISH_THRESHOLDS", bool).unwrap_or(true);
    let pending_frame_ttl_secs = parse_env_opt!("PENDING_FRAME_TTL_SECS", u32);
    let defaults_path = PathBuf::from(env_or!("DEFAULT_THRESHOLDS_PATH", "default_thresholds.json"));
    let operator_prefix = env_or!("OPERATOR_PREFIX", "Operator ");
    let default_ssid = env_or!("DEFAULT_SSID", "FoodTray_WiFi");

    if threshold_publish_secs == 0 {
        return Err(anyhow!("THRESHOLD_PUBLISH_SECS must be greater than zero"));
    }

    Ok(Config {
        bind_addr,
        base_topic,
        bridge_url,
        client_id,
        db_url,
        db_pool_max,
        sensor_variant,
        max_data_points,
        frame_capacity,
        threshold_publish_secs,
        auto_publish_thresholds,
        pending_frame_ttl_secs,
        defaults_path,
        operator_prefix,
        default_ssid,
    })
}

fn random_client_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("foodtray-monitor-{}", &suffix[..8])
}

/// Replace the password portion of a connection URL with `****`.
pub fn mask_db_url(db_url: &str) -> String {
    // ---
    if let Some(at_pos) = db_url.rfind('@') {
        if let Some(colon_pos) = db_url[..at_pos].rfind(':') {
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

impl Config {
    /// Core settings derived from this configuration.
    pub fn monitor_settings(&self) -> MonitorSettings {
        // ---
        MonitorSettings {
            base_topic: self.base_topic.clone(),
            max_data_points: self.max_data_points as usize,
            frame_capacity: self.frame_capacity as usize,
            pending_frame_ttl: self
                .pending_frame_ttl_secs
                .map(|s| Duration::seconds(i64::from(s))),
            operator_prefix: self.operator_prefix.clone(),
            default_ssid: self.default_ssid.clone(),
            defaults_path: Some(self.defaults_path.clone()),
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_db_url = self
            .db_url
            .as_deref()
            .map(mask_db_url)
            .unwrap_or_else(|| "(disabled)".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  MONITOR_BIND_ADDR       : {}", self.bind_addr);
        tracing::info!("  MQTT_BASE_TOPIC         : {}", self.base_topic);
        tracing::info!(
            "  MQTT_BRIDGE_URL         : {}",
            self.bridge_url.as_deref().unwrap_or("(disabled)")
        );
        tracing::info!("  MQTT_CLIENT_ID          : {}", self.client_id);
        tracing::info!("  DATABASE_URL            : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX             : {}", self.db_pool_max);
        tracing::info!("  SENSOR_VARIANT          : {:?}", self.sensor_variant);
        tracing::info!("  MAX_DATA_POINTS         : {}", self.max_data_points);
        tracing::info!("  FRAME_CAPACITY          : {}", self.frame_capacity);
        tracing::info!("  THRESHOLD_PUBLISH_SECS  : {}", self.threshold_publish_secs);
        tracing::info!("  AUTO_PUBLISH_THRESHOLDS : {}", self.auto_publish_thresholds);
        tracing::info!("  PENDING_FRAME_TTL_SECS  : {:?}", self.pending_frame_ttl_secs);
        tracing::info!("  DEFAULT_THRESHOLDS_PATH : {}", self.defaults_path.display());
    }
}
