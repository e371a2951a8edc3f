//! Application entry point for the `foodtray-monitor` service.
//!
//! This binary orchestrates the startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Optionally establishing a PostgreSQL pool and creating the schema
//! - Building the monitor core and the async service around it
//! - Starting periodic threshold re-publishing
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! See [`foodtray_monitor::config::load_from_env`] for the full list, plus:
//! - `MONITOR_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `MONITOR_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! Persistence is optional: when the database is unreachable the service
//! logs a warning and runs in memory only.
use std::{env, time::Duration};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use foodtray_monitor::{
    config, routes, schema, BridgePublisher, Collaborators, Config, Monitor, SensorCatalog,
    Service,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let pool = connect_database(&cfg).await;
    let publisher = cfg
        .bridge_url
        .as_ref()
        .map(|url| BridgePublisher::new(url.clone(), cfg.client_id.clone()));

    let catalog = SensorCatalog::for_variant(cfg.sensor_variant);
    tracing::info!(sensors = catalog.len(), policy = ?catalog.policy(), "Sensor catalog loaded");

    let monitor = Monitor::new(catalog, cfg.monitor_settings());
    let service = Service::new(
        monitor,
        Collaborators::new(publisher, pool),
        Duration::from_secs(u64::from(cfg.threshold_publish_secs)),
    );

    if cfg.auto_publish_thresholds {
        service.start_republish().await;
    }

    // Build app from routes gateway (EMBP)
    let app = routes::router(service);

    tracing::info!("Listening on {}", cfg.bind_addr);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Connect and prepare the database, or `None` when persistence is off or
/// unavailable.
async fn connect_database(cfg: &Config) -> Option<PgPool> {
    // ---
    let db_url = cfg.db_url.as_deref()?;
    let masked = config::mask_db_url(db_url);
    tracing::info!("Attempting to connect to database: {}", masked);

    let pool = match PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!("Failed to connect to database '{}': {}; running without persistence", masked, e);
            return None;
        }
    };

    tracing::info!("Successfully connected to database");

    if let Err(e) = schema::create_schema(&pool).await {
        tracing::warn!("Schema setup failed: {}; running without persistence", e);
        return None;
    }
    Some(pool)
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `MONITOR_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, falling back to `MONITOR_LOG_LEVEL`
///
/// Call once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("MONITOR_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("MONITOR_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
