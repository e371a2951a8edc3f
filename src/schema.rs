//! Database schema management for `foodtray-monitor`.
//!
//! Ensures required tables and indexes exist before the persistence sink is
//! used. Applied once on startup from `main.rs` when `DATABASE_URL` is set
//! (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates `devices`, `sensor_readings`, `alerts` and `sensor_thresholds`.
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per device, refreshed on registration and status messages
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            device_id    TEXT PRIMARY KEY,
            operator     TEXT        NOT NULL,
            ssid         TEXT        NOT NULL,
            wifi_status  TEXT        NOT NULL,
            last_online  TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Every accepted reading
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id           BIGSERIAL PRIMARY KEY,
            device_id    TEXT             NOT NULL REFERENCES devices (device_id),
            sensor_type  TEXT             NOT NULL,
            sensor_name  TEXT             NOT NULL,
            value        DOUBLE PRECISION NOT NULL,
            unit         TEXT             NOT NULL,
            status       TEXT             NOT NULL,
            timestamp    TIMESTAMPTZ      NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Danger alerts keyed by their time-based id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            alert_id        BIGINT PRIMARY KEY,
            device_id       TEXT             NOT NULL REFERENCES devices (device_id),
            sensor_type     TEXT             NOT NULL,
            sensor_name     TEXT             NOT NULL,
            value           DOUBLE PRECISION NOT NULL,
            threshold       DOUBLE PRECISION NOT NULL,
            threshold_type  TEXT             NOT NULL,
            unit            TEXT             NOT NULL,
            timestamp       TIMESTAMPTZ      NOT NULL,
            acknowledged    BOOLEAN          NOT NULL DEFAULT FALSE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Operator-edited thresholds per device and sensor
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_thresholds (
            device_id      TEXT             NOT NULL REFERENCES devices (device_id),
            sensor_type    TEXT             NOT NULL,
            min_threshold  DOUBLE PRECISION NOT NULL,
            max_threshold  DOUBLE PRECISION NOT NULL,
            updated_at     TIMESTAMPTZ      NOT NULL DEFAULT NOW(),
            PRIMARY KEY (device_id, sensor_type)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_device_time
            ON sensor_readings (device_id, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_device_id
            ON alerts (device_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
