//! Best-effort Postgres persistence for devices, readings, alerts and
//! thresholds. Callers log failures and carry on; the in-memory core never
//! depends on these writes.

use sqlx::PgPool;

use crate::{Alert, DeviceRecord, LogEntry, ThresholdEntry};

// ---

pub async fn upsert_device(pool: &PgPool, device: &DeviceRecord) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO devices (device_id, operator, ssid, wifi_status, last_online)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (device_id) DO UPDATE SET
            operator    = EXCLUDED.operator,
            ssid        = EXCLUDED.ssid,
            wifi_status = EXCLUDED.wifi_status,
            last_online = EXCLUDED.last_online
        "#,
    )
    .bind(&device.device_id)
    .bind(&device.operator)
    .bind(&device.ssid)
    .bind(device.wifi_status.as_str())
    .bind(device.last_online)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_reading(pool: &PgPool, entry: &LogEntry) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO sensor_readings (
            device_id, sensor_type, sensor_name, value, unit, status, timestamp
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&entry.device_id)
    .bind(&entry.sensor_id)
    .bind(&entry.sensor_name)
    .bind(entry.value)
    .bind(&entry.unit)
    .bind(entry.status.as_str())
    .bind(entry.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_alert(pool: &PgPool, alert: &Alert) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO alerts (
            alert_id, device_id, sensor_type, sensor_name, value,
            threshold, threshold_type, unit, timestamp, acknowledged
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (alert_id) DO NOTHING
        "#,
    )
    .bind(alert.id)
    .bind(&alert.device_id)
    .bind(&alert.sensor_id)
    .bind(&alert.sensor_name)
    .bind(alert.value)
    .bind(alert.threshold)
    .bind(alert.threshold_type)
    .bind(&alert.unit)
    .bind(alert.timestamp)
    .bind(alert.acknowledged)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn acknowledge_alert(pool: &PgPool, alert_id: i64) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query("UPDATE alerts SET acknowledged = TRUE WHERE alert_id = $1")
        .bind(alert_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn upsert_threshold(
    pool: &PgPool,
    device_id: &str,
    entry: &ThresholdEntry,
) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO sensor_thresholds (device_id, sensor_type, min_threshold, max_threshold)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (device_id, sensor_type) DO UPDATE SET
            min_threshold = EXCLUDED.min_threshold,
            max_threshold = EXCLUDED.max_threshold,
            updated_at    = NOW()
        "#,
    )
    .bind(device_id)
    .bind(&entry.sensor_type)
    .bind(entry.min_threshold)
    .bind(entry.max_threshold)
    .execute(pool)
    .await?;

    Ok(())
}
