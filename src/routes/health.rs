// src/routes/health.rs
//! Health check endpoint.
//!
//! Reports liveness plus a few counters so operators can see at a glance
//! whether devices are reporting and which collaborators are wired up.
//! Follows EMBP: exports a subrouter to the gateway (`mod.rs`).

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::Service;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    devices: usize,
    unacknowledged_alerts: usize,
    publishing: bool,
    persistence: bool,
    republish_running: bool,
}

/// Handle `GET /health`.
///
/// Touches only in-memory state; never blocks on the database or bridge.
async fn health(State(service): State<Service>) -> Json<HealthResponse> {
    // ---
    let (devices, unacknowledged_alerts) = service
        .with_monitor(|m| (m.registry().len(), m.ledger().count_unacknowledged()))
        .await;

    Json(HealthResponse {
        status: "ok",
        devices,
        unacknowledged_alerts,
        publishing: service.publishing_enabled(),
        persistence: service.persistence_enabled(),
        republish_running: service.republish_running().await,
    })
}

pub fn router() -> Router<Service> {
    Router::new().route("/health", get(health))
}
