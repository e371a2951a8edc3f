use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error_response;
use crate::{DeviceSnapshot, Service};

// ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceList {
    current_device_id: Option<String>,
    devices: Vec<DeviceSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectDevice {
    device_id: String,
}

pub fn router() -> Router<Service> {
    // ---
    Router::new()
        .route("/devices", get(list))
        .route("/devices/current", put(select))
        .route("/devices/{id}", get(detail))
}

async fn list(State(service): State<Service>) -> Json<DeviceList> {
    // ---
    let list = service
        .with_monitor(|m| DeviceList {
            current_device_id: m.registry().current_id().map(str::to_string),
            devices: m.registry().snapshots(),
        })
        .await;
    Json(list)
}

async fn detail(State(service): State<Service>, Path(id): Path<String>) -> impl IntoResponse {
    // ---
    match service.with_monitor(|m| m.registry().snapshot(&id)).await {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown device '{}'", id)),
    }
}

async fn select(
    State(service): State<Service>,
    Json(body): Json<SelectDevice>,
) -> impl IntoResponse {
    // ---
    if service.select_device(&body.device_id).await {
        info!(device_id = %body.device_id, "Current device changed");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown device '{}'", body.device_id),
        )
    }
}
