//! Threshold editing, default template management and publisher control.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::error_response;
use crate::{Service, ThresholdError};

// ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThresholdEdit {
    device_id: Option<String>,
    sensor_id: String,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultsEdit {
    sensor_id: String,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyDefaults {
    device_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublisherState {
    running: bool,
    period_secs: u64,
}

pub fn router() -> Router<Service> {
    // ---
    Router::new()
        .route("/thresholds", get(view).put(edit))
        .route("/defaults", get(defaults).put(update_defaults))
        .route("/defaults/apply", post(apply_defaults))
        .route("/defaults/reload", post(reload_defaults))
        .route("/publisher/start", post(start_publisher))
        .route("/publisher/stop", post(stop_publisher))
}

fn threshold_error(e: ThresholdError) -> Response {
    let status = match e {
        ThresholdError::InvalidMin(_) | ThresholdError::InvalidMax(_) => StatusCode::BAD_REQUEST,
        ThresholdError::NoDeviceSelected => StatusCode::CONFLICT,
        ThresholdError::UnknownDevice(_) | ThresholdError::UnknownSensor(_) => StatusCode::NOT_FOUND,
    };
    error_response(status, e.to_string())
}

async fn view(State(service): State<Service>) -> impl IntoResponse {
    Json(service.with_monitor(|m| m.threshold_view()).await)
}

async fn edit(State(service): State<Service>, Json(body): Json<ThresholdEdit>) -> Response {
    // ---
    match service
        .edit_threshold(body.device_id.as_deref(), &body.sensor_id, body.min, body.max)
        .await
    {
        Ok(()) => {
            info!(sensor_id = %body.sensor_id, min = ?body.min, max = ?body.max, "Threshold edited");
            Json(service.with_monitor(|m| m.threshold_view()).await).into_response()
        }
        Err(e) => threshold_error(e),
    }
}

async fn defaults(State(service): State<Service>) -> impl IntoResponse {
    Json(service.with_monitor(|m| m.defaults().clone()).await)
}

async fn update_defaults(
    State(service): State<Service>,
    Json(body): Json<Vec<DefaultsEdit>>,
) -> Response {
    // ---
    let changes: Vec<(String, Option<f64>, Option<f64>)> = body
        .into_iter()
        .map(|e| (e.sensor_id, e.min, e.max))
        .collect();

    match service.update_defaults(&changes).await {
        Ok(defaults) => Json(defaults).into_response(),
        Err(e) => {
            error!("Failed to save default thresholds: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn reload_defaults(State(service): State<Service>) -> Response {
    // ---
    match service.reload_defaults().await {
        Ok(defaults) => Json(defaults).into_response(),
        Err(e) => {
            error!("Failed to reload default thresholds: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// The body is optional; an empty one targets the current device.
async fn apply_defaults(State(service): State<Service>, body: Bytes) -> Response {
    // ---
    let body: ApplyDefaults = if body.is_empty() {
        ApplyDefaults::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    };
    match service.apply_defaults(body.device_id.as_deref()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => threshold_error(e),
    }
}

async fn start_publisher(State(service): State<Service>) -> Json<PublisherState> {
    // ---
    service.start_republish().await;
    Json(PublisherState {
        running: service.republish_running().await,
        period_secs: service.republish_period().as_secs(),
    })
}

async fn stop_publisher(State(service): State<Service>) -> Json<PublisherState> {
    // ---
    service.stop_republish().await;
    Json(PublisherState {
        running: false,
        period_secs: service.republish_period().as_secs(),
    })
}
