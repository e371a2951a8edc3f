use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error_response;
use crate::{Alert, Service};

// ---

/// Query parameters for `GET /alerts`.
#[derive(Debug, Default, Deserialize)]
struct AlertsQuery {
    device_id: Option<String>,
    #[serde(default)]
    unacknowledged: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertList {
    unacknowledged_count: usize,
    alerts: Vec<Alert>,
}

pub fn router() -> Router<Service> {
    // ---
    Router::new()
        .route("/alerts", get(list))
        .route("/alerts/{id}/ack", post(acknowledge))
}

async fn list(State(service): State<Service>, Query(params): Query<AlertsQuery>) -> Json<AlertList> {
    // ---
    let list = service
        .with_monitor(|m| AlertList {
            unacknowledged_count: m.ledger().count_unacknowledged(),
            alerts: m
                .ledger()
                .list(params.device_id.as_deref(), params.unacknowledged),
        })
        .await;
    Json(list)
}

async fn acknowledge(State(service): State<Service>, Path(id): Path<i64>) -> impl IntoResponse {
    // ---
    match service.acknowledge(id).await {
        Some(alert) => (StatusCode::OK, Json(alert)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown alert {}", id)),
    }
}
