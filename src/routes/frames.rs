//! Frame table and historical chart endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use super::error_response;
use crate::{FramePage, FrameQuery, Service};

// ---

const MAX_HISTORY_HOURS: i64 = 24 * 7;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    hours: Option<i64>,
}

pub fn router() -> Router<Service> {
    // ---
    Router::new()
        .route("/frames", get(frames))
        .route("/history/{device_id}/{sensor_id}", get(history))
}

async fn frames(State(service): State<Service>, Query(query): Query<FrameQuery>) -> Json<FramePage> {
    // ---
    let page = service.with_monitor(|m| m.frame_page(&query)).await;
    Json(page)
}

async fn history(
    State(service): State<Service>,
    Path((device_id, sensor_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    // ---
    let hours = query.hours.unwrap_or(1);
    if !(1..=MAX_HISTORY_HOURS).contains(&hours) {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("hours must be between 1 and {}", MAX_HISTORY_HOURS),
        );
    }

    let series = service
        .with_monitor(|m| {
            if !m.catalog().contains(&sensor_id) {
                return None;
            }
            Some(m.historical_series(Some(device_id.as_str()), &sensor_id, hours, Utc::now()))
        })
        .await;

    match series {
        Some(points) => (StatusCode::OK, Json(points)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown sensor '{}'", sensor_id)),
    }
}
