//! HTTP gateway (EMBP): each sibling module exports a subrouter over the
//! shared [`Service`] state and this file merges them.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json, Router};
use serde::Serialize;

use crate::Service;

mod alerts;
mod bridge;
mod devices;
mod frames;
mod health;
mod thresholds;

// ---

pub fn router(service: Service) -> Router {
    // ---
    Router::new()
        .merge(bridge::router())
        .merge(devices::router())
        .merge(alerts::router())
        .merge(frames::router())
        .merge(thresholds::router())
        .merge(health::router())
        .with_state(service)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// JSON error response shared by all handlers.
fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}
