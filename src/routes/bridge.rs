//! Inbound transport endpoint.
//!
//! The broker bridge POSTs each delivered message (or a batch of them) here.
//! Events are applied strictly in body order.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Service, TransportEvent};

// ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeBody {
    Batch(Vec<TransportEvent>),
    Single(TransportEvent),
}

#[derive(Serialize)]
struct Accepted {
    accepted: usize,
}

pub fn router() -> Router<Service> {
    Router::new().route("/bridge/messages", post(handler))
}

async fn handler(State(service): State<Service>, Json(body): Json<BridgeBody>) -> impl IntoResponse {
    // ---
    let events = match body {
        BridgeBody::Batch(events) => events,
        BridgeBody::Single(event) => vec![event],
    };

    let accepted = events.len();
    for event in events {
        debug!(topic = %event.topic, "Bridge message");
        service.ingest(event).await;
    }

    (StatusCode::ACCEPTED, Json(Accepted { accepted }))
}
