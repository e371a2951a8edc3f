//! Outbound publishing through the broker bridge.
//!
//! The monitor does not hold a broker connection itself. Publishes are
//! POSTed as `{client_id, topic, payload}` to an HTTP bridge that forwards
//! them to the broker; inbound traffic arrives the other way through
//! `POST /bridge/messages`.

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::debug;

use crate::ThresholdPublish;

// ---

#[derive(Debug, Serialize)]
struct BridgePublish<'a> {
    client_id: &'a str,
    topic: &'a str,
    /// Serialized message body as it should appear on the broker.
    payload: String,
}

#[derive(Debug, Clone)]
pub struct BridgePublisher {
    // ---
    client: reqwest::Client,
    url: String,
    client_id: String,
}

impl BridgePublisher {
    // ---
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            client_id: client_id.into(),
        }
    }

    /// Publish a threshold payload to `topic`.
    pub async fn publish(&self, topic: &str, payload: &ThresholdPublish) -> Result<()> {
        // ---
        let body = BridgePublish {
            client_id: &self.client_id,
            topic,
            payload: serde_json::to_string(payload)?,
        };

        debug!(topic, url = %self.url, "Publishing thresholds via bridge");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Bridge request to '{}' failed: {}", self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Bridge rejected publish to '{}': HTTP {}", topic, status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_bridge_body_embeds_payload_as_string() {
        // ---
        let payload = ThresholdPublish {
            device_id: "D1".to_string(),
            thresholds: Vec::new(),
            timestamp: "2025-03-26T18:45:00.000Z".to_string(),
        };
        let body = BridgePublish {
            client_id: "foodtray-monitor-abcd1234",
            topic: "foodtray/D1/thresholds",
            payload: serde_json::to_string(&payload).unwrap(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["topic"], "foodtray/D1/thresholds");
        let inner: ThresholdPublish = serde_json::from_str(json["payload"].as_str().unwrap()).unwrap();
        assert_eq!(inner, payload);
    }

    #[tokio::test]
    async fn test_unreachable_bridge_is_an_error_not_a_panic() {
        // ---
        let publisher = BridgePublisher::new("http://127.0.0.1:9/publish", "test");
        let payload = ThresholdPublish {
            device_id: "D1".to_string(),
            thresholds: Vec::new(),
            timestamp: String::new(),
        };
        assert!(publisher.publish("foodtray/D1/thresholds", &payload).await.is_err());
    }
}
