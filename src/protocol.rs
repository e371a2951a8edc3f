//! Transport boundary: decoding of inbound broker messages.
//!
//! Topics have the shape `<base>/<deviceId>/<category>[/<subcategory>]`.
//! Each message is decoded into one [`InboundMessage`] variant before it
//! reaches the core; anything that does not fit becomes `Unrecognized` and
//! is dropped by the caller after logging.

use serde::Deserialize;
use thiserror::Error;

use crate::ThresholdEntry;

// ---

/// One message as delivered by the transport collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportEvent {
    pub topic: String,
    pub payload: String,
}

impl TransportEvent {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("topic `{0}` does not match <base>/<device>/<category>")]
    UnknownTopic(String),
    #[error("unsupported category `{category}` for device {device_id}")]
    UnknownCategory { device_id: String, category: String },
    #[error("non-numeric reading `{payload}` for {device_id}/{sensor_id}")]
    InvalidReading {
        device_id: String,
        sensor_id: String,
        payload: String,
    },
    #[error("malformed threshold payload from {device_id}: {source}")]
    InvalidThresholds {
        device_id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parsed `KEY:VALUE,...` status line. Unparsable values are left `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub reported_id: Option<String>,
    pub wifi_signal: Option<i32>,
    pub heap_memory: Option<u64>,
    pub uptime: Option<u64>,
}

impl StatusReport {
    /// Parse e.g. `STATUS:FT123ABCDEF,WIFI:-45,HEAP:200000,UPTIME:123456`.
    pub fn parse(line: &str) -> Self {
        // ---
        let mut report = Self::default();
        for (key, value) in line
            .split(',')
            .filter_map(|part| part.split_once(':'))
            .map(|(k, v)| (k.trim(), v.trim()))
        {
            match key {
                "STATUS" => report.reported_id = Some(value.to_string()),
                "WIFI" => report.wifi_signal = value.parse().ok(),
                "HEAP" => report.heap_memory = value.parse().ok(),
                "UPTIME" => report.uptime = value.parse().ok(),
                _ => {}
            }
        }
        report
    }
}

#[derive(Debug, Deserialize)]
struct ThresholdBroadcastBody {
    thresholds: Vec<ThresholdEntry>,
}

#[derive(Debug)]
pub enum InboundMessage {
    SensorReading {
        device_id: String,
        sensor_id: String,
        value: f64,
    },
    StatusUpdate {
        device_id: String,
        report: StatusReport,
    },
    ConfigUpdate {
        device_id: String,
        raw: String,
    },
    BridgeData {
        device_id: String,
        raw: String,
    },
    ThresholdBroadcast {
        device_id: String,
        thresholds: Vec<ThresholdEntry>,
    },
    Unrecognized {
        topic: String,
        error: DecodeError,
    },
}

impl InboundMessage {
    // ---
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::SensorReading { device_id, .. }
            | Self::StatusUpdate { device_id, .. }
            | Self::ConfigUpdate { device_id, .. }
            | Self::BridgeData { device_id, .. }
            | Self::ThresholdBroadcast { device_id, .. } => Some(device_id),
            Self::Unrecognized { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SensorReading { .. } => "sensor_reading",
            Self::StatusUpdate { .. } => "status",
            Self::ConfigUpdate { .. } => "config",
            Self::BridgeData { .. } => "bridge",
            Self::ThresholdBroadcast { .. } => "thresholds",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// `sensor<N>` with a non-empty run of digits.
fn is_sensor_channel(segment: &str) -> bool {
    segment
        .strip_prefix("sensor")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Decode one transport event against `base_topic`.
pub fn decode(base_topic: &str, event: &TransportEvent) -> InboundMessage {
    // ---
    match try_decode(base_topic, event) {
        Ok(message) => message,
        Err(error) => InboundMessage::Unrecognized {
            topic: event.topic.clone(),
            error,
        },
    }
}

fn try_decode(base_topic: &str, event: &TransportEvent) -> Result<InboundMessage, DecodeError> {
    // ---
    let segments: Vec<&str> = event.topic.split('/').collect();
    if segments.len() < 3 || segments[0] != base_topic || segments[1].is_empty() {
        return Err(DecodeError::UnknownTopic(event.topic.clone()));
    }

    let device_id = segments[1].to_string();
    let category = segments[2];
    let subcategory = segments.get(3).copied();

    match (category, subcategory) {
        ("sensors", Some(sensor_id)) if is_sensor_channel(sensor_id) => {
            let value = event
                .payload
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| DecodeError::InvalidReading {
                    device_id: device_id.clone(),
                    sensor_id: sensor_id.to_string(),
                    payload: event.payload.clone(),
                })?;
            Ok(InboundMessage::SensorReading {
                device_id,
                sensor_id: sensor_id.to_string(),
                value,
            })
        }
        ("status", _) => Ok(InboundMessage::StatusUpdate {
            device_id,
            report: StatusReport::parse(&event.payload),
        }),
        ("config", _) => Ok(InboundMessage::ConfigUpdate {
            device_id,
            raw: event.payload.clone(),
        }),
        ("bridge", _) => Ok(InboundMessage::BridgeData {
            device_id,
            raw: event.payload.clone(),
        }),
        ("thresholds", _) => {
            let body: ThresholdBroadcastBody =
                serde_json::from_str(&event.payload).map_err(|source| {
                    DecodeError::InvalidThresholds {
                        device_id: device_id.clone(),
                        source,
                    }
                })?;
            Ok(InboundMessage::ThresholdBroadcast {
                device_id,
                thresholds: body.thresholds,
            })
        }
        _ => Err(DecodeError::UnknownCategory {
            device_id,
            category: category.to_string(),
        }),
    }
}

/// Per-device topic that carries threshold updates in both directions.
pub fn thresholds_topic(base_topic: &str, device_id: &str) -> String {
    format!("{}/{}/thresholds", base_topic, device_id)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn decode_ft(topic: &str, payload: &str) -> InboundMessage {
        decode("foodtray", &TransportEvent::new(topic, payload))
    }

    #[test]
    fn test_sensor_reading() {
        // ---
        match decode_ft("foodtray/D1/sensors/sensor3", " 12.5 ") {
            InboundMessage::SensorReading {
                device_id,
                sensor_id,
                value,
            } => {
                assert_eq!(device_id, "D1");
                assert_eq!(sensor_id, "sensor3");
                assert_eq!(value, 12.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_reading_is_unrecognized() {
        // ---
        for payload in ["abc", "", "NaN", "inf"] {
            let msg = decode_ft("foodtray/D1/sensors/sensor1", payload);
            assert!(
                matches!(
                    msg,
                    InboundMessage::Unrecognized {
                        error: DecodeError::InvalidReading { .. },
                        ..
                    }
                ),
                "payload {:?}",
                payload
            );
        }
    }

    #[test]
    fn test_bad_sensor_channel_names() {
        // ---
        assert!(matches!(
            decode_ft("foodtray/D1/sensors/temp", "1"),
            InboundMessage::Unrecognized { .. }
        ));
        assert!(matches!(
            decode_ft("foodtray/D1/sensors/sensor", "1"),
            InboundMessage::Unrecognized { .. }
        ));
        assert!(matches!(
            decode_ft("foodtray/D1/sensors", "1"),
            InboundMessage::Unrecognized { .. }
        ));
    }

    #[test]
    fn test_wrong_namespace_or_shape() {
        // ---
        assert!(matches!(
            decode_ft("other/D1/status", "WIFI:-40"),
            InboundMessage::Unrecognized {
                error: DecodeError::UnknownTopic(_),
                ..
            }
        ));
        assert!(matches!(
            decode_ft("foodtray/D1", "x"),
            InboundMessage::Unrecognized { .. }
        ));
        assert!(matches!(
            decode_ft("foodtray/D1/firmware", "x"),
            InboundMessage::Unrecognized {
                error: DecodeError::UnknownCategory { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_status_line_parsing() {
        // ---
        let report = StatusReport::parse("STATUS:FT123ABCDEF,WIFI:-45,HEAP:200000,UPTIME:123456,FOO:1");
        assert_eq!(report.reported_id.as_deref(), Some("FT123ABCDEF"));
        assert_eq!(report.wifi_signal, Some(-45));
        assert_eq!(report.heap_memory, Some(200_000));
        assert_eq!(report.uptime, Some(123_456));

        let partial = StatusReport::parse("WIFI:weak,HEAP:12");
        assert_eq!(partial.wifi_signal, None);
        assert_eq!(partial.heap_memory, Some(12));
    }

    #[test]
    fn test_opaque_categories() {
        // ---
        assert!(matches!(
            decode_ft("foodtray/D1/config", "{\"interval\":5}"),
            InboundMessage::ConfigUpdate { .. }
        ));
        let msg = decode_ft("foodtray/D1/bridge", "hello");
        assert_eq!(msg.kind(), "bridge");
        assert_eq!(msg.device_id(), Some("D1"));
    }

    #[test]
    fn test_threshold_broadcast() {
        // ---
        let payload = r#"{"thresholds":[{"sensor_type":"sensor1","min_threshold":5,"max_threshold":30.5}]}"#;
        match decode_ft("foodtray/D1/thresholds", payload) {
            InboundMessage::ThresholdBroadcast { thresholds, .. } => {
                assert_eq!(thresholds.len(), 1);
                assert_eq!(thresholds[0].sensor_type, "sensor1");
                assert_eq!(thresholds[0].min_threshold, 5.0);
                assert_eq!(thresholds[0].max_threshold, 30.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_threshold_json_is_caught() {
        // ---
        for payload in ["{not json", r#"{"foo":[]}"#] {
            assert!(matches!(
                decode_ft("foodtray/D1/thresholds", payload),
                InboundMessage::Unrecognized {
                    error: DecodeError::InvalidThresholds { .. },
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_thresholds_topic() {
        // ---
        assert_eq!(thresholds_topic("foodtray", "D1"), "foodtray/D1/thresholds");
    }
}
