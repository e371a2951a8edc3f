//! Frame Assembler.
//!
//! Devices publish one message per sensor per sampling cycle. Readings are
//! grouped per device into one-second buckets; when a bucket holds every
//! catalog sensor it is materialized as a [`Frame`] and removed.
//!
//! Buckets that never complete are kept until a pending TTL (if configured)
//! expires them. With no TTL they are retained for the whole session.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{AcceptedReading, Frame, FrameReading};

// ---

type Bucket = BTreeMap<String, FrameReading>;

/// Bucket key: the timestamp floored to whole seconds.
pub fn bucket_key(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp()
}

#[derive(Debug)]
pub struct FrameAssembler {
    // ---
    sensor_count: usize,
    pending_ttl: Option<Duration>,
    pending: HashMap<String, BTreeMap<i64, Bucket>>,
}

impl FrameAssembler {
    // ---
    pub fn new(sensor_count: usize, pending_ttl: Option<Duration>) -> Self {
        Self {
            sensor_count,
            pending_ttl,
            pending: HashMap::new(),
        }
    }

    /// Slot a reading into its bucket; returns the frame it completes, if any.
    ///
    /// The frame is stamped with the triggering reading's timestamp.
    pub fn accept(&mut self, reading: &AcceptedReading) -> Option<Frame> {
        // ---
        let key = bucket_key(reading.timestamp);
        let buckets = self.pending.entry(reading.device_id.clone()).or_default();

        if let Some(ttl) = self.pending_ttl {
            let cutoff = key - ttl.num_seconds();
            let before = buckets.len();
            buckets.retain(|k, _| *k >= cutoff);
            let expired = before - buckets.len();
            if expired > 0 {
                debug!(
                    device_id = %reading.device_id,
                    expired,
                    "Expired incomplete frame buckets"
                );
            }
        }

        let bucket = buckets.entry(key).or_default();
        bucket.insert(
            reading.sensor_id.clone(),
            FrameReading {
                value: reading.value,
                status: reading.status,
            },
        );

        if bucket.len() < self.sensor_count {
            return None;
        }

        let sensors = buckets.remove(&key).unwrap_or_default();
        debug!(device_id = %reading.device_id, bucket = key, "Frame complete");

        Some(Frame {
            timestamp: reading.timestamp,
            device_id: reading.device_id.clone(),
            operator: reading.operator.clone(),
            sensors,
        })
    }

    /// Number of incomplete buckets held for `device_id`.
    pub fn pending_buckets(&self, device_id: &str) -> usize {
        self.pending.get(device_id).map_or(0, BTreeMap::len)
    }

    pub fn total_pending(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }
}
