//! History Store.
//!
//! Holds the flat event log of every accepted reading and the bounded list
//! of assembled frames. The per-sensor rolling window for live charts lives
//! on each [`SensorState`](crate::SensorState) as a [`RingBuffer`].
//!
//! The event log is unbounded. It feeds historical aggregation and acts as
//! the fallback source for the frame table when no frame has been assembled.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use crate::{Frame, FrameReading, LogEntry, RingBuffer};

pub const DEFAULT_PER_PAGE: usize = 10;

// ---

/// One averaged point of a historical series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregatePoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameQuery {
    pub device_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePage {
    pub items: Vec<Frame>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

#[derive(Debug)]
pub struct HistoryStore {
    // ---
    sensor_count: usize,
    log: Vec<LogEntry>,
    frames: RingBuffer<Frame>,
}

impl HistoryStore {
    // ---
    pub fn new(sensor_count: usize, frame_capacity: usize) -> Self {
        Self {
            sensor_count,
            log: Vec::new(),
            frames: RingBuffer::new(frame_capacity),
        }
    }

    pub fn record(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }

    /// Append a frame; the oldest is evicted once the list is full.
    pub fn push_frame(&mut self, frame: Frame) -> Option<Frame> {
        self.frames.push(frame)
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames_newest_first(&self) -> Vec<Frame> {
        self.frames.iter_newest_first().cloned().collect()
    }

    /// Per-minute averages for one sensor over `[now - hours, now]`.
    pub fn aggregate(
        &self,
        device_id: Option<&str>,
        sensor_id: &str,
        hours: i64,
        now: DateTime<Utc>,
    ) -> Vec<AggregatePoint> {
        // ---
        let start = now - Duration::hours(hours);
        let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();

        for entry in self.log.iter().filter(|e| {
            e.timestamp >= start
                && e.timestamp <= now
                && e.sensor_id == sensor_id
                && device_id.map_or(true, |id| e.device_id == id)
        }) {
            let minute = entry
                .timestamp
                .duration_trunc(Duration::minutes(1))
                .unwrap_or(entry.timestamp);
            let slot = buckets.entry(minute).or_insert((0.0, 0));
            slot.0 += entry.value;
            slot.1 += 1;
        }

        buckets
            .into_iter()
            .map(|(timestamp, (sum, samples))| AggregatePoint {
                timestamp,
                value: sum / samples as f64,
                samples,
            })
            .collect()
    }

    /// Rebuild complete frames from the event log, newest first.
    ///
    /// Groups entries by device and one-second bucket and keeps the groups
    /// holding every catalog sensor. Each frame carries the timestamp of the
    /// first entry in its group.
    pub fn reconstruct_frames(&self) -> Vec<Frame> {
        // ---
        let mut groups: BTreeMap<(String, i64), Frame> = BTreeMap::new();

        for entry in &self.log {
            let key = (entry.device_id.clone(), entry.timestamp.timestamp());
            let frame = groups.entry(key).or_insert_with(|| Frame {
                timestamp: entry.timestamp,
                device_id: entry.device_id.clone(),
                operator: entry.operator.clone(),
                sensors: BTreeMap::new(),
            });
            frame.sensors.insert(
                entry.sensor_id.clone(),
                FrameReading {
                    value: entry.value,
                    status: entry.status,
                },
            );
        }

        let mut frames: Vec<Frame> = groups
            .into_values()
            .filter(|f| f.sensors.len() == self.sensor_count)
            .collect();
        frames.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        frames
    }

    /// Filtered, newest-first, paginated view for the data table.
    pub fn frame_page(&self, query: &FrameQuery) -> FramePage {
        // ---
        let source = if self.frames.is_empty() {
            self.reconstruct_frames()
        } else {
            self.frames_newest_first()
        };

        let mut filtered: Vec<Frame> = source
            .into_iter()
            .filter(|f| query.device_id.as_ref().map_or(true, |id| &f.device_id == id))
            .filter(|f| query.start.map_or(true, |s| f.timestamp >= s))
            .filter(|f| query.end.map_or(true, |e| f.timestamp <= e))
            .collect();
        filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
        let total = filtered.len();
        let total_pages = total.div_ceil(per_page);
        let page = query.page.unwrap_or(1).max(1);

        let items = filtered
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        FramePage {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Tier;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, h, m, s).unwrap()
    }

    fn entry(device: &str, sensor: &str, value: f64, ts: DateTime<Utc>) -> LogEntry {
        LogEntry {
            timestamp: ts,
            device_id: device.to_string(),
            operator: format!("Operator {}", device),
            sensor_id: sensor.to_string(),
            sensor_name: sensor.to_uppercase(),
            value,
            unit: "ppm".to_string(),
            status: Tier::Normal,
        }
    }

    fn frame(device: &str, ts: DateTime<Utc>) -> Frame {
        Frame {
            timestamp: ts,
            device_id: device.to_string(),
            operator: format!("Operator {}", device),
            sensors: BTreeMap::new(),
        }
    }

    #[test]
    fn test_frame_list_is_bounded_and_newest_first() {
        // ---
        let mut store = HistoryStore::new(2, 1000);
        let base = at(10, 0, 0);
        for i in 0..1001 {
            store.push_frame(frame("D1", base + Duration::seconds(i)));
        }
        assert_eq!(store.frame_count(), 1000);

        let frames = store.frames_newest_first();
        assert_eq!(frames[0].timestamp, base + Duration::seconds(1000));
        assert_eq!(frames[999].timestamp, base + Duration::seconds(1));
    }

    #[test]
    fn test_aggregate_averages_per_minute() {
        // ---
        let mut store = HistoryStore::new(1, 10);
        store.record(entry("D1", "sensor1", 10.0, at(10, 0, 5)));
        store.record(entry("D1", "sensor1", 20.0, at(10, 0, 50)));
        store.record(entry("D1", "sensor1", 40.0, at(10, 1, 10)));
        store.record(entry("D1", "sensor2", 99.0, at(10, 1, 10)));
        store.record(entry("D2", "sensor1", 99.0, at(10, 1, 10)));
        // Outside the one-hour window.
        store.record(entry("D1", "sensor1", 99.0, at(8, 0, 0)));

        let points = store.aggregate(Some("D1"), "sensor1", 1, at(10, 30, 0));
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp, at(10, 0, 0));
        assert_eq!(points[0].value, 15.0);
        assert_eq!(points[0].samples, 2);
        assert_eq!(points[1].timestamp, at(10, 1, 0));
        assert_eq!(points[1].value, 40.0);
    }

    #[test]
    fn test_aggregate_without_device_filter_merges_devices() {
        // ---
        let mut store = HistoryStore::new(1, 10);
        store.record(entry("D1", "sensor1", 10.0, at(10, 0, 5)));
        store.record(entry("D2", "sensor1", 30.0, at(10, 0, 6)));
        let points = store.aggregate(None, "sensor1", 24, at(10, 5, 0));
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 20.0);
    }

    #[test]
    fn test_reconstruct_keeps_only_complete_groups() {
        // ---
        let mut store = HistoryStore::new(2, 10);
        store.record(entry("D1", "sensor1", 1.0, at(10, 0, 0)));
        store.record(entry("D1", "sensor2", 2.0, at(10, 0, 0)));
        store.record(entry("D1", "sensor1", 3.0, at(10, 0, 1)));
        store.record(entry("D2", "sensor1", 4.0, at(10, 0, 0)));

        let frames = store.reconstruct_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].device_id, "D1");
        assert_eq!(frames[0].sensors["sensor2"].value, 2.0);
    }

    #[test]
    fn test_frame_page_falls_back_to_log() {
        // ---
        let mut store = HistoryStore::new(1, 10);
        store.record(entry("D1", "sensor1", 1.0, at(10, 0, 0)));
        store.record(entry("D1", "sensor1", 2.0, at(10, 0, 1)));

        let page = store.frame_page(&FrameQuery::default());
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].timestamp, at(10, 0, 1));
    }

    #[test]
    fn test_frame_page_filters_and_paginates() {
        // ---
        let mut store = HistoryStore::new(1, 100);
        for i in 0..25 {
            store.push_frame(frame("D1", at(10, 0, 0) + Duration::seconds(i)));
        }
        store.push_frame(frame("D2", at(10, 0, 0)));

        let query = FrameQuery {
            device_id: Some("D1".to_string()),
            page: Some(3),
            ..FrameQuery::default()
        };
        let page = store.frame_page(&query);
        assert_eq!(page.total, 25);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.items[0].timestamp, at(10, 0, 4));

        let ranged = FrameQuery {
            start: Some(at(10, 0, 20)),
            end: Some(at(10, 0, 22)),
            ..FrameQuery::default()
        };
        assert_eq!(store.frame_page(&ranged).total, 3);
    }

    #[test]
    fn test_frame_page_far_past_the_end_is_empty() {
        // ---
        let mut store = HistoryStore::new(1, 100);
        store.push_frame(frame("D1", at(10, 0, 0)));

        for page in [usize::MAX, usize::MAX / 2] {
            let query = FrameQuery {
                page: Some(page),
                per_page: Some(10),
                ..FrameQuery::default()
            };
            let result = store.frame_page(&query);
            assert!(result.items.is_empty());
            assert_eq!(result.total, 1);
            assert_eq!(result.page, page);
        }

        let wide = FrameQuery {
            page: Some(2),
            per_page: Some(usize::MAX),
            ..FrameQuery::default()
        };
        assert!(store.frame_page(&wide).items.is_empty());
    }
}
