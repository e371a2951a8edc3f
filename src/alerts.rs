//! Alert Ledger.
//!
//! Most-recent-first collection of danger alerts, de-duplicated by id.
//! The ledger is not capped; it grows for the lifetime of the session.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{AcceptedReading, Alert};

// ---

#[derive(Debug, Default)]
pub struct AlertLedger {
    // ---
    alerts: VecDeque<Alert>,
    ids: HashSet<i64>,
    unacknowledged: usize,
    last_id: i64,
}

impl AlertLedger {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Time-based id in epoch milliseconds, bumped past the previous id so
    /// alerts raised within the same millisecond stay distinct.
    pub fn next_id(&mut self, now: DateTime<Utc>) -> i64 {
        // ---
        let id = now.timestamp_millis().max(self.last_id + 1);
        self.last_id = id;
        id
    }

    /// Build the alert for a danger-tier reading.
    pub fn raise(&mut self, reading: &AcceptedReading) -> Alert {
        // ---
        Alert {
            id: self.next_id(reading.timestamp),
            device_id: reading.device_id.clone(),
            sensor_id: reading.sensor_id.clone(),
            sensor_name: reading.sensor_name.clone(),
            value: reading.value,
            threshold: reading.max_threshold,
            threshold_type: "max",
            unit: reading.unit.clone(),
            timestamp: reading.timestamp,
            acknowledged: false,
        }
    }

    /// Prepend `alert`. Returns `false` if an alert with the same id exists.
    pub fn record(&mut self, alert: Alert) -> bool {
        // ---
        if !self.ids.insert(alert.id) {
            warn!(alert_id = alert.id, "Duplicate alert id ignored");
            return false;
        }
        self.last_id = self.last_id.max(alert.id);
        if !alert.acknowledged {
            self.unacknowledged += 1;
        }
        self.alerts.push_front(alert);
        true
    }

    pub fn count_unacknowledged(&self) -> usize {
        self.unacknowledged
    }

    /// Mark `alert_id` acknowledged. Returns `true` only on a state change.
    pub fn acknowledge(&mut self, alert_id: i64) -> bool {
        // ---
        if !self.ids.contains(&alert_id) {
            debug!(alert_id, "Acknowledge for unknown alert");
            return false;
        }
        match self.alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) if !alert.acknowledged => {
                alert.acknowledged = true;
                self.unacknowledged -= 1;
                true
            }
            Some(_) => false,
            None => {
                debug!(alert_id, "Acknowledge for unknown alert");
                false
            }
        }
    }

    pub fn get(&self, alert_id: i64) -> Option<&Alert> {
        if !self.ids.contains(&alert_id) {
            return None;
        }
        self.alerts.iter().find(|a| a.id == alert_id)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Newest first, optionally restricted to one device and/or open alerts.
    pub fn list(&self, device_id: Option<&str>, unacknowledged_only: bool) -> Vec<Alert> {
        // ---
        self.alerts
            .iter()
            .filter(|a| device_id.map_or(true, |id| a.device_id == id))
            .filter(|a| !unacknowledged_only || !a.acknowledged)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::Tier;
    use chrono::TimeZone;

    fn danger(device: &str, value: f64) -> AcceptedReading {
        AcceptedReading {
            device_id: device.to_string(),
            operator: format!("Operator {}", device),
            sensor_id: "sensor1".to_string(),
            sensor_name: "NH3 (Amonia)".to_string(),
            unit: "ppm".to_string(),
            value,
            min_threshold: 10.0,
            max_threshold: 25.0,
            status: Tier::Danger,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap(),
        }
    }

    #[test]
    fn test_raise_copies_reading() {
        // ---
        let mut ledger = AlertLedger::new();
        let alert = ledger.raise(&danger("D1", 30.0));
        assert_eq!(alert.threshold, 25.0);
        assert_eq!(alert.threshold_type, "max");
        assert_eq!(alert.value, 30.0);
        assert!(!alert.acknowledged);
    }

    #[test]
    fn test_ids_are_unique_within_same_millisecond() {
        // ---
        let mut ledger = AlertLedger::new();
        let a = ledger.raise(&danger("D1", 30.0));
        let b = ledger.raise(&danger("D1", 31.0));
        assert_ne!(a.id, b.id);
        assert!(ledger.record(a));
        assert!(ledger.record(b));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_record_is_newest_first_and_deduplicated() {
        // ---
        let mut ledger = AlertLedger::new();
        let first = ledger.raise(&danger("D1", 30.0));
        let second = ledger.raise(&danger("D2", 40.0));
        ledger.record(first.clone());
        ledger.record(second.clone());
        assert!(!ledger.record(first.clone()));

        let all = ledger.list(None, false);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(ledger.list(Some("D1"), false).len(), 1);
    }

    #[test]
    fn test_acknowledge_decrements_exactly_once() {
        // ---
        let mut ledger = AlertLedger::new();
        let a = ledger.raise(&danger("D1", 30.0));
        let b = ledger.raise(&danger("D1", 31.0));
        let a_id = a.id;
        ledger.record(a);
        ledger.record(b);
        assert_eq!(ledger.count_unacknowledged(), 2);

        assert!(ledger.acknowledge(a_id));
        assert_eq!(ledger.count_unacknowledged(), 1);

        // Already acknowledged and unknown ids are no-ops.
        assert!(!ledger.acknowledge(a_id));
        assert!(!ledger.acknowledge(42));
        assert_eq!(ledger.count_unacknowledged(), 1);
        assert_eq!(ledger.list(None, true).len(), 1);
    }

    #[test]
    fn test_large_ledger_still_rejects_duplicates() {
        // ---
        let mut ledger = AlertLedger::new();
        let mut first = None;
        for i in 0..20_000 {
            let alert = ledger.raise(&danger("D1", 30.0 + i as f64));
            first.get_or_insert_with(|| alert.clone());
            assert!(ledger.record(alert));
        }
        assert_eq!(ledger.len(), 20_000);
        assert_eq!(ledger.count_unacknowledged(), 20_000);

        let first = first.unwrap();
        assert!(!ledger.record(first.clone()));
        assert_eq!(ledger.len(), 20_000);

        assert!(ledger.acknowledge(first.id));
        assert_eq!(ledger.count_unacknowledged(), 19_999);
        assert!(ledger.get(first.id).unwrap().acknowledged);
    }
}
