//! Threshold classification of a single reading.
//!
//! Two policies are supported:
//! - `DualBound` (min/max catalog): below `min` is safe, anything at or above
//!   80% of `max` is danger, everything in between is warning.
//! - `SingleBound` (max-only catalog): above `max` is danger, above 80% of
//!   `max` is warning, otherwise normal.
//!
//! Only the danger tier raises an alert, and it does so on every reading
//! (no debounce).

use serde::{Deserialize, Serialize};

/// Fraction of `max` at which a reading escalates.
pub const ESCALATION_RATIO: f64 = 0.8;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Normal,
    Warning,
    Danger,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }

    pub fn raises_alert(self) -> bool {
        self == Self::Danger
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    DualBound,
    SingleBound,
}

impl ThresholdPolicy {
    // ---
    pub fn classify(self, value: f64, min_threshold: f64, max_threshold: f64) -> Tier {
        // ---
        match self {
            Self::DualBound => classify(value, min_threshold, max_threshold),
            Self::SingleBound => classify_single(value, max_threshold),
        }
    }
}

/// Dual-bound classification. Readings below the floor are not hazardous.
pub fn classify(value: f64, min_threshold: f64, max_threshold: f64) -> Tier {
    // ---
    if value < min_threshold {
        Tier::Normal
    } else if value >= max_threshold * ESCALATION_RATIO {
        Tier::Danger
    } else {
        Tier::Warning
    }
}

fn classify_single(value: f64, max_threshold: f64) -> Tier {
    // ---
    if value > max_threshold {
        Tier::Danger
    } else if value > max_threshold * ESCALATION_RATIO {
        Tier::Warning
    } else {
        Tier::Normal
    }
}
