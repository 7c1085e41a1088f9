//! Discrete telemetry: PMU status words and breaker status words.

use serde::{Deserialize, Serialize};

/// IEEE C37.118 STAT word reported alongside each PMU data frame.
///
/// | Bit | Meaning |
/// |-----|---------|
/// | 15 | data invalid |
/// | 14 | PMU error |
/// | 13 | PMU not synchronised |
/// | 12 | data sorted by arrival |
/// | 11 | PMU trigger detected |
/// | 10 | configuration change pending |
/// | 9  | data modified by post-processing |
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusWord {
    #[serde(default)]
    pub key: Option<String>,
    binary_value: u16,
    #[serde(skip)]
    reported: bool,
}

impl StatusWord {
    pub const DATA_INVALID: u16 = 1 << 15;
    pub const PMU_ERROR: u16 = 1 << 14;
    pub const SYNC_INVALID: u16 = 1 << 13;
    pub const DATA_SORTING: u16 = 1 << 12;
    pub const TRIGGER_DETECTED: u16 = 1 << 11;
    pub const CONFIGURATION_CHANGED: u16 = 1 << 10;
    pub const DATA_MODIFIED: u16 = 1 << 9;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn binary_value(&self) -> u16 {
        self.binary_value
    }

    pub fn set_binary_value(&mut self, value: u16) {
        self.binary_value = value;
        self.reported = true;
    }

    pub fn is_reported(&self) -> bool {
        self.reported
    }

    pub fn clear_reported(&mut self) {
        self.reported = false;
    }

    pub fn data_is_valid(&self) -> bool {
        self.binary_value & Self::DATA_INVALID == 0
    }

    pub fn pmu_error(&self) -> bool {
        self.binary_value & Self::PMU_ERROR != 0
    }

    pub fn synchronization_is_valid(&self) -> bool {
        self.binary_value & Self::SYNC_INVALID == 0
    }

    pub fn data_sorted_by_arrival(&self) -> bool {
        self.binary_value & Self::DATA_SORTING != 0
    }

    pub fn trigger_detected(&self) -> bool {
        self.binary_value & Self::TRIGGER_DETECTED != 0
    }

    pub fn configuration_changed(&self) -> bool {
        self.binary_value & Self::CONFIGURATION_CHANGED != 0
    }

    pub fn data_modified(&self) -> bool {
        self.binary_value & Self::DATA_MODIFIED != 0
    }

    pub fn insert(&mut self, key: &str, value: f64) -> bool {
        if self.key.as_deref() != Some(key) {
            return false;
        }
        self.set_binary_value(raw_word(value));
        true
    }
}

/// Digital status word carrying a breaker's position in one of its bits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub key: String,
    /// Bit that reads 1 when the breaker is closed
    pub bit_position: u8,
    binary_value: u16,
    #[serde(skip)]
    reported: bool,
}

impl BreakerStatus {
    pub fn new(key: impl Into<String>, bit_position: u8) -> Self {
        Self {
            key: key.into(),
            bit_position: bit_position.min(15),
            binary_value: 0,
            reported: false,
        }
    }

    pub fn binary_value(&self) -> u16 {
        self.binary_value
    }

    pub fn set_binary_value(&mut self, value: u16) {
        self.binary_value = value;
        self.reported = true;
    }

    pub fn is_closed(&self) -> bool {
        (self.binary_value >> self.bit_position) & 1 == 1
    }

    pub fn is_reported(&self) -> bool {
        self.reported
    }

    pub fn clear_reported(&mut self) {
        self.reported = false;
    }

    pub fn insert(&mut self, key: &str, value: f64) -> bool {
        if self.key != key {
            return false;
        }
        self.set_binary_value(raw_word(value));
        true
    }
}

/// Telemetry carries digital words as floating-point samples.
fn raw_word(value: f64) -> u16 {
    if value.is_finite() {
        value.round().clamp(0.0, u16::MAX as f64) as u16
    } else {
        0
    }
}
