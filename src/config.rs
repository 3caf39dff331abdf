//! Device configuration.
//!
//! Three independently-persisted string fields, supplied over the BLE
//! provisioning service and stored in NVS: device name, report server URI,
//! and deep-sleep interval in minutes (decimal text).  Each field is written
//! individually — updating one never touches the others.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Maximum byte length of the `name` field (matches the provisioning
/// protocol's custom-data limit).
pub const MAX_NAME_LEN: usize = 256;
/// Maximum byte length of the `uri` field.
pub const MAX_URI_LEN: usize = 256;
/// Maximum byte length of the `timer` field (decimal minutes as text).
pub const MAX_TIMER_LEN: usize = 16;

/// Sleep interval used when the persisted `timer` field is missing,
/// non-numeric, or zero.
pub const DEFAULT_SLEEP_MINUTES: u32 = 15;

const US_PER_MINUTE: u64 = 60 * 1_000_000;

// ---------------------------------------------------------------------------
// Field identity
// ---------------------------------------------------------------------------

/// The three persisted configuration fields.  Doubles as the NVS key set and
/// as the recognised custom-data prefixes of the provisioning protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    Name,
    Uri,
    Timer,
}

impl ConfigField {
    pub const ALL: [Self; 3] = [Self::Name, Self::Uri, Self::Timer];

    /// NVS key for this field.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Uri => "uri",
            Self::Timer => "timer",
        }
    }

    /// Maximum accepted value length in bytes.
    pub const fn max_len(self) -> usize {
        match self {
            Self::Name => MAX_NAME_LEN,
            Self::Uri => MAX_URI_LEN,
            Self::Timer => MAX_TIMER_LEN,
        }
    }

    /// Parse a provisioning custom-data payload of the form
    /// `"<key>:<value>"` into a field and its value.  Returns `None` for
    /// unrecognised prefixes — the caller logs and drops those.
    pub fn parse_custom(data: &str) -> Option<(Self, &str)> {
        for field in Self::ALL {
            if let Some(rest) = data.strip_prefix(field.key()) {
                if let Some(value) = rest.strip_prefix(':') {
                    return Some((field, value));
                }
            }
        }
        None
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// DeviceConfig
// ---------------------------------------------------------------------------

/// The persisted device configuration.  Loaded from NVS at boot and re-read
/// when composing a report; pushed field-by-field over BLE provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name included in every HTTP report.
    pub name: heapless::String<MAX_NAME_LEN>,
    /// Report server host (the report is POSTed to `http://<uri>`).
    pub uri: heapless::String<MAX_URI_LEN>,
    /// Deep-sleep interval in minutes, as decimal text.
    pub timer: heapless::String<MAX_TIMER_LEN>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut timer = heapless::String::new();
        // Infallible: "15" fits in 16 bytes.
        let _ = timer.push_str("15");
        let mut name = heapless::String::new();
        let _ = name.push_str("environode");
        Self {
            name,
            uri: heapless::String::new(),
            timer,
        }
    }
}

impl DeviceConfig {
    /// Read a field as a string slice.
    pub fn field(&self, field: ConfigField) -> &str {
        match field {
            ConfigField::Name => self.name.as_str(),
            ConfigField::Uri => self.uri.as_str(),
            ConfigField::Timer => self.timer.as_str(),
        }
    }

    /// Validate and set a single field.  Rejects values over the field's
    /// byte limit; other fields are untouched either way.
    pub fn set_field(&mut self, field: ConfigField, value: &str) -> Result<(), crate::error::StorageError> {
        validate_field(field, value)?;
        let result = match field {
            ConfigField::Name => {
                self.name.clear();
                self.name.push_str(value)
            }
            ConfigField::Uri => {
                self.uri.clear();
                self.uri.push_str(value)
            }
            ConfigField::Timer => {
                self.timer.clear();
                self.timer.push_str(value)
            }
        };
        result.map_err(|()| crate::error::StorageError::ValueTooLong)
    }

    /// Deep-sleep interval in minutes.  Falls back to
    /// [`DEFAULT_SLEEP_MINUTES`] when the persisted text is not a positive
    /// decimal integer.
    pub fn sleep_minutes(&self) -> u32 {
        match self.timer.trim().parse::<u32>() {
            Ok(m) if m > 0 => m,
            _ => {
                log::warn!(
                    "config: timer '{}' is not a positive integer, using {} min",
                    self.timer,
                    DEFAULT_SLEEP_MINUTES
                );
                DEFAULT_SLEEP_MINUTES
            }
        }
    }

    /// Deep-sleep duration in the RTC timer's unit (microseconds):
    /// minutes → seconds → µs.
    pub fn sleep_duration_us(&self) -> u64 {
        u64::from(self.sleep_minutes()) * US_PER_MINUTE
    }
}

/// Validate a candidate value for a field before it is accepted or persisted.
pub fn validate_field(field: ConfigField, value: &str) -> Result<(), crate::error::StorageError> {
    if value.len() > field.max_len() {
        return Err(crate::error::StorageError::ValueTooLong);
    }
    Ok(())
}
