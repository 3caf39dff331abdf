//! Unified error types for the Environode firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! supervisor's error handling uniform.  Nothing here is fatal: every failure
//! path degrades to a logged no-op and returns control to the steady-state
//! loop.  All variants are `Copy` so they can be passed through the
//! supervisor without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An I2C sensor could not be read or returned implausible data.
    Sensor(SensorError),
    /// A radio stack lifecycle step (BLE controller/host) failed.
    Radio(RadioError),
    /// Non-volatile storage read/write failed.
    Storage(StorageError),
    /// WiFi or HTTP operation failed.
    Net(NetError),
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration value is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Net(e) => write!(f, "net: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// I2C write transaction failed or was NACKed.
    I2cWriteFailed,
    /// I2C read transaction failed or timed out.
    I2cReadFailed,
    /// Device identification register returned an unexpected value.
    BadChipId,
    /// Measurement was requested before the device finished converting.
    NotReady,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2cWriteFailed => write!(f, "I2C write failed"),
            Self::I2cReadFailed => write!(f, "I2C read failed"),
            Self::BadChipId => write!(f, "unexpected chip ID"),
            Self::NotReady => write!(f, "measurement not ready"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Radio lifecycle errors
// ---------------------------------------------------------------------------

/// BLE stack lifecycle failures.  These abort a mode transition: the
/// supervisor logs the error and stays in its previous mode rather than
/// landing in a half-initialised radio state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// BT controller initialisation failed.
    ControllerInit,
    /// BT controller enable failed.
    ControllerEnable,
    /// Host stack (Bluedroid) initialisation failed.
    HostInit,
    /// Host stack enable failed.
    HostEnable,
    /// GATT service / GAP callback registration failed.
    ServiceRegistration,
    /// Host stack deinitialisation failed.
    HostDeinit,
    /// BT controller deinitialisation failed.
    ControllerDeinit,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControllerInit => write!(f, "BT controller init failed"),
            Self::ControllerEnable => write!(f, "BT controller enable failed"),
            Self::HostInit => write!(f, "BLE host init failed"),
            Self::HostEnable => write!(f, "BLE host enable failed"),
            Self::ServiceRegistration => write!(f, "GATT service registration failed"),
            Self::HostDeinit => write!(f, "BLE host deinit failed"),
            Self::ControllerDeinit => write!(f, "BT controller deinit failed"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Value exceeds the field's maximum length.
    ValueTooLong,
    /// Generic NVS I/O error.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::ValueTooLong => write!(f, "value too long"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Network errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// No WiFi credentials are configured.
    NoCredentials,
    /// SSID failed validation (1-32 printable ASCII bytes).
    InvalidSsid,
    /// Password failed validation (8-64 bytes for WPA2, or empty for open).
    InvalidPassword,
    /// Station association failed after retries.
    ConnectFailed,
    /// Operation requires an association that does not exist.
    NotConnected,
    /// HTTP client could not be initialised.
    HttpInit,
    /// HTTP request was sent but failed.
    HttpSend,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid"),
            Self::InvalidPassword => write!(f, "password invalid"),
            Self::ConnectFailed => write!(f, "WiFi connection failed"),
            Self::NotConnected => write!(f, "not connected"),
            Self::HttpInit => write!(f, "HTTP client init failed"),
            Self::HttpSend => write!(f, "HTTP request failed"),
        }
    }
}

impl From<NetError> for Error {
    fn from(e: NetError) -> Self {
        Self::Net(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
