//! Port traits — the boundary between the supervisor and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Supervisor (domain)
//! ```
//!
//! Radio stacks, storage, the HTTP reporter, and the deep-sleep primitive
//! implement these traits.  The supervisor consumes them via generics, so
//! the whole mode machine is testable with mock adapters.

use crate::config::{ConfigField, DeviceConfig};
use crate::error::{NetError, RadioError, StorageError};
use crate::report::Report;

// ───────────────────────────────────────────────────────────────
// Provisioning (BLE) port
// ───────────────────────────────────────────────────────────────

/// A message surfaced by the BLE provisioning service.  The wire encoding,
/// encryption negotiation, and GATT plumbing stay behind the adapter; the
/// supervisor only sees these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningMsg {
    /// A central connected to the service.
    Connected,
    /// The central disconnected.
    Disconnected,
    /// WiFi credentials were written.
    Credentials {
        ssid: heapless::String<32>,
        password: heapless::String<64>,
    },
    /// A recognised custom key-value pair was written
    /// (`name:` / `uri:` / `timer:`).
    Custom {
        field: ConfigField,
        value: heapless::String<{ crate::config::MAX_NAME_LEN }>,
    },
    /// The central asked for the station's association status.
    StatusRequest,
    /// The central asked for an AP scan list.
    ApListRequest,
    /// The stack reported a protocol error.
    Fault(u8),
}

/// Lifecycle and message intake for the BLE provisioning stack.
///
/// `start` runs controller init → host init → service registration, in that
/// order; on failure every step already taken is rolled back and the error
/// is returned so the supervisor can abandon the transition.  `stop` runs
/// host deinit before controller deinit — the host must release protocol
/// resources before the radio controller is disabled.
pub trait ProvisioningPort {
    fn start(&mut self) -> Result<(), RadioError>;
    fn stop(&mut self) -> Result<(), RadioError>;
    fn is_active(&self) -> bool;
    /// Drain one pending provisioning message, if any.
    fn poll_message(&mut self) -> Option<ProvisioningMsg>;
    /// Push the station's association status back to the central
    /// (answer to [`ProvisioningMsg::StatusRequest`]).
    fn report_wifi_status(&mut self, connected: bool);
}

// ───────────────────────────────────────────────────────────────
// Connectivity (WiFi station) port
// ───────────────────────────────────────────────────────────────

/// WiFi station control.  Association and reconnection internals live in
/// the adapter; the supervisor only connects, queries, and forwards
/// provisioning-originated operations.
pub trait ConnectivityPort {
    fn connect(&mut self) -> Result<(), NetError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), NetError>;
    /// Kick off an AP scan (answer to [`ProvisioningMsg::ApListRequest`]).
    /// Results are delivered back to the central by the radio subsystems.
    fn request_scan(&mut self);
    /// Drive reconnection bookkeeping.  Called once per supervisor poll.
    fn poll(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Configuration store port
// ───────────────────────────────────────────────────────────────

/// Persisted configuration: three independently stored string fields.
///
/// `load` never fails — missing or unreadable fields fall back to defaults.
/// `store_field` writes one field atomically and leaves the others alone.
pub trait ConfigStore {
    fn load(&self) -> DeviceConfig;
    fn store_field(&mut self, field: ConfigField, value: &str) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Report port
// ───────────────────────────────────────────────────────────────

/// One-shot report transmission.  No retry: a failure is logged by the
/// caller and the cycle moves on.
pub trait ReportPort {
    fn send(&mut self, uri: &str, report: &Report) -> Result<(), NetError>;
}

// ───────────────────────────────────────────────────────────────
// Sleep port
// ───────────────────────────────────────────────────────────────

/// Deep-sleep entry.  On hardware this powers the core down and never
/// returns — the next thing that runs is `main()` after the RTC timer
/// fires.  Modelled as a plain call so tests can observe the request.
pub trait SleepPort {
    fn request_deep_sleep(&mut self, duration_us: u64);
}

// ───────────────────────────────────────────────────────────────
// Event sink port
// ───────────────────────────────────────────────────────────────

/// The supervisor emits structured [`NodeEvent`](super::events::NodeEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::NodeEvent);
}
