//! Outbound supervisor events.
//!
//! Emitted through the [`EventSink`](super::ports::EventSink) port.
//! Adapters on the other side decide what to do with them — today that is
//! the serial log; the BLE status characteristic reuses a subset.

use crate::config::ConfigField;
use super::OperatingMode;

/// Structured events emitted by the supervisor.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The supervisor finished boot (carries the initial mode).
    Started(OperatingMode),

    /// A mode transition completed.
    ModeChanged {
        from: OperatingMode,
        to: OperatingMode,
    },

    /// A transition attempt failed and was abandoned; the device stays in
    /// its previous mode.
    TransitionAbandoned { target: OperatingMode },

    /// A provisioning value was persisted.
    ConfigStored(ConfigField),

    /// A sensing report went out.
    ReportSent {
        temperature_c: f32,
        humidity_pct: f32,
        charge_pct: f32,
    },

    /// The sensing report could not be sent; the cycle continues.
    ReportFailed,

    /// Deep sleep was requested for this many microseconds.
    DeepSleepScheduled { minutes: u32, duration_us: u64 },
}
