//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - the button GPIO ISR (mode-switch request)
//! - the provisioning-deadline worker
//! - WiFi / BLE stack callbacks
//!
//! and consumed by the supervisor loop, one at a time, in FIFO order.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ GPIO ISR    │────▶│              │     │              │
//! │ Radio CBs   │────▶│  Event Queue │────▶│  Supervisor  │
//! │ Workers     │────▶│  (lock-free) │     │  (consumer)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Payload-carrying provisioning traffic does not ride this ring; it goes
//! through the bounded channel in [`crate::adapters::ble`].  The ring only
//! carries the signal.

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 32;

/// System event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    // ── User input ────────────────────────────────────────
    /// Debounced button edge: request a mode switch.
    ButtonPressed          = 0,

    // ── Supervisor timers ─────────────────────────────────
    /// The one-shot provisioning inactivity deadline elapsed.
    ProvisioningDeadline   = 1,

    // ── BLE provisioning stack ────────────────────────────
    /// A central connected to the provisioning service.
    BleConnected           = 10,
    /// The central disconnected.
    BleDisconnected        = 11,
    /// One or more provisioning messages are waiting in the channel.
    ProvisioningData       = 12,

    // ── WiFi station ──────────────────────────────────────
    /// Station associated with the AP.
    WifiConnected          = 20,
    /// Station lost or failed association.
    WifiDisconnected       = 21,
    /// DHCP completed; the station has an IP.
    WifiGotIp              = 22,
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// ISR / callback contexts write (produce), the supervisor loop reads
// (consumes).  Atomic head/tail indices; the buffer lives in a static so
// C callback shims can reach it.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: producer side (push_event) runs in ISR / radio-callback context,
// consumer side (pop_event) runs in the supervisor loop.  Each cell is
// written by exactly one side between the head/tail handshakes; the
// acquire/release pairs on the indices order the cell accesses.
static mut EVENT_BUFFER: [u8; EVENT_QUEUE_CAP] = [0; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from ISR context (lock-free).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false; // Queue full — drop event.
    }

    // SAFETY: single producer; see buffer invariant above.
    unsafe {
        EVENT_BUFFER[head as usize] = event as u8;
    }

    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Called from the supervisor loop (single consumer).
/// Returns `None` if the queue is empty.
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    // SAFETY: single consumer; see buffer invariant above.
    let raw = unsafe { EVENT_BUFFER[tail as usize] };
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw)
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Number of pending events.
pub fn queue_len() -> usize {
    let head = EVENT_HEAD.load(Ordering::Relaxed) as usize;
    let tail = EVENT_TAIL.load(Ordering::Relaxed) as usize;
    (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
}

// ── Internal ──────────────────────────────────────────────────

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0  => Some(Event::ButtonPressed),
        1  => Some(Event::ProvisioningDeadline),
        10 => Some(Event::BleConnected),
        11 => Some(Event::BleDisconnected),
        12 => Some(Event::ProvisioningData),
        20 => Some(Event::WifiConnected),
        21 => Some(Event::WifiDisconnected),
        22 => Some(Event::WifiGotIp),
        _  => None,
    }
}
