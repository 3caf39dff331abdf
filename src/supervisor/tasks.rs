//! Background task lifecycle management.
//!
//! The supervisor owns a [`TaskRegistry`]: one slot per task kind, each
//! either empty or holding exactly one spawned worker.  Ownership and
//! lifetime live in this type instead of module-level task handles.
//!
//! Semantics per slot:
//! - `start` is a no-op while the slot is occupied,
//! - `stop` cancels, waits (bounded) for the worker to confirm exit, and
//!   clears the slot; stopping an empty slot is a no-op,
//! - the LED slot alone supports replacement, as a sequenced
//!   stop-then-start with settle delays on both sides.
//!
//! Workers receive a [`CancelToken`] and must check it at safe points; the
//! bounded wait in `stop` means a slot (and the I2C bus behind it) is never
//! reused while its previous owner might still be running.
//!
//! The supervisor is the sole writer of the registry, and every stop/start
//! pair during a transition is sequential, so the slots need no locking.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::drivers::task_spawn;

/// Settle delay around the LED replacement sequence.
const RESTART_SETTLE_MS: u64 = 10;

/// Bounded wait for a cancelled worker to confirm exit.
const STOP_WAIT_MS: u64 = 500;

/// Poll interval while waiting for a worker to exit.
const STOP_POLL_MS: u64 = 10;

// ───────────────────────────────────────────────────────────────
// Cancellation token
// ───────────────────────────────────────────────────────────────

/// Cooperative cancellation flag shared between the registry and a worker.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.  Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Checked by the worker at safe points.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Task identity
// ───────────────────────────────────────────────────────────────

/// Every background task the supervisor manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum TaskKind {
    /// One-shot BME280 measurement cycle.
    EnvSampler = 0,
    /// One-shot MAX17048 measurement cycle.
    BatteryMonitor = 1,
    /// Status LED blinker (long-running, replaceable).
    LedBlinker = 2,
    /// One-shot 20 s provisioning inactivity deadline.
    ProvisioningTimeout = 3,
}

impl TaskKind {
    pub const COUNT: usize = 4;

    /// Null-terminated thread name for `esp_pthread`.
    const fn thread_name(self) -> &'static str {
        match self {
            Self::EnvSampler => "env-sampler\0",
            Self::BatteryMonitor => "batt-monitor\0",
            Self::LedBlinker => "run-led\0",
            Self::ProvisioningTimeout => "prov-timeout\0",
        }
    }

    const fn priority(self) -> u8 {
        match self {
            Self::EnvSampler => 6,
            Self::BatteryMonitor => 5,
            // The LED is the user's only feedback channel; keep it lively.
            Self::LedBlinker => 10,
            Self::ProvisioningTimeout => 4,
        }
    }

    const fn stack_kb(self) -> usize {
        match self {
            Self::EnvSampler | Self::BatteryMonitor => 8,
            Self::LedBlinker | Self::ProvisioningTimeout => 4,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Task bodies
// ───────────────────────────────────────────────────────────────

/// A worker entry point, ready to be handed its cancel token.
pub type TaskBody = Box<dyn FnOnce(CancelToken) + Send + 'static>;

/// Produces fresh worker bodies for the supervisor's managed tasks.
///
/// The supervisor decides *when* tasks run; the catalog decides *what* they
/// do, which keeps the mode machine free of bus handles and testable with
/// stub bodies.  The LED and deadline bodies have canonical defaults.
pub trait TaskCatalog {
    /// One-shot BME280 measurement cycle.
    fn env_sampler(&self) -> TaskBody;

    /// One-shot MAX17048 measurement cycle.
    fn battery_monitor(&self) -> TaskBody;

    /// Status LED blinker at the given half-period.
    fn led_blinker(&self, half_period_ms: u32) -> TaskBody {
        Box::new(move |cancel| crate::drivers::blink::run_blinker(half_period_ms, cancel))
    }

    /// One-shot inactivity deadline: waits `timeout_ms`, then synthesises a
    /// mode-switch request identical to a button press.  Cancellation wins.
    fn provisioning_timeout(&self, timeout_ms: u32) -> TaskBody {
        const POLL_MS: u32 = 50;
        Box::new(move |cancel| {
            let mut waited = 0u32;
            while waited < timeout_ms {
                if cancel.is_cancelled() {
                    return;
                }
                std::thread::sleep(std::time::Duration::from_millis(u64::from(POLL_MS)));
                waited += POLL_MS;
            }
            if !cancel.is_cancelled() {
                crate::events::push_event(crate::events::Event::ProvisioningDeadline);
            }
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────

struct TaskHandle {
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

/// Owned registry mapping each [`TaskKind`] to its optional running worker.
pub struct TaskRegistry {
    slots: [Option<TaskHandle>; TaskKind::COUNT],
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }

    /// Spawn a worker into `kind`'s slot.  No-op (returns `false`) while an
    /// instance is already registered — including a one-shot worker that
    /// has finished but was never stopped; the slot is a registration, not
    /// a liveness probe.
    pub fn start<F>(&mut self, kind: TaskKind, body: F) -> bool
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        if self.slots[kind as usize].is_some() {
            debug!("tasks: {:?} already registered, start ignored", kind);
            return false;
        }
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let thread = task_spawn::spawn(
            kind.thread_name(),
            kind.priority(),
            kind.stack_kb(),
            move || body(token),
        );
        self.slots[kind as usize] = Some(TaskHandle { cancel, thread });
        true
    }

    /// Cancel and clear `kind`'s slot.  Idempotent; empty slot is a no-op.
    ///
    /// Waits up to [`STOP_WAIT_MS`] for the worker to confirm exit so the
    /// resources it holds (I2C bus, LED pin) are free before the caller
    /// proceeds.  A worker that overstays is detached and logged — it holds
    /// a cancelled token and will exit at its next safe point.
    pub fn stop(&mut self, kind: TaskKind) {
        let Some(handle) = self.slots[kind as usize].take() else {
            return;
        };
        handle.cancel.cancel();

        let mut waited = 0u64;
        while !handle.thread.is_finished() && waited < STOP_WAIT_MS {
            std::thread::sleep(std::time::Duration::from_millis(STOP_POLL_MS));
            waited += STOP_POLL_MS;
        }
        if handle.thread.is_finished() {
            let _ = handle.thread.join();
            debug!("tasks: {:?} stopped", kind);
        } else {
            warn!("tasks: {:?} did not exit within {STOP_WAIT_MS} ms, detaching", kind);
        }
    }

    /// Replace the LED blinker with a new body (period change).  Sequenced
    /// stop-then-start with settle delays on both sides, so the old worker
    /// is never torn down mid-toggle and the pin is quiet before the new
    /// worker takes it.
    pub fn restart_led<F>(&mut self, body: F)
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        std::thread::sleep(std::time::Duration::from_millis(RESTART_SETTLE_MS));
        self.stop(TaskKind::LedBlinker);
        std::thread::sleep(std::time::Duration::from_millis(RESTART_SETTLE_MS));
        self.start(TaskKind::LedBlinker, body);
    }

    /// Whether `kind`'s slot is occupied (running or finished-unreaped).
    pub fn is_registered(&self, kind: TaskKind) -> bool {
        self.slots[kind as usize].is_some()
    }

    /// Whether `kind`'s worker is registered and still running.
    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.slots[kind as usize]
            .as_ref()
            .is_some_and(|h| !h.thread.is_finished())
    }

    /// Stop every registered task (shutdown path).
    pub fn stop_all(&mut self) {
        for kind in [
            TaskKind::EnvSampler,
            TaskKind::BatteryMonitor,
            TaskKind::LedBlinker,
            TaskKind::ProvisioningTimeout,
        ] {
            self.stop(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        panic!("condition not reached");
    }

    fn park_until_cancelled(cancel: CancelToken) {
        while !cancel.is_cancelled() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn start_spawns_and_stop_clears() {
        let mut reg = TaskRegistry::new();
        assert!(reg.start(TaskKind::EnvSampler, park_until_cancelled));
        assert!(reg.is_registered(TaskKind::EnvSampler));
        assert!(reg.is_running(TaskKind::EnvSampler));
        reg.stop(TaskKind::EnvSampler);
        assert!(!reg.is_registered(TaskKind::EnvSampler));
    }

    #[test]
    fn duplicate_start_is_noop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut reg = TaskRegistry::new();

        let c = counter.clone();
        assert!(reg.start(TaskKind::BatteryMonitor, move |cancel| {
            c.fetch_add(1, Ordering::SeqCst);
            park_until_cancelled(cancel);
        }));

        let c = counter.clone();
        // Second start must not spawn.
        assert!(!reg.start(TaskKind::BatteryMonitor, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        wait_until(|| counter.load(Ordering::SeqCst) == 1);
        reg.stop(TaskKind::BatteryMonitor);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_on_empty_slot_is_idempotent() {
        let mut reg = TaskRegistry::new();
        reg.stop(TaskKind::LedBlinker);
        reg.stop(TaskKind::LedBlinker);
        assert!(!reg.is_registered(TaskKind::LedBlinker));
    }

    #[test]
    fn finished_one_shot_still_occupies_slot() {
        let mut reg = TaskRegistry::new();
        assert!(reg.start(TaskKind::EnvSampler, |_| {}));
        wait_until(|| !reg.is_running(TaskKind::EnvSampler));
        // Registered but finished: duplicate start still refused.
        assert!(reg.is_registered(TaskKind::EnvSampler));
        assert!(!reg.start(TaskKind::EnvSampler, |_| {}));
        // stop() reaps it and frees the slot.
        reg.stop(TaskKind::EnvSampler);
        assert!(reg.start(TaskKind::EnvSampler, |_| {}));
        reg.stop(TaskKind::EnvSampler);
    }

    #[test]
    fn stop_waits_for_worker_exit() {
        let running = Arc::new(AtomicBool::new(false));
        let mut reg = TaskRegistry::new();
        let r = running.clone();
        reg.start(TaskKind::EnvSampler, move |cancel| {
            r.store(true, Ordering::SeqCst);
            park_until_cancelled(cancel);
            r.store(false, Ordering::SeqCst);
        });
        wait_until(|| running.load(Ordering::SeqCst));
        reg.stop(TaskKind::EnvSampler);
        // The bounded wait means the worker has confirmed exit by now.
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn restart_led_replaces_worker() {
        let first_cancelled = Arc::new(AtomicBool::new(false));
        let second_ran = Arc::new(AtomicBool::new(false));
        let mut reg = TaskRegistry::new();

        let f = first_cancelled.clone();
        reg.start(TaskKind::LedBlinker, move |cancel| {
            park_until_cancelled(cancel);
            f.store(true, Ordering::SeqCst);
        });

        let s = second_ran.clone();
        reg.restart_led(move |cancel| {
            s.store(true, Ordering::SeqCst);
            park_until_cancelled(cancel);
        });

        wait_until(|| second_ran.load(Ordering::SeqCst));
        assert!(first_cancelled.load(Ordering::SeqCst));
        assert!(reg.is_running(TaskKind::LedBlinker));
        reg.stop(TaskKind::LedBlinker);
    }

    #[test]
    fn stop_all_clears_every_slot() {
        let mut reg = TaskRegistry::new();
        reg.start(TaskKind::EnvSampler, park_until_cancelled);
        reg.start(TaskKind::LedBlinker, park_until_cancelled);
        reg.start(TaskKind::ProvisioningTimeout, |_| {});
        reg.stop_all();
        for kind in [
            TaskKind::EnvSampler,
            TaskKind::BatteryMonitor,
            TaskKind::LedBlinker,
            TaskKind::ProvisioningTimeout,
        ] {
            assert!(!reg.is_registered(kind));
        }
    }
}
