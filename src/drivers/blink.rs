//! Status LED blinker.
//!
//! A single GPIO toggled by a background task.  The half-period encodes the
//! device's mode: fast for provisioning / just-switched, slow for a sensing
//! cycle in progress.  The body cooperates with the registry's cancel token
//! so the supervisor can swap periods through its stop-then-restart
//! sequence without tearing a task down mid-toggle.

use crate::drivers::hw_init;
use crate::pins;
use crate::supervisor::tasks::CancelToken;

/// Fast blink: provisioning mode and the moment of a mode switch.
pub const MODE_SWITCH_BLINK_MS: u32 = 100;
/// Slow blink: a sensing cycle is running.
pub const SENSING_BLINK_MS: u32 = 500;

/// Largest uninterruptible sleep inside the blinker, so cancellation is
/// observed promptly even at slow blink rates.
const CANCEL_POLL_MS: u32 = 25;

/// Blinker task body: toggle the status LED every `half_period_ms` until
/// cancelled, then leave the LED off.
pub fn run_blinker(half_period_ms: u32, cancel: CancelToken) {
    let mut level = false;
    while !cancel.is_cancelled() {
        level = !level;
        hw_init::set_level(pins::RUN_LED_GPIO, level);
        sleep_cancellable(half_period_ms, &cancel);
    }
    hw_init::set_level(pins::RUN_LED_GPIO, false);
}

fn sleep_cancellable(total_ms: u32, cancel: &CancelToken) {
    let mut remaining = total_ms;
    while remaining > 0 && !cancel.is_cancelled() {
        let chunk = remaining.min(CANCEL_POLL_MS);
        std::thread::sleep(std::time::Duration::from_millis(u64::from(chunk)));
        remaining -= chunk;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blinker_exits_promptly_on_cancel() {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let start = std::time::Instant::now();
        let handle = std::thread::spawn(move || run_blinker(SENSING_BLINK_MS, token));
        std::thread::sleep(std::time::Duration::from_millis(60));
        cancel.cancel();
        handle.join().unwrap();
        // Must exit well before a full 500 ms half-period elapses.
        assert!(start.elapsed() < std::time::Duration::from_millis(400));
    }

    #[test]
    fn cancelled_before_start_exits_immediately() {
        let cancel = CancelToken::new();
        cancel.cancel();
        run_blinker(MODE_SWITCH_BLINK_MS, cancel);
    }
}
