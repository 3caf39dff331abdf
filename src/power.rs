//! Deep-sleep scheduling.
//!
//! Deep sleep on this platform is a full power-state reset: RAM contents
//! are lost, and the wake path is a cold boot through `main()`.  Every
//! sensing cycle therefore ends here, with the RTC timer armed from the
//! persisted sleep-interval configuration.

use log::info;

use crate::supervisor::ports::SleepPort;

/// Deep-sleep adapter backed by the RTC timer wake source.
#[derive(Default)]
pub struct DeepSleep {
    /// Simulation: recorded requests, newest last.
    #[cfg(not(target_os = "espidf"))]
    pub requests: Vec<u64>,
}

impl DeepSleep {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SleepPort for DeepSleep {
    #[cfg(target_os = "espidf")]
    fn request_deep_sleep(&mut self, duration_us: u64) {
        info!("deep sleep: arming RTC timer for {duration_us} us");
        // SAFETY: plain ESP-IDF calls; esp_deep_sleep_start does not
        // return — the next code to run is main() after the timer fires.
        unsafe {
            esp_idf_svc::sys::esp_sleep_enable_timer_wakeup(duration_us);
            esp_idf_svc::sys::esp_deep_sleep_start();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn request_deep_sleep(&mut self, duration_us: u64) {
        info!("deep sleep(sim): would sleep {duration_us} us");
        self.requests.push(duration_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_records_requests() {
        let mut sleep = DeepSleep::new();
        sleep.request_deep_sleep(900_000_000);
        assert_eq!(sleep.requests, vec![900_000_000]);
    }
}
