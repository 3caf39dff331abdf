//! One-shot hardware peripheral initialization.
//!
//! Configures the button GPIO (input, pull-up, falling-edge interrupt), the
//! status LED GPIO (output), and the GPIO ISR service, using raw ESP-IDF
//! sys calls.  Called once from `main()` before the supervisor loop starts.
//! The I2C bus is brought up separately in `main()` through `esp-idf-hal`,
//! because the sensor drivers own it through the `embedded-hal` traits.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={rc})"),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={rc})"),
        }
    }
}

// ── GPIO setup ────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn init_gpio() -> Result<(), HwInitError> {
    // SAFETY: called once from main() before the supervisor loop;
    // single-threaded at this point.
    unsafe {
        // Status LED: plain push-pull output, initially low.
        let led_conf = gpio_config_t {
            pin_bit_mask: 1u64 << pins::RUN_LED_GPIO,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let rc = gpio_config(&led_conf);
        if rc != ESP_OK {
            return Err(HwInitError::GpioConfigFailed(rc));
        }
        gpio_set_level(pins::RUN_LED_GPIO, 0);

        // Mode button: active-low input, pull-up, falling-edge interrupt.
        let btn_conf = gpio_config_t {
            pin_bit_mask: 1u64 << pins::BUTTON_GPIO,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
        };
        let rc = gpio_config(&btn_conf);
        if rc != ESP_OK {
            return Err(HwInitError::GpioConfigFailed(rc));
        }
    }
    info!("hw_init: GPIO configured (button={}, led={})", pins::BUTTON_GPIO, pins::RUN_LED_GPIO);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_gpio() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): GPIO init skipped");
    Ok(())
}

// ── ISR service ───────────────────────────────────────────────

/// Button ISR shim: stamps the edge time and returns.  All debounce and
/// mode logic runs in task context.
#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(_arg: *mut core::ffi::c_void) {
    let now_ms = (unsafe { esp_timer_get_time() } / 1000) as u32;
    crate::drivers::button::button_isr_handler(now_ms);
}

#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: called once from main() after init_gpio().
    unsafe {
        let rc = gpio_install_isr_service(0);
        if rc != ESP_OK && rc != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(rc));
        }
        let rc = gpio_isr_handler_add(
            pins::BUTTON_GPIO,
            Some(button_gpio_isr),
            core::ptr::null_mut(),
        );
        if rc != ESP_OK {
            return Err(HwInitError::IsrInstallFailed(rc));
        }
    }
    info!("hw_init: button ISR registered");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}

// ── Runtime GPIO access ───────────────────────────────────────

/// Drive an output pin.  Used by the LED blinker task.
#[cfg(target_os = "espidf")]
pub fn set_level(gpio: i32, high: bool) {
    // SAFETY: gpio_set_level is ISR- and thread-safe per ESP-IDF docs.
    unsafe {
        gpio_set_level(gpio, u32::from(high));
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn set_level(_gpio: i32, _high: bool) {}
