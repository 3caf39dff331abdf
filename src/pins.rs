//! GPIO / peripheral pin assignments for the Environode node board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// User button (active-low with internal pull-up)
// ---------------------------------------------------------------------------

/// Momentary push-button toggling between sensing and provisioning mode.
/// Falling-edge interrupt.
pub const BUTTON_GPIO: i32 = 10;

/// Second button present on the board.  Not configured for anything.
#[allow(dead_code)]
pub const WAKEUP_BUTTON_GPIO: i32 = 0;

// ---------------------------------------------------------------------------
// Status LED
// ---------------------------------------------------------------------------

/// Single status LED.  Blink period encodes mode/intent: fast =
/// provisioning / mode switch, slow = sensing.
pub const RUN_LED_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// I2C bus (BME280 environmental sensor + MAX17048 fuel gauge)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 6;
pub const I2C_SCL_GPIO: i32 = 7;

/// I2C master clock, fast-mode-plus.
pub const I2C_FREQ_HZ: u32 = 1_000_000;

/// BME280 humidity/pressure/temperature sensor address (SDO low).
pub const BME280_I2C_ADDR: u8 = 0x76;

/// MAX17048 battery fuel gauge address.
pub const MAX17048_I2C_ADDR: u8 = 0x36;
