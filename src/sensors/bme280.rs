//! BME280 humidity/pressure/temperature sensor driver.
//!
//! Register-level driver over any [`embedded_hal::i2c::I2c`] bus.  One
//! forced-mode conversion per call — the sampler task triggers exactly one
//! measurement per wake cycle, so there is no point keeping the sensor in
//! normal (free-running) mode between deep sleeps.
//!
//! Compensation follows the Bosch reference double-precision formulas.

use embedded_hal::i2c::I2c;

use crate::error::SensorError;
use crate::pins::BME280_I2C_ADDR;

// ── Registers ─────────────────────────────────────────────────

const REG_CHIP_ID: u8 = 0xD0;
const REG_RESET: u8 = 0xE0;
const REG_CALIB_TP: u8 = 0x88; // 26 bytes: T1..P9 + 0xA1 (H1)
const REG_CALIB_H: u8 = 0xE1; // 7 bytes: H2..H6
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_DATA: u8 = 0xF7; // 8 bytes: press[3] temp[3] hum[2]

const CHIP_ID: u8 = 0x60;
const RESET_CMD: u8 = 0xB6;

// Oversampling: humidity 1x, temperature 2x, pressure 16x.
const OSRS_H: u8 = 0b001;
const OSRS_T: u8 = 0b010;
const OSRS_P: u8 = 0b101;
/// IIR filter coefficient 16.
const FILTER: u8 = 0b100;
const MODE_FORCED: u8 = 0b01;
const STATUS_MEASURING: u8 = 1 << 3;

/// Worst-case conversion time for the oversampling above, per datasheet
/// appendix B, rounded up.
const MEASUREMENT_TIME_MS: u64 = 50;

// ── Types ─────────────────────────────────────────────────────

/// One compensated measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
}

/// Factory trim values read from the calibration registers at init.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calibration {
    dig_t1: u16,
    dig_t2: i16,
    dig_t3: i16,
    dig_p1: u16,
    dig_p2: i16,
    dig_p3: i16,
    dig_p4: i16,
    dig_p5: i16,
    dig_p6: i16,
    dig_p7: i16,
    dig_p8: i16,
    dig_p9: i16,
    dig_h1: u8,
    dig_h2: i16,
    dig_h3: u8,
    dig_h4: i16,
    dig_h5: i16,
    dig_h6: i8,
}

impl Calibration {
    /// Parse the two raw calibration blocks (0x88..=0xA1 and 0xE1..=0xE7).
    fn from_raw(tp: &[u8; 26], h: &[u8; 7]) -> Self {
        let u16le = |lo: u8, hi: u8| u16::from(lo) | (u16::from(hi) << 8);
        let i16le = |lo: u8, hi: u8| u16le(lo, hi) as i16;
        Self {
            dig_t1: u16le(tp[0], tp[1]),
            dig_t2: i16le(tp[2], tp[3]),
            dig_t3: i16le(tp[4], tp[5]),
            dig_p1: u16le(tp[6], tp[7]),
            dig_p2: i16le(tp[8], tp[9]),
            dig_p3: i16le(tp[10], tp[11]),
            dig_p4: i16le(tp[12], tp[13]),
            dig_p5: i16le(tp[14], tp[15]),
            dig_p6: i16le(tp[16], tp[17]),
            dig_p7: i16le(tp[18], tp[19]),
            dig_p8: i16le(tp[20], tp[21]),
            dig_p9: i16le(tp[22], tp[23]),
            dig_h1: tp[25],
            dig_h2: i16le(h[0], h[1]),
            dig_h3: h[2],
            // H4/H5 share the nibble register 0xE5.
            dig_h4: (i16::from(h[3] as i8) << 4) | i16::from(h[4] & 0x0F),
            dig_h5: (i16::from(h[5] as i8) << 4) | i16::from(h[4] >> 4),
            dig_h6: h[6] as i8,
        }
    }

    /// Temperature in °C plus the `t_fine` carry used by the pressure and
    /// humidity formulas.
    fn compensate_temperature(&self, adc_t: i32) -> (f64, f64) {
        let adc_t = f64::from(adc_t);
        let t1 = f64::from(self.dig_t1);
        let var1 = (adc_t / 16384.0 - t1 / 1024.0) * f64::from(self.dig_t2);
        let var2 = (adc_t / 131072.0 - t1 / 8192.0) * (adc_t / 131072.0 - t1 / 8192.0)
            * f64::from(self.dig_t3);
        let t_fine = var1 + var2;
        (t_fine / 5120.0, t_fine)
    }

    /// Pressure in Pa.
    fn compensate_pressure(&self, adc_p: i32, t_fine: f64) -> f64 {
        let mut var1 = t_fine / 2.0 - 64000.0;
        let mut var2 = var1 * var1 * f64::from(self.dig_p6) / 32768.0;
        var2 += var1 * f64::from(self.dig_p5) * 2.0;
        var2 = var2 / 4.0 + f64::from(self.dig_p4) * 65536.0;
        var1 = (f64::from(self.dig_p3) * var1 * var1 / 524288.0
            + f64::from(self.dig_p2) * var1)
            / 524288.0;
        var1 = (1.0 + var1 / 32768.0) * f64::from(self.dig_p1);
        if var1 == 0.0 {
            return 0.0;
        }
        let mut p = 1048576.0 - f64::from(adc_p);
        p = (p - var2 / 4096.0) * 6250.0 / var1;
        var1 = f64::from(self.dig_p9) * p * p / 2147483648.0;
        var2 = p * f64::from(self.dig_p8) / 32768.0;
        p + (var1 + var2 + f64::from(self.dig_p7)) / 16.0
    }

    /// Relative humidity in %, clamped to 0..=100.
    fn compensate_humidity(&self, adc_h: i32, t_fine: f64) -> f64 {
        let var_h = t_fine - 76800.0;
        let var_h = (f64::from(adc_h)
            - (f64::from(self.dig_h4) * 64.0 + f64::from(self.dig_h5) / 16384.0 * var_h))
            * (f64::from(self.dig_h2) / 65536.0
                * (1.0
                    + f64::from(self.dig_h6) / 67108864.0
                        * var_h
                        * (1.0 + f64::from(self.dig_h3) / 67108864.0 * var_h)));
        let var_h = var_h * (1.0 - f64::from(self.dig_h1) * var_h / 524288.0);
        var_h.clamp(0.0, 100.0)
    }
}

// ── Driver ────────────────────────────────────────────────────

pub struct Bme280<B> {
    bus: B,
    addr: u8,
    calib: Calibration,
}

impl<B> Bme280<B>
where
    B: I2c,
{
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            addr: BME280_I2C_ADDR,
            calib: Calibration::default(),
        }
    }

    /// Probe the chip, soft-reset it, read the factory calibration, and
    /// configure oversampling and filtering.  Leaves the device in sleep
    /// mode; [`measure_once`](Self::measure_once) triggers conversions.
    pub fn init(&mut self) -> Result<(), SensorError> {
        let id = self.read_reg(REG_CHIP_ID)?;
        if id != CHIP_ID {
            log::error!("BME280: chip ID 0x{:02X}, expected 0x{:02X}", id, CHIP_ID);
            return Err(SensorError::BadChipId);
        }

        self.write_reg(REG_RESET, RESET_CMD)?;
        std::thread::sleep(std::time::Duration::from_millis(5));

        let mut tp = [0u8; 26];
        self.read_regs(REG_CALIB_TP, &mut tp)?;
        let mut h = [0u8; 7];
        self.read_regs(REG_CALIB_H, &mut h)?;
        self.calib = Calibration::from_raw(&tp, &h);

        // ctrl_hum must be written before ctrl_meas takes effect.
        self.write_reg(REG_CTRL_HUM, OSRS_H)?;
        self.write_reg(REG_CONFIG, FILTER << 2)?;
        self.write_reg(REG_CTRL_MEAS, (OSRS_T << 5) | (OSRS_P << 2))?;
        Ok(())
    }

    /// Trigger one forced-mode conversion, wait for it to finish, and
    /// return the compensated measurement.
    pub fn measure_once(&mut self) -> Result<Measurement, SensorError> {
        self.write_reg(REG_CTRL_MEAS, (OSRS_T << 5) | (OSRS_P << 2) | MODE_FORCED)?;
        std::thread::sleep(std::time::Duration::from_millis(MEASUREMENT_TIME_MS));

        if self.read_reg(REG_STATUS)? & STATUS_MEASURING != 0 {
            return Err(SensorError::NotReady);
        }

        let mut data = [0u8; 8];
        self.read_regs(REG_DATA, &mut data)?;

        let adc_p =
            (i32::from(data[0]) << 12) | (i32::from(data[1]) << 4) | (i32::from(data[2]) >> 4);
        let adc_t =
            (i32::from(data[3]) << 12) | (i32::from(data[4]) << 4) | (i32::from(data[5]) >> 4);
        let adc_h = (i32::from(data[6]) << 8) | i32::from(data[7]);

        let (temp_c, t_fine) = self.calib.compensate_temperature(adc_t);
        let press_pa = self.calib.compensate_pressure(adc_p, t_fine);
        let hum = self.calib.compensate_humidity(adc_h, t_fine);

        Ok(Measurement {
            temperature_c: temp_c as f32,
            humidity_pct: hum as f32,
            pressure_hpa: (press_pa / 100.0) as f32,
        })
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError> {
        let mut buf = [0u8; 1];
        self.bus
            .write_read(self.addr, &[reg], &mut buf)
            .map_err(|_| SensorError::I2cReadFailed)?;
        Ok(buf[0])
    }

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        self.bus
            .write_read(self.addr, &[reg], buf)
            .map_err(|_| SensorError::I2cReadFailed)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.bus
            .write(self.addr, &[reg, value])
            .map_err(|_| SensorError::I2cWriteFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Datasheet example trim values (section 8, BMP280-compatible T/P set).
    fn datasheet_calib() -> Calibration {
        Calibration {
            dig_t1: 27504,
            dig_t2: 26435,
            dig_t3: -1000,
            dig_p1: 36477,
            dig_p2: -10685,
            dig_p3: 3024,
            dig_p4: 2855,
            dig_p5: 140,
            dig_p6: -7,
            dig_p7: 15500,
            dig_p8: -14600,
            dig_p9: 6000,
            dig_h1: 75,
            dig_h2: 363,
            dig_h3: 0,
            dig_h4: 315,
            dig_h5: 50,
            dig_h6: 30,
        }
    }

    #[test]
    fn temperature_matches_datasheet_example() {
        let calib = datasheet_calib();
        let (t, _) = calib.compensate_temperature(519888);
        assert!((t - 25.08).abs() < 0.01, "got {t}");
    }

    #[test]
    fn pressure_matches_datasheet_example() {
        let calib = datasheet_calib();
        let (_, t_fine) = calib.compensate_temperature(519888);
        let p = calib.compensate_pressure(415148, t_fine);
        assert!((p - 100653.27).abs() < 10.0, "got {p}");
    }

    #[test]
    fn humidity_is_clamped() {
        let calib = datasheet_calib();
        let (_, t_fine) = calib.compensate_temperature(519888);
        for adc_h in [0, 20000, 40000, 65535] {
            let h = calib.compensate_humidity(adc_h, t_fine);
            assert!((0.0..=100.0).contains(&h), "adc_h={adc_h} -> {h}");
        }
    }

    #[test]
    fn pressure_zero_trim_does_not_divide_by_zero() {
        let calib = Calibration {
            dig_p1: 0,
            ..datasheet_calib()
        };
        let (_, t_fine) = calib.compensate_temperature(519888);
        assert_eq!(calib.compensate_pressure(415148, t_fine), 0.0);
    }

    #[test]
    fn calibration_parsing_little_endian() {
        let mut tp = [0u8; 26];
        tp[0] = 0x70; // dig_t1 = 0x6B70 = 27504
        tp[1] = 0x6B;
        tp[2] = 0x43; // dig_t2 = 0x6743 = 26435
        tp[3] = 0x67;
        tp[4] = 0x18; // dig_t3 = 0xFC18 = -1000
        tp[5] = 0xFC;
        tp[25] = 75; // dig_h1
        let h = [0x6B, 0x01, 0x00, 0x13, 0x0B, 0x20, 0x1E];
        let c = Calibration::from_raw(&tp, &h);
        assert_eq!(c.dig_t1, 27504);
        assert_eq!(c.dig_t2, 26435);
        assert_eq!(c.dig_t3, -1000);
        assert_eq!(c.dig_h1, 75);
        assert_eq!(c.dig_h2, 0x016B);
        assert_eq!(c.dig_h4, (0x13 << 4) | 0x0B);
        assert_eq!(c.dig_h5, 0x20 << 4);
        assert_eq!(c.dig_h6, 0x1E);
    }
}
