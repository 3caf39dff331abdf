//! HTTP report composition.
//!
//! One report per sensing cycle: device name, calibrated temperature,
//! humidity, and battery state of charge, form-encoded exactly as the
//! server expects:
//!
//! ```text
//! device_name=<name>&temperature=<%.2f>&humidity=<%.3f>&charge=<%.2f>
//! ```

use core::fmt::Write;

use crate::config::DeviceConfig;
use crate::sensors::ReadingsSnapshot;

/// Fixed calibration offset subtracted from the raw BME280 temperature.
/// The sensor self-heats and also picks up heat from the PCB.
pub const TEMP_CALIBRATION_C: f32 = 3.0;

/// Maximum report body length: 256-byte name plus the fixed keys and three
/// formatted floats.
const MAX_BODY_LEN: usize = 384;

/// A composed sensing report, ready for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub device_name: heapless::String<{ crate::config::MAX_NAME_LEN }>,
    /// Calibrated temperature (raw minus [`TEMP_CALIBRATION_C`]).
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub charge_pct: f32,
}

impl Report {
    /// Compose a report from the persisted configuration and the latest
    /// shared readings, applying the temperature calibration offset.
    pub fn compose(config: &DeviceConfig, readings: &ReadingsSnapshot) -> Self {
        Self {
            device_name: config.name.clone(),
            temperature_c: readings.temperature_c - TEMP_CALIBRATION_C,
            humidity_pct: readings.humidity_pct,
            charge_pct: readings.charge_pct,
        }
    }

    /// The form-encoded POST body.
    pub fn body(&self) -> heapless::String<MAX_BODY_LEN> {
        let mut body = heapless::String::new();
        // Infallible: MAX_BODY_LEN covers the longest possible name plus
        // the fixed keys and formatted values.
        let _ = write!(
            body,
            "device_name={}&temperature={:.2}&humidity={:.3}&charge={:.2}",
            self.device_name, self.temperature_c, self.humidity_pct, self.charge_pct
        );
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigField;

    fn snapshot(temp: f32, hum: f32, charge: f32) -> ReadingsSnapshot {
        ReadingsSnapshot {
            temperature_c: temp,
            humidity_pct: hum,
            pressure_hpa: 1013.25,
            charge_pct: charge,
            cell_voltage_v: 3.9,
        }
    }

    #[test]
    fn body_matches_wire_format_exactly() {
        let mut config = DeviceConfig::default();
        config.set_field(ConfigField::Name, "node1").unwrap();
        config.set_field(ConfigField::Uri, "10.0.0.5/api").unwrap();
        config.set_field(ConfigField::Timer, "15").unwrap();

        let report = Report::compose(&config, &snapshot(23.40, 45.678, 87.5));
        assert_eq!(
            report.body().as_str(),
            "device_name=node1&temperature=20.40&humidity=45.678&charge=87.50"
        );
    }

    #[test]
    fn calibration_offset_applied_once() {
        let config = DeviceConfig::default();
        let report = Report::compose(&config, &snapshot(26.0, 50.0, 100.0));
        assert!((report.temperature_c - 23.0).abs() < 1e-5);
    }

    #[test]
    fn formatting_pads_decimals() {
        let mut config = DeviceConfig::default();
        config.set_field(ConfigField::Name, "n").unwrap();
        let report = Report::compose(&config, &snapshot(3.0, 10.0, 5.0));
        assert_eq!(
            report.body().as_str(),
            "device_name=n&temperature=0.00&humidity=10.000&charge=5.00"
        );
    }

    #[test]
    fn longest_name_fits() {
        let mut config = DeviceConfig::default();
        let name = "n".repeat(crate::config::MAX_NAME_LEN);
        config.set_field(ConfigField::Name, &name).unwrap();
        let report = Report::compose(&config, &snapshot(20.0, 50.0, 50.0));
        let body = report.body();
        assert!(body.as_str().starts_with("device_name=nnnn"));
        assert!(body.as_str().ends_with("&charge=50.00"));
    }
}
