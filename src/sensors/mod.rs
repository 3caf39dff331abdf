//! Sensor subsystem — I2C drivers, the shared bus, and the last-reading cell.
//!
//! Two one-shot sampler bodies run as background tasks in sensing mode:
//! the environmental sampler (BME280) and the battery monitor (MAX17048).
//! Each performs exactly one measurement cycle per wake and publishes into
//! a [`Readings`] cell; the supervisor reads a snapshot when composing the
//! report.  The samplers share one physical bus through
//! [`bus::SharedBus`], which serialises transactions.

pub mod bme280;
pub mod bus;
pub mod fuel_gauge;

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embedded_hal::i2c::I2c;
use log::{error, info};

use crate::supervisor::tasks::CancelToken;

// ---------------------------------------------------------------------------
// Shared readings cell
// ---------------------------------------------------------------------------

/// A point-in-time copy of the shared readings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadingsSnapshot {
    /// Raw BME280 temperature (°C) — calibration is applied at report time.
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_hpa: f32,
    /// Battery state of charge (%).
    pub charge_pct: f32,
    pub cell_voltage_v: f32,
}

#[derive(Default)]
struct ReadingsInner {
    temperature_bits: AtomicU32,
    humidity_bits: AtomicU32,
    pressure_bits: AtomicU32,
    charge_bits: AtomicU32,
    voltage_bits: AtomicU32,
}

/// Cloneable handle to the shared last-reading cell.
///
/// Each field is a single word written by exactly one sampler and read by
/// the supervisor; the f32 values travel as their bit patterns so every
/// access is one atomic load/store.
#[derive(Clone, Default)]
pub struct Readings {
    inner: Arc<ReadingsInner>,
}

fn store_f32(cell: &AtomicU32, value: f32) {
    cell.store(value.to_bits(), Ordering::Release);
}

fn load_f32(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Acquire))
}

impl Readings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish one environmental measurement (called by the env sampler).
    pub fn publish_environment(&self, m: &bme280::Measurement) {
        store_f32(&self.inner.temperature_bits, m.temperature_c);
        store_f32(&self.inner.humidity_bits, m.humidity_pct);
        store_f32(&self.inner.pressure_bits, m.pressure_hpa);
    }

    /// Publish one battery measurement (called by the battery monitor).
    pub fn publish_battery(&self, charge_pct: f32, cell_voltage_v: f32) {
        store_f32(&self.inner.charge_bits, charge_pct);
        store_f32(&self.inner.voltage_bits, cell_voltage_v);
    }

    pub fn snapshot(&self) -> ReadingsSnapshot {
        ReadingsSnapshot {
            temperature_c: load_f32(&self.inner.temperature_bits),
            humidity_pct: load_f32(&self.inner.humidity_bits),
            pressure_hpa: load_f32(&self.inner.pressure_bits),
            charge_pct: load_f32(&self.inner.charge_bits),
            cell_voltage_v: load_f32(&self.inner.voltage_bits),
        }
    }
}

// ---------------------------------------------------------------------------
// One-shot sampler bodies
// ---------------------------------------------------------------------------

/// Environmental sampler: one BME280 forced-mode measurement, published to
/// the readings cell.  Errors are logged and the cycle is skipped; the
/// previous published values stay in place.
pub fn run_env_sampler<B: I2c>(bus: B, readings: Readings, cancel: CancelToken) {
    let mut sensor = bme280::Bme280::new(bus);
    if let Err(e) = sensor.init() {
        error!("BME280: init failed ({e})");
        return;
    }
    if cancel.is_cancelled() {
        return;
    }
    match sensor.measure_once() {
        Ok(m) => {
            info!(
                "BME280: {:.2} degC / {:.3} hPa / {:.3} %",
                m.temperature_c, m.pressure_hpa, m.humidity_pct
            );
            readings.publish_environment(&m);
        }
        Err(e) => error!("BME280: measure error ({e})"),
    }
}

/// Battery monitor: quick-start the gauge, log the silicon version, read
/// SOC and cell voltage once, publish.
pub fn run_battery_monitor<B: I2c>(bus: B, readings: Readings, cancel: CancelToken) {
    let mut gauge = fuel_gauge::Max17048::new(bus);
    if let Err(e) = gauge.quick_start() {
        error!("MAX17048: quick-start failed ({e})");
    }
    match gauge.version() {
        Ok(v) => info!("MAX17048: version 0x{v:04X}"),
        Err(e) => error!("MAX17048: version read failed ({e})"),
    }
    if cancel.is_cancelled() {
        return;
    }
    let voltage = match gauge.cell_voltage() {
        Ok(v) => {
            info!("MAX17048: battery voltage {v:.2} V");
            v
        }
        Err(e) => {
            error!("MAX17048: voltage read failed ({e})");
            return;
        }
    };
    match gauge.state_of_charge() {
        Ok(soc) => {
            info!("MAX17048: battery SoC {soc:.2} %");
            readings.publish_battery(soc, voltage);
        }
        Err(e) => error!("MAX17048: SoC read failed ({e})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_starts_zeroed() {
        let r = Readings::new();
        assert_eq!(r.snapshot(), ReadingsSnapshot::default());
    }

    #[test]
    fn publish_environment_updates_only_env_fields() {
        let r = Readings::new();
        r.publish_battery(80.0, 3.9);
        r.publish_environment(&bme280::Measurement {
            temperature_c: 23.4,
            humidity_pct: 45.6,
            pressure_hpa: 1001.0,
        });
        let s = r.snapshot();
        assert!((s.temperature_c - 23.4).abs() < 1e-5);
        assert!((s.humidity_pct - 45.6).abs() < 1e-5);
        assert!((s.charge_pct - 80.0).abs() < 1e-5);
        assert!((s.cell_voltage_v - 3.9).abs() < 1e-5);
    }

    #[test]
    fn clones_observe_the_same_cell() {
        let r = Readings::new();
        let r2 = r.clone();
        r.publish_battery(55.0, 3.7);
        assert!((r2.snapshot().charge_pct - 55.0).abs() < 1e-5);
    }
}
