//! Environode Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     Adapters (outer ring)                      │
//! │                                                                │
//! │  WifiAdapter     BleProvisioner   NvsStore      HttpReporter   │
//! │  (Connectivity)  (Provisioning)   (ConfigStore) (ReportPort)   │
//! │  DeepSleep       LogEventSink                                  │
//! │  (SleepPort)     (EventSink)                                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              Supervisor (mode machine)                 │    │
//! │  │  transitions · task registry · sensing cycle           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  TaskRegistry workers: env sampler · battery monitor ·         │
//! │  LED blinker · provisioning deadline                           │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Boot sequence: peripherals → NVS/config → WiFi station + association
//! grace → initial mode decision → 5 s button grace → supervisor loop at
//! 100 ms.  A sensing cycle ends in deep sleep, which is a full reset, so
//! this function is also the "wake" path.

#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::Result;
use log::{info, warn};

use environode::adapters::ble::BleProvisioner;
use environode::adapters::http::HttpReporter;
use environode::adapters::log_sink::LogEventSink;
use environode::adapters::nvs::NvsStore;
use environode::adapters::time::MonotonicClock;
use environode::adapters::wifi::WifiAdapter;
use environode::drivers::button::ButtonDriver;
use environode::drivers::hw_init;
use environode::events::{self, Event};
use environode::pins;
use environode::power::DeepSleep;
#[cfg(target_os = "espidf")]
use environode::sensors::bus::SharedBus;
use environode::sensors::Readings;
use environode::supervisor::ports::{ConfigStore, ConnectivityPort};
use environode::supervisor::tasks::{TaskBody, TaskCatalog};
use environode::supervisor::{Supervisor, SUPERVISOR_POLL_MS};

/// Window after boot in which a button press can pre-empt the first
/// sensing cycle.
const BOOT_GRACE_MS: u64 = 5_000;

/// Wait after starting the station before sampling association status for
/// the initial mode decision.
const WIFI_ASSOC_GRACE_MS: u64 = 100;

// ── Task catalog ──────────────────────────────────────────────
//
// The supervisor decides when tasks run; these catalogs provide the
// bodies.  The hardware catalog hands each sampler a clone of the shared
// (mutex-serialised) I2C bus.

#[cfg(target_os = "espidf")]
struct NodeTaskCatalog<B> {
    bus: SharedBus<B>,
    readings: Readings,
}

#[cfg(target_os = "espidf")]
impl<B> TaskCatalog for NodeTaskCatalog<B>
where
    B: embedded_hal::i2c::I2c + Send + 'static,
{
    fn env_sampler(&self) -> TaskBody {
        let bus = self.bus.clone();
        let readings = self.readings.clone();
        Box::new(move |cancel| environode::sensors::run_env_sampler(bus, readings, cancel))
    }

    fn battery_monitor(&self) -> TaskBody {
        let bus = self.bus.clone();
        let readings = self.readings.clone();
        Box::new(move |cancel| environode::sensors::run_battery_monitor(bus, readings, cancel))
    }
}

/// Host-simulation catalog: publishes plausible fixed readings so the
/// full supervisor loop can run on a dev machine.
#[cfg(not(target_os = "espidf"))]
struct SimTaskCatalog {
    readings: Readings,
}

#[cfg(not(target_os = "espidf"))]
impl TaskCatalog for SimTaskCatalog {
    fn env_sampler(&self) -> TaskBody {
        let readings = self.readings.clone();
        Box::new(move |_| {
            readings.publish_environment(&environode::sensors::bme280::Measurement {
                temperature_c: 26.4,
                humidity_pct: 41.3,
                pressure_hpa: 1009.8,
            });
        })
    }

    fn battery_monitor(&self) -> TaskBody {
        let readings = self.readings.clone();
        Box::new(move |_| readings.publish_battery(96.5, 4.08));
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("environode v{} booting", env!("CARGO_PKG_VERSION"));

    // ── 2. Peripherals ────────────────────────────────────────
    if let Err(e) = hw_init::init_gpio() {
        // Without GPIO there is no button and no LED; halt and let the
        // watchdog reset us.
        log::error!("GPIO init failed: {e} — halting");
        #[allow(clippy::empty_loop)]
        loop {}
    }
    if let Err(e) = hw_init::init_isr_service() {
        log::error!("ISR service init failed: {e} — button disabled this boot");
    }

    // ── 3. Persisted configuration ────────────────────────────
    let mut store = match NvsStore::new() {
        Ok(s) => s,
        Err(e) => {
            warn!("NVS init failed ({e}), running with defaults and no persistence");
            NvsStore::default()
        }
    };
    let config = store.load();
    info!(
        "config: {}",
        serde_json::to_string(&config).unwrap_or_default()
    );

    let readings = Readings::new();

    // ── 4. I2C bus + task catalog, WiFi station ───────────────
    #[cfg(target_os = "espidf")]
    let (mut wifi, catalog) = {
        use esp_idf_hal::i2c::{config::Config as I2cConfig, I2cDriver};
        use esp_idf_hal::peripherals::Peripherals;
        use esp_idf_hal::units::Hertz;
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use esp_idf_svc::nvs::EspDefaultNvsPartition;
        use esp_idf_svc::wifi::EspWifi;

        let peripherals = Peripherals::take()?;
        // GPIO 6/7 per pins::I2C_SDA_GPIO / pins::I2C_SCL_GPIO.
        let i2c = I2cDriver::new(
            peripherals.i2c0,
            peripherals.pins.gpio6,
            peripherals.pins.gpio7,
            &I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ)),
        )?;
        let bus = SharedBus::new(i2c);

        let sysloop = EspSystemEventLoop::take()?;
        let nvs_partition = EspDefaultNvsPartition::take()?;
        let driver = EspWifi::new(peripherals.modem, sysloop, Some(nvs_partition))?;

        (
            WifiAdapter::new(driver),
            NodeTaskCatalog {
                bus,
                readings: readings.clone(),
            },
        )
    };

    #[cfg(not(target_os = "espidf"))]
    let (mut wifi, catalog) = (
        WifiAdapter::new(),
        SimTaskCatalog {
            readings: readings.clone(),
        },
    );

    if let Err(e) = wifi.start() {
        warn!("WiFi: station start failed ({e})");
    }
    std::thread::sleep(Duration::from_millis(WIFI_ASSOC_GRACE_MS));
    let associated = wifi.is_connected();

    // ── 5. Remaining adapters ─────────────────────────────────
    let mut device_name = heapless::String::<24>::new();
    for c in config.name.chars().take(24) {
        if device_name.push(c).is_err() {
            break;
        }
    }
    let mut ble = BleProvisioner::new(device_name);
    let mut http = HttpReporter::new();
    let mut sleep = DeepSleep::new();
    let mut sink = LogEventSink::new();
    let clock = MonotonicClock::new();
    let mut button = ButtonDriver::new(pins::BUTTON_GPIO);

    // ── 6. Supervisor ─────────────────────────────────────────
    let mut sup = Supervisor::new(catalog, readings);
    sup.start(associated, clock.uptime_ms(), &mut ble, &mut wifi, &mut sink);

    info!(
        "boot grace: {} s to press the mode button before the first cycle",
        BOOT_GRACE_MS / 1000
    );
    std::thread::sleep(Duration::from_millis(BOOT_GRACE_MS));

    // ── 7. Supervisor loop ────────────────────────────────────
    info!("entering supervisor loop ({SUPERVISOR_POLL_MS} ms poll)");
    loop {
        let now_ms = clock.uptime_ms();

        if button.poll(now_ms) {
            events::push_event(Event::ButtonPressed);
        }

        events::drain_events(|event| {
            sup.handle_event(event, now_ms, &mut ble, &mut wifi, &mut sink);
        });

        sup.poll(
            now_ms, &mut ble, &mut wifi, &mut store, &mut http, &mut sleep, &mut sink,
        );

        std::thread::sleep(Duration::from_millis(u64::from(SUPERVISOR_POLL_MS)));
    }
}
