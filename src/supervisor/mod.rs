//! Mode supervisor — the firmware's core state machine.
//!
//! One logical owner for: the current operating mode, the sensing/reporting
//! cycle, the BLE provisioning session, the LED indicator task, and the
//! deep-sleep decision.
//!
//! ```text
//!            button edge (debounced)            deadline elapsed
//!                 │                                   │
//!                 ▼                                   ▼
//!  SENSING ──────────────────────▶ PROVISIONING ──────────────▶ SENSING
//!   stop samplers                   tear down BLE (host → controller)
//!   start BLE (ctrl → host → svc)   re-query WiFi, log it
//!   restart LED (fast)              restart LED (fast)
//! ```
//!
//! The supervisor runs in the main loop at a fixed 100 ms cadence and is
//! the **sole writer** of the mode value and the task-handle slots.  Every
//! stop/start pair inside a transition is strictly sequential, so at most
//! one subsystem is being brought up or down at any instant — no locks
//! needed.  A transition that fails part-way is abandoned: the error is
//! logged, the device stays in its previous mode, and no task of the
//! target mode is left running.  The next request re-attempts from scratch.

pub mod events;
pub mod ports;
pub mod tasks;

use log::{debug, error, info, warn};

use crate::drivers::blink::{MODE_SWITCH_BLINK_MS, SENSING_BLINK_MS};
use crate::drivers::button::DEBOUNCE_WINDOW_MS;
use crate::error::Result;
use crate::events::Event;
use crate::report::Report;
use crate::sensors::Readings;

use events::NodeEvent;
use ports::{
    ConfigStore, ConnectivityPort, EventSink, ProvisioningMsg, ProvisioningPort, ReportPort,
    SleepPort,
};
use tasks::{TaskCatalog, TaskKind, TaskRegistry};

/// Supervisor poll cadence.  Doubles as the transition debounce window:
/// one pending request is honoured per poll.
pub const SUPERVISOR_POLL_MS: u32 = 100;

/// Settle window between kicking the samplers and composing the report.
pub const SETTLE_DELAY_MS: u32 = 500;

/// Inactivity deadline for provisioning mode entered automatically at
/// boot.  Manual entry has no deadline.
pub const PROVISIONING_TIMEOUT_MS: u32 = 20_000;

/// Grace delay after radio stack start/stop before the LED sequence runs,
/// so the stack state observed by callbacks has settled.
const RADIO_SETTLE_MS: u64 = 10;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Mutually exclusive operating states.  Exactly one is active; no task
/// belonging to the inactive mode may be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Measure, report over WiFi, deep-sleep.
    Sensing,
    /// Expose the BLE configuration service; sensing parked.
    Provisioning,
}

impl OperatingMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Sensing => Self::Provisioning,
            Self::Provisioning => Self::Sensing,
        }
    }
}

impl core::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Sensing => f.write_str("sensing"),
            Self::Provisioning => f.write_str("provisioning"),
        }
    }
}

/// Where the current sensing cycle stands.  Poll-driven so the supervisor
/// never blocks between its timed polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CyclePhase {
    /// No cycle started since the last mode entry.
    Idle,
    /// Samplers kicked; waiting out the settle window.
    Settling { since_ms: u32 },
    /// Report sent and deep sleep requested.  On hardware this state is
    /// never observed — the sleep call powers the core down.
    Complete,
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub struct Supervisor<C: TaskCatalog> {
    mode: OperatingMode,
    /// Sensing-mode advisory flag: cleared while provisioning so the cycle
    /// driver stays parked.
    should_sleep: bool,
    cycle: CyclePhase,
    /// Timestamp of the last honoured transition request.
    last_transition_ms: Option<u32>,
    catalog: C,
    tasks: TaskRegistry,
    readings: Readings,
}

impl<C: TaskCatalog> Supervisor<C> {
    pub fn new(catalog: C, readings: Readings) -> Self {
        Self {
            mode: OperatingMode::Sensing,
            should_sleep: true,
            cycle: CyclePhase::Idle,
            last_transition_ms: None,
            catalog,
            tasks: TaskRegistry::new(),
            readings,
        }
    }

    // ── Boot ──────────────────────────────────────────────────

    /// Decide the initial mode after the boot-time WiFi grace window.
    /// Association failed → automatic provisioning entry with the
    /// inactivity deadline armed.
    pub fn start(
        &mut self,
        wifi_associated: bool,
        now_ms: u32,
        ble: &mut impl ProvisioningPort,
        wifi: &mut impl ConnectivityPort,
        sink: &mut impl EventSink,
    ) {
        sink.emit(&NodeEvent::Started(self.mode));
        if wifi_associated {
            info!("boot: WiFi associated, staying in sensing mode");
        } else {
            warn!("boot: WiFi not associated — credentials may be missing");
            info!("boot: entering provisioning mode with {PROVISIONING_TIMEOUT_MS} ms deadline");
            self.request_transition(now_ms, true, ble, wifi, sink);
        }
    }

    // ── Event handling ────────────────────────────────────────

    /// Process one drained queue event.  Called from the main loop, which
    /// serialises all requests through this single task.
    pub fn handle_event(
        &mut self,
        event: Event,
        now_ms: u32,
        ble: &mut impl ProvisioningPort,
        wifi: &mut impl ConnectivityPort,
        sink: &mut impl EventSink,
    ) {
        match event {
            Event::ButtonPressed => {
                info!("button: mode switch requested");
                self.request_transition(now_ms, false, ble, wifi, sink);
            }
            Event::ProvisioningDeadline => {
                // Only honoured while the armed deadline is still the
                // active owner of provisioning mode; a stale event after a
                // manual switch is dropped.
                if self.mode == OperatingMode::Provisioning
                    && self.tasks.is_registered(TaskKind::ProvisioningTimeout)
                {
                    info!("provisioning: inactivity deadline elapsed");
                    self.request_transition(now_ms, false, ble, wifi, sink);
                }
            }
            Event::BleConnected => info!("BLE: central connected"),
            Event::BleDisconnected => info!("BLE: central disconnected"),
            // Payloads are drained from the provisioning channel in poll().
            Event::ProvisioningData => {}
            Event::WifiConnected => info!("WiFi: station associated"),
            Event::WifiDisconnected => warn!("WiFi: station disconnected"),
            Event::WifiGotIp => info!("WiFi: got IP"),
        }
    }

    // ── Steady-state poll ─────────────────────────────────────

    /// One supervisor poll: drain provisioning messages, drive WiFi
    /// bookkeeping, and advance the sensing cycle when due.
    pub fn poll(
        &mut self,
        now_ms: u32,
        ble: &mut impl ProvisioningPort,
        wifi: &mut impl ConnectivityPort,
        store: &mut impl ConfigStore,
        http: &mut impl ReportPort,
        sleep: &mut impl SleepPort,
        sink: &mut impl EventSink,
    ) {
        while let Some(msg) = ble.poll_message() {
            self.on_provisioning_msg(msg, ble, wifi, store, sink);
        }

        wifi.poll();

        if self.mode == OperatingMode::Sensing && self.should_sleep {
            self.sensing_cycle(now_ms, store, http, sleep, sink);
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn should_sleep(&self) -> bool {
        self.should_sleep
    }

    /// Whether the automatic-entry inactivity deadline is armed.
    pub fn is_deadline_armed(&self) -> bool {
        self.tasks.is_registered(TaskKind::ProvisioningTimeout)
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    // ── Transitions ───────────────────────────────────────────

    /// Honour at most one transition request per debounce window, then run
    /// the target mode's entry sequence.  On failure the mode is left
    /// unchanged and the next request re-attempts from scratch.
    fn request_transition(
        &mut self,
        now_ms: u32,
        arm_deadline: bool,
        ble: &mut impl ProvisioningPort,
        wifi: &mut impl ConnectivityPort,
        sink: &mut impl EventSink,
    ) {
        if let Some(last) = self.last_transition_ms {
            if now_ms.wrapping_sub(last) < DEBOUNCE_WINDOW_MS {
                debug!("supervisor: request inside debounce window, dropped");
                return;
            }
        }
        self.last_transition_ms = Some(now_ms);

        let from = self.mode;
        let target = from.toggled();
        let result = match target {
            OperatingMode::Provisioning => self.enter_provisioning(arm_deadline, ble),
            OperatingMode::Sensing => self.enter_sensing(ble, wifi),
        };

        match result {
            Ok(()) => {
                self.mode = target;
                info!("switched to {target} mode");
                sink.emit(&NodeEvent::ModeChanged { from, to: target });
            }
            Err(e) => {
                error!("supervisor: transition to {target} abandoned ({e})");
                sink.emit(&NodeEvent::TransitionAbandoned { target });
            }
        }
    }

    /// Sensing → provisioning entry sequence, strict order: samplers off
    /// the bus first, then the radio stack up, then the indicator.
    fn enter_provisioning(
        &mut self,
        arm_deadline: bool,
        ble: &mut impl ProvisioningPort,
    ) -> Result<()> {
        self.tasks.stop(TaskKind::EnvSampler);
        self.tasks.stop(TaskKind::BatteryMonitor);

        ble.start()?;
        std::thread::sleep(std::time::Duration::from_millis(RADIO_SETTLE_MS));

        if arm_deadline {
            let body = self.catalog.provisioning_timeout(PROVISIONING_TIMEOUT_MS);
            self.tasks.start(TaskKind::ProvisioningTimeout, body);
        }

        self.should_sleep = false;
        self.cycle = CyclePhase::Idle;
        self.tasks
            .restart_led(self.catalog.led_blinker(MODE_SWITCH_BLINK_MS));
        Ok(())
    }

    /// Provisioning → sensing entry sequence.  The adapter tears the stack
    /// down host-first; only a clean teardown lets the mode flip.
    fn enter_sensing(
        &mut self,
        ble: &mut impl ProvisioningPort,
        wifi: &mut impl ConnectivityPort,
    ) -> Result<()> {
        ble.stop()?;
        std::thread::sleep(std::time::Duration::from_millis(RADIO_SETTLE_MS));

        if wifi.is_connected() {
            info!("WiFi: station is associated");
        } else {
            warn!("WiFi: station is not associated");
        }

        self.tasks.stop(TaskKind::ProvisioningTimeout);
        self.should_sleep = true;
        self.cycle = CyclePhase::Idle;
        self.tasks
            .restart_led(self.catalog.led_blinker(MODE_SWITCH_BLINK_MS));
        Ok(())
    }

    // ── Provisioning traffic ──────────────────────────────────

    fn on_provisioning_msg(
        &mut self,
        msg: ProvisioningMsg,
        ble: &mut impl ProvisioningPort,
        wifi: &mut impl ConnectivityPort,
        store: &mut impl ConfigStore,
        sink: &mut impl EventSink,
    ) {
        match msg {
            ProvisioningMsg::Connected => info!("provisioning: central connected"),
            ProvisioningMsg::Disconnected => info!("provisioning: central disconnected"),
            ProvisioningMsg::Credentials { ssid, password } => {
                info!("provisioning: credentials received for '{ssid}'");
                match wifi.set_credentials(ssid.as_str(), password.as_str()) {
                    Ok(()) => {
                        if let Err(e) = wifi.connect() {
                            warn!("WiFi: connect with new credentials failed ({e})");
                        }
                    }
                    Err(e) => warn!("provisioning: credentials rejected ({e})"),
                }
            }
            ProvisioningMsg::Custom { field, value } => {
                // Each field persists independently; a failure is a no-op.
                match store.store_field(field, value.as_str()) {
                    Ok(()) => {
                        info!("provisioning: stored {field} ({} bytes)", value.len());
                        sink.emit(&NodeEvent::ConfigStored(field));
                    }
                    Err(e) => warn!("provisioning: storing {field} failed ({e})"),
                }
            }
            ProvisioningMsg::StatusRequest => {
                ble.report_wifi_status(wifi.is_connected());
            }
            ProvisioningMsg::ApListRequest => wifi.request_scan(),
            ProvisioningMsg::Fault(code) => warn!("provisioning: stack error {code}"),
        }
    }

    // ── Sensing cycle ─────────────────────────────────────────

    /// Poll-driven sensing cycle: kick samplers → settle → compose and
    /// send the report → request deep sleep.  Deep sleep is a full reset,
    /// so one cycle per boot is the steady state.
    fn sensing_cycle(
        &mut self,
        now_ms: u32,
        store: &mut impl ConfigStore,
        http: &mut impl ReportPort,
        sleep: &mut impl SleepPort,
        sink: &mut impl EventSink,
    ) {
        match self.cycle {
            CyclePhase::Idle => {
                self.tasks
                    .restart_led(self.catalog.led_blinker(SENSING_BLINK_MS));
                self.tasks.start(TaskKind::EnvSampler, self.catalog.env_sampler());
                self.tasks
                    .start(TaskKind::BatteryMonitor, self.catalog.battery_monitor());
                self.cycle = CyclePhase::Settling { since_ms: now_ms };
            }
            CyclePhase::Settling { since_ms } => {
                if now_ms.wrapping_sub(since_ms) < SETTLE_DELAY_MS {
                    return;
                }

                let config = store.load();
                let snapshot = self.readings.snapshot();
                let report = Report::compose(&config, &snapshot);

                info!(
                    "report: {} / {:.2} / {:.3} / {:.2}",
                    report.device_name,
                    report.temperature_c,
                    report.humidity_pct,
                    report.charge_pct
                );

                match http.send(config.uri.as_str(), &report) {
                    Ok(()) => sink.emit(&NodeEvent::ReportSent {
                        temperature_c: report.temperature_c,
                        humidity_pct: report.humidity_pct,
                        charge_pct: report.charge_pct,
                    }),
                    Err(e) => {
                        error!("HTTP: report failed ({e}), skipped");
                        sink.emit(&NodeEvent::ReportFailed);
                    }
                }

                info!(
                    "config: name:{} / uri:{} / deep-sleep timer:{}",
                    config.name, config.uri, config.timer
                );

                let minutes = config.sleep_minutes();
                let duration_us = config.sleep_duration_us();
                info!("entering deep sleep for {minutes} minutes");
                sink.emit(&NodeEvent::DeepSleepScheduled {
                    minutes,
                    duration_us,
                });

                // On hardware the next line powers the core down; the
                // phase below is only ever observed in simulation.
                self.cycle = CyclePhase::Complete;
                sleep.request_deep_sleep(duration_us);
            }
            CyclePhase::Complete => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod mock {
    use super::ports::*;
    use super::*;
    use crate::config::{ConfigField, DeviceConfig};
    use crate::error::{NetError, RadioError, StorageError};
    use core::result::Result;
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Catalog whose sampler bodies flag a shared "running" latch; lets
    /// tests observe whether a sensing-mode task is alive at any point.
    pub struct StubCatalog {
        pub sampler_running: Arc<AtomicBool>,
    }

    impl StubCatalog {
        pub fn new() -> Self {
            Self {
                sampler_running: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl TaskCatalog for StubCatalog {
        fn env_sampler(&self) -> tasks::TaskBody {
            let running = self.sampler_running.clone();
            Box::new(move |cancel| {
                running.store(true, Ordering::SeqCst);
                while !cancel.is_cancelled() {
                    std::thread::sleep(std::time::Duration::from_millis(2));
                }
                running.store(false, Ordering::SeqCst);
            })
        }

        fn battery_monitor(&self) -> tasks::TaskBody {
            Box::new(|_| {})
        }

        fn led_blinker(&self, _half_period_ms: u32) -> tasks::TaskBody {
            Box::new(|_| {})
        }

        fn provisioning_timeout(&self, _timeout_ms: u32) -> tasks::TaskBody {
            // Tests inject the deadline event themselves.
            Box::new(|cancel| {
                while !cancel.is_cancelled() {
                    std::thread::sleep(std::time::Duration::from_millis(2));
                }
            })
        }
    }

    #[derive(Default)]
    pub struct MockBle {
        pub active: bool,
        pub fail_next_start: Option<RadioError>,
        pub fail_next_stop: Option<RadioError>,
        pub queue: VecDeque<ProvisioningMsg>,
        pub starts: usize,
        pub stops: usize,
        pub status_reports: Vec<bool>,
        /// Latch shared with StubCatalog: records whether a sampler was
        /// alive at the moment the radio stack came up.
        pub sampler_running_at_start: Option<bool>,
        pub sampler_latch: Option<Arc<AtomicBool>>,
    }

    impl ProvisioningPort for MockBle {
        fn start(&mut self) -> Result<(), RadioError> {
            self.starts += 1;
            if let Some(latch) = &self.sampler_latch {
                self.sampler_running_at_start = Some(latch.load(Ordering::SeqCst));
            }
            if let Some(e) = self.fail_next_start.take() {
                return Err(e);
            }
            self.active = true;
            Ok(())
        }

        fn stop(&mut self) -> Result<(), RadioError> {
            self.stops += 1;
            if let Some(e) = self.fail_next_stop.take() {
                return Err(e);
            }
            self.active = false;
            Ok(())
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn poll_message(&mut self) -> Option<ProvisioningMsg> {
            self.queue.pop_front()
        }

        fn report_wifi_status(&mut self, connected: bool) {
            self.status_reports.push(connected);
        }
    }

    #[derive(Default)]
    pub struct MockWifi {
        pub connected: bool,
        pub credentials: Option<(String, String)>,
        pub connects: usize,
        pub scans: usize,
    }

    impl ConnectivityPort for MockWifi {
        fn connect(&mut self) -> Result<(), NetError> {
            self.connects += 1;
            if self.credentials.is_none() {
                return Err(NetError::NoCredentials);
            }
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), NetError> {
            if ssid.is_empty() {
                return Err(NetError::InvalidSsid);
            }
            self.credentials = Some((ssid.to_string(), password.to_string()));
            Ok(())
        }

        fn request_scan(&mut self) {
            self.scans += 1;
        }

        fn poll(&mut self) {}
    }

    #[derive(Default)]
    pub struct MockStore {
        pub config: DeviceConfig,
        pub fail_writes: bool,
        pub writes: Vec<(ConfigField, String)>,
    }

    impl ConfigStore for MockStore {
        fn load(&self) -> DeviceConfig {
            self.config.clone()
        }

        fn store_field(&mut self, field: ConfigField, value: &str) -> Result<(), StorageError> {
            if self.fail_writes {
                return Err(StorageError::IoError);
            }
            self.config.set_field(field, value)?;
            self.writes.push((field, value.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockHttp {
        pub sent: Vec<(String, String)>,
        pub fail: bool,
    }

    impl ReportPort for MockHttp {
        fn send(&mut self, uri: &str, report: &Report) -> Result<(), NetError> {
            if self.fail {
                return Err(NetError::HttpSend);
            }
            self.sent.push((uri.to_string(), report.body().to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockSleep {
        pub requests: Vec<u64>,
    }

    impl SleepPort for MockSleep {
        fn request_deep_sleep(&mut self, duration_us: u64) {
            self.requests.push(duration_us);
        }
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Vec<NodeEvent>,
    }

    impl EventSink for RecordingSink {
        fn emit(&mut self, event: &NodeEvent) {
            self.events.push(event.clone());
        }
    }
}
