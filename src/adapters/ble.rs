//! BLE provisioning adapter.
//!
//! Implements [`ProvisioningPort`] — the boundary for the credential-
//! provisioning service a phone app talks to while the device is in
//! provisioning mode.  Wire encoding, encryption negotiation, and GATT
//! plumbing stay in this file; the supervisor only starts/stops the stack
//! and drains [`ProvisioningMsg`]s.
//!
//! ## Lifecycle ordering
//!
//! `start` brings the stack up controller-first (controller init → enable →
//! host init → enable → service/GAP registration).  Every failing step
//! rolls the earlier steps back before the error is returned, so an
//! abandoned transition never leaves a half-initialised radio.  `stop`
//! tears down host-first — the host must release protocol resources before
//! the controller is disabled.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                      | Perms        |
//! |----------------|---------------------------|--------------|
//! | WiFi SSID      | `9a3f0002-…-c4b58a31e0f2` | Write        |
//! | WiFi Password  | `9a3f0003-…-c4b58a31e0f2` | Write        |
//! | Custom Data    | `9a3f0004-…-c4b58a31e0f2` | Write        |
//! | WiFi Status    | `9a3f0010-…-c4b58a31e0f2` | Read+Notify  |
//!
//! Custom data carries `name:` / `uri:` / `timer:` prefixed UTF-8 values
//! (up to 256 bytes); unknown prefixes are logged and dropped.  Writes are
//! surfaced to the supervisor through a bounded channel; Bluedroid
//! callbacks only parse, enqueue, and return.

use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use crate::config::ConfigField;
use crate::error::RadioError;
use crate::events::{push_event, Event};
use crate::supervisor::ports::{ProvisioningMsg, ProvisioningPort};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x9a3f0001_2e84_4c5d_8f06_c4b58a31e0f2;
pub const CHAR_WIFI_SSID: u128 = 0x9a3f0002_2e84_4c5d_8f06_c4b58a31e0f2;
pub const CHAR_WIFI_PASS: u128 = 0x9a3f0003_2e84_4c5d_8f06_c4b58a31e0f2;
pub const CHAR_CUSTOM_DATA: u128 = 0x9a3f0004_2e84_4c5d_8f06_c4b58a31e0f2;
pub const CHAR_WIFI_STATUS: u128 = 0x9a3f0010_2e84_4c5d_8f06_c4b58a31e0f2;

const MAX_SSID_LEN: usize = 32;
const MAX_PASSWORD_LEN: usize = 64;
const MIN_WPA2_PASSWORD_LEN: usize = 8;
/// Provisioning custom-data limit; longer writes are truncated, matching
/// the protocol's fixed buffer.
const MAX_CUSTOM_LEN: usize = crate::config::MAX_NAME_LEN;

/// Depth of the callback → supervisor message channel.
const PROV_QUEUE_DEPTH: usize = 8;

// ───────────────────────────────────────────────────────────────
// Write validation
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    DataTooLong,
    InvalidUtf8,
    InvalidSsid,
    InvalidPassword,
    SsidMissing,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataTooLong => write!(f, "write exceeds characteristic length"),
            Self::InvalidUtf8 => write!(f, "write contains invalid UTF-8"),
            Self::InvalidSsid => write!(f, "SSID invalid (1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (8-64 bytes or empty)"),
            Self::SsidMissing => write!(f, "password written before SSID"),
        }
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn sanitize_write(raw: &[u8], max_len: usize) -> Result<&str, WriteError> {
    if raw.len() > max_len {
        return Err(WriteError::DataTooLong);
    }
    core::str::from_utf8(raw).map_err(|_| WriteError::InvalidUtf8)
}

// ───────────────────────────────────────────────────────────────
// Callback → supervisor bridge
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture the
// adapter.  Writes are parsed in callback context and enqueued here; the
// supervisor drains the channel at its poll cadence.

static PROV_QUEUE: Channel<CriticalSectionRawMutex, ProvisioningMsg, PROV_QUEUE_DEPTH> =
    Channel::new();

/// SSID stash: credentials arrive as two writes (SSID, then password);
/// the pair is emitted on the password write.
static STASHED_SSID: std::sync::Mutex<Option<heapless::String<MAX_SSID_LEN>>> =
    std::sync::Mutex::new(None);

fn enqueue(msg: ProvisioningMsg) {
    if PROV_QUEUE.try_send(msg).is_err() {
        warn!("BLE: provisioning queue full, message dropped");
        return;
    }
    push_event(Event::ProvisioningData);
}

fn stash_lock() -> std::sync::MutexGuard<'static, Option<heapless::String<MAX_SSID_LEN>>> {
    STASHED_SSID.lock().unwrap_or_else(|e| e.into_inner())
}

/// SSID characteristic write: validate and stash.
fn on_ssid_write(raw: &[u8]) -> Result<(), WriteError> {
    let s = sanitize_write(raw, MAX_SSID_LEN)?;
    if s.is_empty() || !is_printable_ascii(s) {
        return Err(WriteError::InvalidSsid);
    }
    let mut ssid = heapless::String::new();
    ssid.push_str(s).map_err(|()| WriteError::InvalidSsid)?;
    *stash_lock() = Some(ssid);
    info!("BLE: SSID written ({} bytes)", s.len());
    Ok(())
}

/// Password characteristic write: validate, pair with the stashed SSID,
/// and emit [`ProvisioningMsg::Credentials`].
fn on_password_write(raw: &[u8]) -> Result<(), WriteError> {
    let s = sanitize_write(raw, MAX_PASSWORD_LEN)?;
    if !s.is_empty() && (s.len() < MIN_WPA2_PASSWORD_LEN || !is_printable_ascii(s)) {
        return Err(WriteError::InvalidPassword);
    }
    let Some(ssid) = stash_lock().take() else {
        return Err(WriteError::SsidMissing);
    };
    let mut password = heapless::String::new();
    password.push_str(s).map_err(|()| WriteError::InvalidPassword)?;
    info!("BLE: password written, credentials complete for '{ssid}'");
    enqueue(ProvisioningMsg::Credentials { ssid, password });
    Ok(())
}

/// Custom-data characteristic write: truncate to the protocol limit,
/// parse the `name:` / `uri:` / `timer:` prefix, and emit
/// [`ProvisioningMsg::Custom`].  Unknown prefixes are logged and dropped.
fn on_custom_write(raw: &[u8]) {
    let raw = if raw.len() > MAX_CUSTOM_LEN {
        &raw[..MAX_CUSTOM_LEN]
    } else {
        raw
    };
    let Ok(s) = core::str::from_utf8(raw) else {
        warn!("BLE: custom data is not valid UTF-8, dropped");
        return;
    };
    match ConfigField::parse_custom(s) {
        Some((field, value)) => {
            let mut buf = heapless::String::new();
            // Cannot overflow: value is shorter than the truncated input.
            let _ = buf.push_str(value);
            info!("BLE: received {field} ({} bytes)", value.len());
            enqueue(ProvisioningMsg::Custom { field, value: buf });
        }
        None => warn!("BLE: unknown custom data format: '{s}'"),
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF Bluedroid backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod bluedroid {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};
    use esp_idf_svc::sys::*;

    pub static GATTS_IF: AtomicU32 = AtomicU32::new(0);
    pub static CONN_ID: AtomicU32 = AtomicU32::new(0);
    pub static SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
    pub static SSID_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
    pub static PASS_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
    pub static CUSTOM_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
    pub static STATUS_CHAR_HANDLE: AtomicU32 = AtomicU32::new(0);
    static CHAR_STEP: AtomicU32 = AtomicU32::new(0);

    fn uuid128_to_esp(uuid: u128) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = 16;
        unsafe {
            t.uuid.uuid128 = uuid.to_le_bytes();
        }
        t
    }

    unsafe fn add_gatt_char(svc_handle: u16, uuid: u128, perm: u32, prop: u32) {
        let mut char_uuid = uuid128_to_esp(uuid);
        unsafe {
            esp_ble_gatts_add_char(
                svc_handle,
                &mut char_uuid,
                perm as esp_gatt_perm_t,
                prop as esp_gatt_char_prop_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    fn adv_params() -> esp_ble_adv_params_t {
        esp_ble_adv_params_t {
            adv_int_min: 0x20,
            adv_int_max: 0x40,
            adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
            adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
            ..unsafe { core::mem::zeroed() }
        }
    }

    pub unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising started");
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
                log::info!("BLE GAP: advertising stopped");
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_lines)]
    pub unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        GATTS_IF.store(gatts_if as u32, Ordering::Relaxed);

        // SAFETY: param points at the event union Bluedroid hands us; only
        // the variant matching the event is read.
        unsafe {
        match event {
            esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                log::info!("BLE GATTS: app registered (if={})", gatts_if);
                let mut svc_id = esp_gatt_srvc_id_t {
                    id: esp_gatt_id_t {
                        uuid: uuid128_to_esp(SERVICE_UUID),
                        inst_id: 0,
                    },
                    is_primary: true,
                };
                esp_ble_gatts_create_service(gatts_if, &mut svc_id, 12);
            }
            esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                let p = &(*param).create;
                let svc_handle = p.service_handle;
                SVC_HANDLE.store(svc_handle as u32, Ordering::Relaxed);
                log::info!("BLE GATTS: service created (handle={})", svc_handle);
                esp_ble_gatts_start_service(svc_handle);
                CHAR_STEP.store(1, Ordering::Relaxed);
                add_gatt_char(
                    svc_handle,
                    CHAR_WIFI_SSID,
                    ESP_GATT_PERM_WRITE,
                    ESP_GATT_CHAR_PROP_BIT_WRITE,
                );
            }
            esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                let p = &(*param).add_char;
                let handle = p.attr_handle;
                let svc_handle = SVC_HANDLE.load(Ordering::Relaxed) as u16;
                match CHAR_STEP.load(Ordering::Relaxed) {
                    1 => {
                        SSID_CHAR_HANDLE.store(handle as u32, Ordering::Relaxed);
                        CHAR_STEP.store(2, Ordering::Relaxed);
                        add_gatt_char(
                            svc_handle,
                            CHAR_WIFI_PASS,
                            ESP_GATT_PERM_WRITE,
                            ESP_GATT_CHAR_PROP_BIT_WRITE,
                        );
                    }
                    2 => {
                        PASS_CHAR_HANDLE.store(handle as u32, Ordering::Relaxed);
                        CHAR_STEP.store(3, Ordering::Relaxed);
                        add_gatt_char(
                            svc_handle,
                            CHAR_CUSTOM_DATA,
                            ESP_GATT_PERM_WRITE,
                            ESP_GATT_CHAR_PROP_BIT_WRITE,
                        );
                    }
                    3 => {
                        CUSTOM_CHAR_HANDLE.store(handle as u32, Ordering::Relaxed);
                        CHAR_STEP.store(4, Ordering::Relaxed);
                        add_gatt_char(
                            svc_handle,
                            CHAR_WIFI_STATUS,
                            ESP_GATT_PERM_READ,
                            ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
                        );
                    }
                    4 => {
                        STATUS_CHAR_HANDLE.store(handle as u32, Ordering::Relaxed);
                        CHAR_STEP.store(5, Ordering::Relaxed);
                        log::info!("BLE GATTS: all characteristics registered");
                    }
                    _ => {}
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                let p = &(*param).connect;
                CONN_ID.store(p.conn_id as u32, Ordering::Relaxed);
                enqueue(ProvisioningMsg::Connected);
                push_event(Event::BleConnected);
            }
            esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                CONN_ID.store(0, Ordering::Relaxed);
                enqueue(ProvisioningMsg::Disconnected);
                push_event(Event::BleDisconnected);
                // Re-advertise for the next central.
                let mut params = adv_params();
                esp_ble_gap_start_advertising(&mut params);
            }
            esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
                let p = &(*param).read;
                if p.handle as u32 == STATUS_CHAR_HANDLE.load(Ordering::Relaxed) {
                    enqueue(ProvisioningMsg::StatusRequest);
                }
            }
            esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                let p = &(*param).write;
                let handle = p.handle as u32;
                let data = core::slice::from_raw_parts(p.value, p.len as usize);

                if handle == SSID_CHAR_HANDLE.load(Ordering::Relaxed) {
                    if let Err(e) = on_ssid_write(data) {
                        log::warn!("BLE: SSID write rejected ({e})");
                    }
                } else if handle == PASS_CHAR_HANDLE.load(Ordering::Relaxed) {
                    if let Err(e) = on_password_write(data) {
                        log::warn!("BLE: password write rejected ({e})");
                    }
                } else if handle == CUSTOM_CHAR_HANDLE.load(Ordering::Relaxed) {
                    on_custom_write(data);
                }
            }
            _ => {}
        }
        }
    }

    /// Bring the stack up, rolling back earlier steps on any failure.
    pub fn start(device_name: &str) -> Result<(), RadioError> {
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            if esp_bt_controller_init(&mut bt_cfg) != ESP_OK {
                return Err(RadioError::ControllerInit);
            }
            if esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE) != ESP_OK {
                esp_bt_controller_deinit();
                return Err(RadioError::ControllerEnable);
            }
            if esp_bluedroid_init() != ESP_OK {
                esp_bt_controller_disable();
                esp_bt_controller_deinit();
                return Err(RadioError::HostInit);
            }
            if esp_bluedroid_enable() != ESP_OK {
                esp_bluedroid_deinit();
                esp_bt_controller_disable();
                esp_bt_controller_deinit();
                return Err(RadioError::HostEnable);
            }

            let rc_gap = esp_ble_gap_register_callback(Some(gap_event_handler));
            let rc_gatts = esp_ble_gatts_register_callback(Some(gatts_event_handler));
            let rc_app = esp_ble_gatts_app_register(0);
            if rc_gap != ESP_OK || rc_gatts != ESP_OK || rc_app != ESP_OK {
                esp_bluedroid_disable();
                esp_bluedroid_deinit();
                esp_bt_controller_disable();
                esp_bt_controller_deinit();
                return Err(RadioError::ServiceRegistration);
            }

            let name = std::ffi::CString::new(device_name).unwrap_or_default();
            esp_ble_gap_set_device_name(name.as_ptr());
            let mut params = adv_params();
            esp_ble_gap_start_advertising(&mut params);
        }
        Ok(())
    }

    /// Tear the stack down: host first, controller second.
    pub fn stop() -> Result<(), RadioError> {
        unsafe {
            esp_ble_gap_stop_advertising();

            if esp_bluedroid_disable() != ESP_OK {
                return Err(RadioError::HostDeinit);
            }
            if esp_bluedroid_deinit() != ESP_OK {
                return Err(RadioError::HostDeinit);
            }
            if esp_bt_controller_disable() != ESP_OK {
                return Err(RadioError::ControllerDeinit);
            }
            if esp_bt_controller_deinit() != ESP_OK {
                return Err(RadioError::ControllerDeinit);
            }
        }
        Ok(())
    }

    /// Notify the WiFi status characteristic.
    pub fn notify_status(payload: &str) {
        unsafe {
            let handle = STATUS_CHAR_HANDLE.load(Ordering::Relaxed);
            let conn = CONN_ID.load(Ordering::Relaxed);
            if handle != 0 && conn != 0 {
                esp_ble_gatts_send_indicate(
                    GATTS_IF.load(Ordering::Relaxed) as u8,
                    conn as u16,
                    handle as u16,
                    payload.len() as u16,
                    payload.as_ptr() as *mut u8,
                    false,
                );
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Adapter state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
    Connected,
}

pub struct BleProvisioner {
    state: BleState,
    device_name: heapless::String<24>,
    /// Simulation: scripted failure for the next `start()`.
    #[cfg(not(target_os = "espidf"))]
    sim_fail_next_start: Option<RadioError>,
    /// Simulation: scripted failure for the next `stop()`.
    #[cfg(not(target_os = "espidf"))]
    sim_fail_next_stop: Option<RadioError>,
    /// Simulation: last status pushed to the central.
    #[cfg(not(target_os = "espidf"))]
    sim_last_status: Option<bool>,
}

impl BleProvisioner {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            state: BleState::Idle,
            device_name,
            #[cfg(not(target_os = "espidf"))]
            sim_fail_next_start: None,
            #[cfg(not(target_os = "espidf"))]
            sim_fail_next_stop: None,
            #[cfg(not(target_os = "espidf"))]
            sim_last_status: None,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self) -> Result<(), RadioError> {
        bluedroid::start(self.device_name.as_str())?;
        info!("BLE(espidf): stack up, advertising as '{}'", self.device_name);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self) -> Result<(), RadioError> {
        if let Some(e) = self.sim_fail_next_start.take() {
            return Err(e);
        }
        info!(
            "BLE(sim): advertising '{}' (service {:032x})",
            self.device_name, SERVICE_UUID
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&mut self) -> Result<(), RadioError> {
        bluedroid::stop()?;
        info!("BLE(espidf): stack shut down");
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&mut self) -> Result<(), RadioError> {
        if let Some(e) = self.sim_fail_next_stop.take() {
            return Err(e);
        }
        info!("BLE(sim): stopped");
        Ok(())
    }

    // ── Simulation hooks (host tests drive the callback paths) ─

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_start(&mut self, e: RadioError) {
        self.sim_fail_next_start = Some(e);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_stop(&mut self, e: RadioError) {
        self.sim_fail_next_stop = Some(e);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_central_connected(&mut self) {
        self.state = BleState::Connected;
        enqueue(ProvisioningMsg::Connected);
        push_event(Event::BleConnected);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_central_disconnected(&mut self) {
        if self.state == BleState::Connected {
            self.state = BleState::Advertising;
        }
        enqueue(ProvisioningMsg::Disconnected);
        push_event(Event::BleDisconnected);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_write_ssid(&mut self, raw: &[u8]) -> Result<(), WriteError> {
        on_ssid_write(raw)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_write_password(&mut self, raw: &[u8]) -> Result<(), WriteError> {
        on_password_write(raw)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_write_custom(&mut self, raw: &[u8]) {
        on_custom_write(raw);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_request_status(&mut self) {
        enqueue(ProvisioningMsg::StatusRequest);
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_last_status(&self) -> Option<bool> {
        self.sim_last_status
    }
}

// ───────────────────────────────────────────────────────────────
// ProvisioningPort
// ───────────────────────────────────────────────────────────────

impl ProvisioningPort for BleProvisioner {
    fn start(&mut self) -> Result<(), RadioError> {
        self.platform_start().inspect_err(|e| {
            warn!("BLE: stack start failed ({e}), rolled back");
        })?;
        self.state = BleState::Advertising;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.platform_stop().inspect_err(|e| {
            warn!("BLE: stack stop failed ({e})");
        })?;
        self.state = BleState::Idle;
        *stash_lock() = None;
        // Anything still queued belongs to the closed session.
        while PROV_QUEUE.try_receive().is_ok() {}
        info!("BLE: stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        matches!(self.state, BleState::Advertising | BleState::Connected)
    }

    fn poll_message(&mut self) -> Option<ProvisioningMsg> {
        PROV_QUEUE.try_receive().ok()
    }

    fn report_wifi_status(&mut self, connected: bool) {
        let payload: &str = if connected { "connected" } else { "disconnected" };
        #[cfg(target_os = "espidf")]
        bluedroid::notify_status(payload);
        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_last_status = Some(connected);
            info!("BLE(sim): status notified — {payload}");
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Channel and SSID stash are process-wide; serialise the tests.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn make_adapter() -> BleProvisioner {
        *stash_lock() = None;
        while PROV_QUEUE.try_receive().is_ok() {}
        let mut name = heapless::String::new();
        name.push_str("environode-test").ok();
        BleProvisioner::new(name)
    }

    #[test]
    fn start_stop_lifecycle() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        assert_eq!(ble.state(), BleState::Idle);
        assert!(!ble.is_active());
        ble.start().unwrap();
        assert!(ble.is_active());
        ble.stop().unwrap();
        assert_eq!(ble.state(), BleState::Idle);
    }

    #[test]
    fn failed_start_stays_idle() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.sim_fail_next_start(RadioError::HostInit);
        assert_eq!(ble.start(), Err(RadioError::HostInit));
        assert!(!ble.is_active());
        // The next attempt is clean.
        ble.start().unwrap();
        assert!(ble.is_active());
        ble.stop().unwrap();
    }

    #[test]
    fn failed_stop_keeps_stack_active() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.start().unwrap();
        ble.sim_fail_next_stop(RadioError::ControllerDeinit);
        assert_eq!(ble.stop(), Err(RadioError::ControllerDeinit));
        assert!(ble.is_active());
        ble.stop().unwrap();
    }

    #[test]
    fn ssid_then_password_yields_credentials() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.start().unwrap();
        ble.sim_write_ssid(b"HomeWiFi").unwrap();
        ble.sim_write_password(b"hunter22").unwrap();

        match ble.poll_message() {
            Some(ProvisioningMsg::Credentials { ssid, password }) => {
                assert_eq!(ssid.as_str(), "HomeWiFi");
                assert_eq!(password.as_str(), "hunter22");
            }
            other => panic!("expected credentials, got {other:?}"),
        }
        assert!(ble.poll_message().is_none());
        ble.stop().unwrap();
    }

    #[test]
    fn password_before_ssid_rejected() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.start().unwrap();
        assert_eq!(ble.sim_write_password(b"password1"), Err(WriteError::SsidMissing));
        assert!(ble.poll_message().is_none());
        ble.stop().unwrap();
    }

    #[test]
    fn empty_password_means_open_network() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.start().unwrap();
        ble.sim_write_ssid(b"OpenCafe").unwrap();
        ble.sim_write_password(b"").unwrap();
        match ble.poll_message() {
            Some(ProvisioningMsg::Credentials { password, .. }) => {
                assert!(password.is_empty());
            }
            other => panic!("expected credentials, got {other:?}"),
        }
        ble.stop().unwrap();
    }

    #[test]
    fn rejects_invalid_ssid_writes() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        assert_eq!(ble.sim_write_ssid(b""), Err(WriteError::InvalidSsid));
        assert_eq!(ble.sim_write_ssid(&[b'A'; 33]), Err(WriteError::DataTooLong));
        assert_eq!(
            ble.sim_write_ssid(&[0xFF, 0xFE]),
            Err(WriteError::InvalidUtf8)
        );
    }

    #[test]
    fn custom_write_parses_uri() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.sim_write_custom(b"uri:192.168.1.10");
        match ble.poll_message() {
            Some(ProvisioningMsg::Custom { field, value }) => {
                assert_eq!(field, ConfigField::Uri);
                assert_eq!(value.as_str(), "192.168.1.10");
            }
            other => panic!("expected custom, got {other:?}"),
        }
    }

    #[test]
    fn custom_write_unknown_prefix_dropped() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.sim_write_custom(b"ssid:whatever");
        assert!(ble.poll_message().is_none());
    }

    #[test]
    fn oversize_custom_write_truncated() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        let mut data = b"name:".to_vec();
        data.extend(std::iter::repeat_n(b'x', 400));
        ble.sim_write_custom(&data);
        match ble.poll_message() {
            Some(ProvisioningMsg::Custom { field, value }) => {
                assert_eq!(field, ConfigField::Name);
                assert_eq!(value.len(), MAX_CUSTOM_LEN - "name:".len());
            }
            other => panic!("expected custom, got {other:?}"),
        }
    }

    #[test]
    fn stop_clears_stash_and_queue() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.start().unwrap();
        ble.sim_write_ssid(b"Net").unwrap();
        ble.sim_write_custom(b"timer:45");
        ble.stop().unwrap();

        assert!(ble.poll_message().is_none());
        // Stash was dropped: a fresh password write has no SSID to pair.
        assert_eq!(ble.sim_write_password(b"password1"), Err(WriteError::SsidMissing));
    }

    #[test]
    fn connect_disconnect_messages_flow() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.start().unwrap();
        ble.sim_central_connected();
        assert_eq!(ble.state(), BleState::Connected);
        ble.sim_central_disconnected();
        assert_eq!(ble.state(), BleState::Advertising);
        assert_eq!(ble.poll_message(), Some(ProvisioningMsg::Connected));
        assert_eq!(ble.poll_message(), Some(ProvisioningMsg::Disconnected));
        ble.stop().unwrap();
    }

    #[test]
    fn status_report_recorded() {
        let _guard = TEST_LOCK.lock().unwrap();
        let mut ble = make_adapter();
        ble.start().unwrap();
        ble.report_wifi_status(true);
        assert_eq!(ble.sim_last_status(), Some(true));
        ble.stop().unwrap();
    }
}
