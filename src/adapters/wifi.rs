//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`] — the boundary the supervisor uses for
//! network connectivity.  Association internals stay here: credential
//! validation, the bounded reconnect policy, and the station state.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi` station
//!   driver; association status is queried from the driver itself.
//! - **all other targets**: simulation backend for host-side tests, with
//!   hooks to script association results.
//!
//! ## Reconnection policy
//!
//! While an association attempt is in flight, a disconnect triggers up to
//! [`MAX_CONNECT_RETRY`] immediate re-attempts (driven from `poll()`), then
//! the adapter gives up until the next explicit `connect()`.

#[cfg(target_os = "espidf")]
use log::error;
use log::{info, warn};

use crate::error::NetError;
use crate::supervisor::ports::ConnectivityPort;

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};

/// Association attempts before the adapter reports failure.
pub const MAX_CONNECT_RETRY: u8 = 9;

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting { attempt: u8 },
    Connected,
    Failed,
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), NetError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(NetError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), NetError> {
    if password.is_empty() {
        return Ok(()); // open network
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(NetError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    #[cfg(target_os = "espidf")]
    driver: EspWifi<'static>,
    /// Simulation: scripted outcome of the next association attempts.
    #[cfg(not(target_os = "espidf"))]
    sim_fail_connects: u8,
}

impl WifiAdapter {
    /// Wrap a started station driver.  The driver keeps the credentials it
    /// last associated with persisted in its own NVS storage, so a device
    /// provisioned on a previous boot reconnects without any supervisor
    /// involvement.
    #[cfg(target_os = "espidf")]
    pub fn new(driver: EspWifi<'static>) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            driver,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            sim_fail_connects: 0,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Start the station with whatever configuration the driver has
    /// persisted.  Called once at boot, before the association grace
    /// window.
    pub fn start(&mut self) -> Result<(), NetError> {
        #[cfg(target_os = "espidf")]
        {
            self.driver.start().map_err(|e| {
                error!("WiFi: driver start failed ({e})");
                NetError::ConnectFailed
            })?;
            if let Err(e) = self.driver.connect() {
                // Not fatal: the device may simply be unprovisioned.
                warn!("WiFi: boot association attempt failed ({e})");
            } else {
                self.state = WifiState::Connecting { attempt: 0 };
            }
        }
        #[cfg(not(target_os = "espidf"))]
        info!("WiFi(sim): station started");
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), NetError> {
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|()| NetError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|()| NetError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });
        self.driver
            .set_configuration(&config)
            .map_err(|_| NetError::ConnectFailed)?;
        if !self.driver.is_started().unwrap_or(false) {
            self.driver.start().map_err(|_| NetError::ConnectFailed)?;
        }
        self.driver.connect().map_err(|_| NetError::ConnectFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), NetError> {
        if self.sim_fail_connects > 0 {
            self.sim_fail_connects -= 1;
            return Err(NetError::ConnectFailed);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.driver.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    // ── Simulation hooks ──────────────────────────────────────

    /// Script the next `n` association attempts to fail.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_fail_next_connects(&mut self, n: u8) {
        self.sim_fail_connects = n;
    }

    /// Force the associated state (boot-time association simulation).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_associated(&mut self, connected: bool) {
        self.state = if connected {
            WifiState::Connected
        } else {
            WifiState::Disconnected
        };
    }
}

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self) -> Result<(), NetError> {
        if self.ssid.is_empty() {
            return Err(NetError::NoCredentials);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        self.state = WifiState::Connecting { attempt: 0 };

        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connected;
                info!("WiFi: associated with '{}'", self.ssid);
                crate::events::push_event(crate::events::Event::WifiConnected);
                Ok(())
            }
            Err(e) => {
                warn!("WiFi: association attempt failed ({e})");
                self.state = WifiState::Connecting { attempt: 1 };
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        #[cfg(target_os = "espidf")]
        if let Err(e) = self.driver.disconnect() {
            warn!("WiFi: disconnect failed ({e})");
        }
        self.state = WifiState::Disconnected;
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), NetError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|()| NetError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|()| NetError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn request_scan(&mut self) {
        // Scan results are pushed back to the provisioning central by the
        // radio layer; the supervisor only forwards the request.
        #[cfg(target_os = "espidf")]
        match self
            .driver
            .driver_mut()
            .start_scan(&Default::default(), false)
        {
            Ok(()) => info!("WiFi: AP scan started"),
            Err(e) => warn!("WiFi: AP scan failed to start ({e})"),
        }
        #[cfg(not(target_os = "espidf"))]
        info!("WiFi(sim): AP scan requested");
    }

    fn poll(&mut self) {
        match self.state {
            WifiState::Connecting { attempt } => {
                if self.platform_is_connected() {
                    self.state = WifiState::Connected;
                    info!("WiFi: associated after {attempt} retries");
                    crate::events::push_event(crate::events::Event::WifiGotIp);
                } else if attempt >= MAX_CONNECT_RETRY {
                    warn!("WiFi: connection failed after {attempt} attempts");
                    self.state = WifiState::Failed;
                    crate::events::push_event(crate::events::Event::WifiDisconnected);
                } else if self.platform_connect().is_ok() {
                    self.state = WifiState::Connected;
                    crate::events::push_event(crate::events::Event::WifiConnected);
                } else {
                    self.state = WifiState::Connecting { attempt: attempt + 1 };
                }
            }
            WifiState::Connected => {
                if !self.platform_is_connected() {
                    warn!("WiFi: association lost, re-connecting");
                    self.state = WifiState::Connecting { attempt: 0 };
                }
            }
            WifiState::Disconnected | WifiState::Failed => {}
        }
    }
}
