//! HTTP report transport.
//!
//! Implements [`ReportPort`]: one POST per sensing cycle to
//! `http://<uri>`, body composed by [`Report::body`](crate::report::Report).
//! No retry — a failed send is logged, the cycle continues, and the next
//! wake gets a fresh attempt.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_http_client` sys API, one
//!   init/perform/cleanup bracket per report.
//! - **all other targets**: records the request for host-side tests.

use core::fmt::Write;

use log::info;

use crate::error::NetError;
use crate::report::Report;
use crate::supervisor::ports::ReportPort;

/// `http://` plus a maximum-length URI.
const MAX_URL_LEN: usize = crate::config::MAX_URI_LEN + 8;

/// Build the report URL from the configured server URI.
pub fn server_url(uri: &str) -> heapless::String<MAX_URL_LEN> {
    let mut url = heapless::String::new();
    // Infallible: MAX_URL_LEN covers the scheme plus the longest URI.
    let _ = write!(url, "http://{uri}");
    url
}

#[derive(Default)]
pub struct HttpReporter {
    /// Simulation: requests that would have gone out, `(url, body)`.
    #[cfg(not(target_os = "espidf"))]
    pub sent: Vec<(String, String)>,
}

impl HttpReporter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(target_os = "espidf")]
    fn platform_send(&mut self, url: &str, body: &str) -> Result<(), NetError> {
        use esp_idf_svc::sys::*;

        let url_c = std::ffi::CString::new(url).map_err(|_| NetError::HttpInit)?;

        // SAFETY: config outlives the client handle; the client is always
        // cleaned up before this function returns.
        unsafe {
            let mut config: esp_http_client_config_t = core::mem::zeroed();
            config.url = url_c.as_ptr();

            let client = esp_http_client_init(&config);
            if client.is_null() {
                return Err(NetError::HttpInit);
            }

            esp_http_client_set_method(client, esp_http_client_method_t_HTTP_METHOD_POST);
            esp_http_client_set_post_field(client, body.as_ptr() as *const _, body.len() as i32);

            let err = esp_http_client_perform(client);
            esp_http_client_cleanup(client);

            if err != ESP_OK {
                return Err(NetError::HttpSend);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_send(&mut self, url: &str, body: &str) -> Result<(), NetError> {
        self.sent.push((url.to_string(), body.to_string()));
        Ok(())
    }
}

impl ReportPort for HttpReporter {
    fn send(&mut self, uri: &str, report: &Report) -> Result<(), NetError> {
        let url = server_url(uri);
        let body = report.body();
        self.platform_send(url.as_str(), body.as_str())?;
        info!("HTTP: POST {} ({} bytes) ok", url, body.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigField, DeviceConfig};
    use crate::sensors::ReadingsSnapshot;

    #[test]
    fn url_has_scheme_prefix() {
        assert_eq!(server_url("10.0.0.5/api").as_str(), "http://10.0.0.5/api");
        assert_eq!(server_url("").as_str(), "http://");
    }

    #[test]
    fn send_records_url_and_body() {
        let mut config = DeviceConfig::default();
        config.set_field(ConfigField::Name, "node1").unwrap();
        let report = Report::compose(
            &config,
            &ReadingsSnapshot {
                temperature_c: 24.0,
                humidity_pct: 50.0,
                pressure_hpa: 1000.0,
                charge_pct: 90.0,
                cell_voltage_v: 4.0,
            },
        );

        let mut http = HttpReporter::new();
        http.send("10.0.0.5/api", &report).unwrap();

        assert_eq!(http.sent.len(), 1);
        assert_eq!(http.sent[0].0, "http://10.0.0.5/api");
        assert_eq!(
            http.sent[0].1,
            "device_name=node1&temperature=21.00&humidity=50.000&charge=90.00"
        );
    }
}
