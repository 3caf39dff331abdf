//! Adapters — concrete implementations of the supervisor's port traits.
//!
//! | Adapter    | Implements         | Connects to                 |
//! |------------|--------------------|-----------------------------|
//! | `ble`      | ProvisioningPort   | Bluedroid GATT server       |
//! | `wifi`     | ConnectivityPort   | ESP-IDF WiFi STA            |
//! | `nvs`      | ConfigStore        | NVS / in-memory store       |
//! | `http`     | ReportPort         | esp_http_client             |
//! | `log_sink` | EventSink          | Serial log output           |
//! | `time`     | —                  | ESP high-resolution timer   |

pub mod ble;
pub mod http;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod wifi;
