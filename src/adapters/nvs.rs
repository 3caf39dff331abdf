//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigStore`] over the `custom_storage` namespace.  The
//! three configuration fields are stored as independent string keys
//! (`name`, `uri`, `timer`): one provisioning write touches exactly one
//! key, and a corrupt or missing key degrades to its default without
//! affecting the others.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF `nvs_*` string API, one
//!   open/commit/close bracket per operation.
//! - **all other targets**: in-memory map for host-side tests.

use log::{info, warn};

use crate::config::{validate_field, ConfigField, DeviceConfig};
use crate::error::StorageError;
use crate::supervisor::ports::ConfigStore;

#[cfg(not(target_os = "espidf"))]
use std::cell::RefCell;
#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const NAMESPACE: &str = "custom_storage";

pub struct NvsStore {
    #[cfg(not(target_os = "espidf"))]
    store: RefCell<HashMap<String, String>>,
}

impl NvsStore {
    /// Create the adapter and initialise the NVS flash partition.
    ///
    /// On first boot or after a layout version change the partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase run from the single
            // main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStore: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        })
    }

    // ── ESP-IDF helpers ───────────────────────────────────────

    /// Open the namespace, run a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = NAMESPACE.as_bytes();
        ns_buf[..ns_bytes.len()].copy_from_slice(ns_bytes);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn read_str(field: ConfigField) -> Result<std::string::String, StorageError> {
        let mut key_buf = [0u8; 16];
        let kb = field.key().as_bytes();
        key_buf[..kb.len()].copy_from_slice(kb);

        let result = Self::with_nvs_handle(false, |handle| {
            // Two-call pattern: size first, then the value.
            let mut size: usize = 0;
            let ret = unsafe {
                nvs_get_str(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut(), &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let mut buf = vec![0u8; size];
            let ret = unsafe {
                nvs_get_str(handle, key_buf.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(buf)
        });

        match result {
            Ok(mut bytes) => {
                // Drop the C string terminator.
                if bytes.last() == Some(&0) {
                    bytes.pop();
                }
                String::from_utf8(bytes).map_err(|_| StorageError::IoError)
            }
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            Err(_) => Err(StorageError::IoError),
        }
    }

    #[cfg(target_os = "espidf")]
    fn write_str(field: ConfigField, value: &str) -> Result<(), StorageError> {
        let mut key_buf = [0u8; 16];
        let kb = field.key().as_bytes();
        key_buf[..kb.len()].copy_from_slice(kb);

        let value = std::ffi::CString::new(value).map_err(|_| StorageError::IoError)?;

        Self::with_nvs_handle(true, |handle| {
            let ret = unsafe {
                nvs_set_str(handle, key_buf.as_ptr() as *const _, value.as_ptr())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        })
        .map_err(|_| StorageError::IoError)
    }

    // ── Simulation helpers ────────────────────────────────────

    #[cfg(not(target_os = "espidf"))]
    fn read_str(&self, field: ConfigField) -> Result<String, StorageError> {
        self.store
            .borrow()
            .get(field.key())
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_str(&self, field: ConfigField, value: &str) -> Result<(), StorageError> {
        self.store
            .borrow_mut()
            .insert(field.key().to_string(), value.to_string());
        Ok(())
    }
}

impl Default for NvsStore {
    /// Last-resort fallback when flash init fails: a store that serves
    /// defaults and forgets writes (simulation backend keeps its map).
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            #[cfg(not(target_os = "espidf"))]
            store: RefCell::new(HashMap::new()),
        })
    }
}

impl ConfigStore for NvsStore {
    /// Load all three fields.  Missing or unreadable keys keep their
    /// defaults; nothing here fails the boot.
    fn load(&self) -> DeviceConfig {
        let mut config = DeviceConfig::default();
        for field in ConfigField::ALL {
            #[cfg(target_os = "espidf")]
            let read = Self::read_str(field);
            #[cfg(not(target_os = "espidf"))]
            let read = self.read_str(field);

            match read {
                Ok(value) => {
                    if let Err(e) = config.set_field(field, &value) {
                        warn!("NvsStore: stored {field} rejected ({e}), using default");
                    }
                }
                Err(StorageError::NotFound) => {
                    info!("NvsStore: no stored {field}, using default");
                }
                Err(e) => {
                    warn!("NvsStore: reading {field} failed ({e}), using default");
                }
            }
        }
        config
    }

    fn store_field(&mut self, field: ConfigField, value: &str) -> Result<(), StorageError> {
        validate_field(field, value)?;

        #[cfg(target_os = "espidf")]
        let result = Self::write_str(field, value);
        #[cfg(not(target_os = "espidf"))]
        let result = self.write_str(field, value);

        match result {
            Ok(()) => {
                info!("NvsStore: {field} persisted ({} bytes)", value.len());
                Ok(())
            }
            Err(e) => {
                warn!("NvsStore: persisting {field} failed ({e})");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_without_stored_fields_returns_defaults() {
        let store = NvsStore::new().unwrap();
        let config = store.load();
        assert_eq!(config, DeviceConfig::default());
    }

    #[test]
    fn store_and_load_roundtrip() {
        let mut store = NvsStore::new().unwrap();
        store.store_field(ConfigField::Name, "node1").unwrap();
        store.store_field(ConfigField::Uri, "10.0.0.5/api").unwrap();
        store.store_field(ConfigField::Timer, "15").unwrap();

        let config = store.load();
        assert_eq!(config.name.as_str(), "node1");
        assert_eq!(config.uri.as_str(), "10.0.0.5/api");
        assert_eq!(config.timer.as_str(), "15");
    }

    #[test]
    fn fields_are_stored_independently() {
        let mut store = NvsStore::new().unwrap();
        store.store_field(ConfigField::Name, "node1").unwrap();
        store.store_field(ConfigField::Timer, "15").unwrap();

        store.store_field(ConfigField::Uri, "192.168.1.10").unwrap();

        let config = store.load();
        assert_eq!(config.uri.as_str(), "192.168.1.10");
        assert_eq!(config.name.as_str(), "node1");
        assert_eq!(config.timer.as_str(), "15");
    }

    #[test]
    fn overwrite_replaces_value() {
        let mut store = NvsStore::new().unwrap();
        store.store_field(ConfigField::Timer, "15").unwrap();
        store.store_field(ConfigField::Timer, "45").unwrap();
        assert_eq!(store.load().timer.as_str(), "45");
    }

    #[test]
    fn oversize_value_rejected_before_write() {
        let mut store = NvsStore::new().unwrap();
        let long = "t".repeat(crate::config::MAX_TIMER_LEN + 1);
        assert_eq!(
            store.store_field(ConfigField::Timer, &long),
            Err(StorageError::ValueTooLong)
        );
        // Nothing was persisted.
        assert_eq!(store.load().timer.as_str(), "15");
    }
}
