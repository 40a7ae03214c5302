//! Per-dongle key store.
//!
//! One JSON file keyed by dongle address, holding the hex-encoded APPKEY,
//! the cached GATT handle paths, and the layout name last reported by the
//! device. The APPKEY grants typing access to whatever the dongle is plugged
//! into; the file is created with the process umask and should live in a
//! user-private directory.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::HostError;
use crate::transport::CachedHandles;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct DeviceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tx_char_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rx_char_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keyboard_layout: Option<String>,
}

#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    devices: BTreeMap<String, DeviceRecord>,
}

impl KeyStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();
        let devices = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                HostError::Config(format!("key store {} is corrupt: {err}", path.display()))
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                return Err(HostError::Config(format!(
                    "cannot read key store {}: {err}",
                    path.display()
                )))
            }
        };
        Ok(Self { path, devices })
    }

    fn save(&self) -> Result<(), HostError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    HostError::Config(format!(
                        "cannot create key store directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.devices)
            .map_err(|err| HostError::Config(format!("cannot encode key store: {err}")))?;
        fs::write(&self.path, json).map_err(|err| {
            HostError::Config(format!(
                "cannot write key store {}: {err}",
                self.path.display()
            ))
        })
    }

    pub fn get_appkey(&self, address: &str) -> Option<Zeroizing<[u8; 32]>> {
        let record = self.devices.get(address)?;
        let hex_key = record.app_key.as_deref()?;
        let bytes = hex::decode(hex_key).ok()?;
        let mut key = Zeroizing::new([0u8; 32]);
        if bytes.len() != key.len() {
            return None;
        }
        key.copy_from_slice(&bytes);
        Some(key)
    }

    pub fn put_appkey(&mut self, address: &str, appkey: &[u8; 32]) -> Result<(), HostError> {
        self.devices.entry(address.to_string()).or_default().app_key = Some(hex::encode(appkey));
        self.save()
    }

    pub fn cached_handles(&self, address: &str) -> Option<CachedHandles> {
        let record = self.devices.get(address)?;
        Some(CachedHandles {
            device_path: record.device_path.clone()?,
            tx_path: record.tx_char_path.clone()?,
            rx_path: record.rx_char_path.clone()?,
        })
    }

    pub fn set_cached_handles(
        &mut self,
        address: &str,
        handles: &CachedHandles,
    ) -> Result<(), HostError> {
        let record = self.devices.entry(address.to_string()).or_default();
        record.device_path = Some(handles.device_path.clone());
        record.tx_char_path = Some(handles.tx_path.clone());
        record.rx_char_path = Some(handles.rx_path.clone());
        self.save()
    }

    pub fn set_layout(&mut self, address: &str, layout: &str) -> Result<(), HostError> {
        self.devices
            .entry(address.to_string())
            .or_default()
            .keyboard_layout = Some(layout.to_string());
        self.save()
    }

    pub fn layout(&self, address: &str) -> Option<&str> {
        self.devices.get(address)?.keyboard_layout.as_deref()
    }
}
