use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TargetMode;

pub const MIN_TARGET_TEMP_C: i32 = 17;
pub const MAX_TARGET_TEMP_C: i32 = 30;
pub const DEFAULT_TEMP_C: i32 = 24;
pub const SUPPORTED_PROTOCOL_VERSION: u8 = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no devices configured")]
    NoDevices,
    #[error("device '{0}' has an empty mqtt server")]
    MissingServer(String),
    #[error("device '{0}' has an empty mqtt prefix")]
    MissingPrefix(String),
    #[error("mqtt prefix '{0}' is used by more than one device")]
    DuplicatePrefix(String),
    #[error("display name '{0}' is used by more than one device")]
    DuplicateName(String),
    #[error("device '{name}' default temperature {value} is outside 17..=30")]
    DefaultTemperatureOutOfRange { name: String, value: i32 },
    #[error("device '{0}' declares no target modes")]
    NoTargetModes(String),
    #[error("mqtt protocol version {0} is not supported, only 4 (3.1.1) is available")]
    UnsupportedProtocolVersion(u8),
    #[error("client certificate and key must be configured together")]
    IncompleteClientAuth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub devices: Vec<DeviceConfig>,
}

impl PlatformConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// One connection and one state record per prefix, so prefixes must be unique.
    /// The host addresses accessories by display name, which must be unique too.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }

        let mut prefixes = HashSet::new();
        let mut names = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            let prefix = device.mqtt.prefix.trim_end_matches('/');
            if !prefixes.insert(prefix.to_string()) {
                return Err(ConfigError::DuplicatePrefix(prefix.to_string()));
            }
            if !names.insert(device.display_name.as_str()) {
                return Err(ConfigError::DuplicateName(device.display_name.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "defaultTemperature", default = "default_temperature")]
    pub default_temperature: i32,
    #[serde(rename = "targetModes", default = "default_target_modes")]
    pub target_modes: Vec<TargetMode>,
    pub mqtt: MqttConfig,
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.server.trim().is_empty() {
            return Err(ConfigError::MissingServer(self.display_name.clone()));
        }
        if self.mqtt.prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::MissingPrefix(self.display_name.clone()));
        }
        if !(MIN_TARGET_TEMP_C..=MAX_TARGET_TEMP_C).contains(&self.default_temperature) {
            return Err(ConfigError::DefaultTemperatureOutOfRange {
                name: self.display_name.clone(),
                value: self.default_temperature,
            });
        }
        if self.target_modes.is_empty() {
            return Err(ConfigError::NoTargetModes(self.display_name.clone()));
        }
        if let Some(version) = self.mqtt.version {
            if version != SUPPORTED_PROTOCOL_VERSION {
                return Err(ConfigError::UnsupportedProtocolVersion(version));
            }
        }
        if self.mqtt.cert.is_some() != self.mqtt.key.is_some() {
            return Err(ConfigError::IncompleteClientAuth);
        }
        Ok(())
    }

    pub fn allows_target_mode(&self, mode: TargetMode) -> bool {
        self.target_modes.contains(&mode)
    }
}

/// Broker settings. Every optional key falls back to the transport default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MqttConfig {
    pub server: String,
    pub prefix: String,
    #[serde(default)]
    pub version: Option<u8>,
    #[serde(default)]
    pub keepalive: Option<u64>,
    #[serde(default)]
    pub ca: Option<PathBuf>,
    #[serde(default)]
    pub cert: Option<PathBuf>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub reject_unauthorized: Option<bool>,
}

fn default_temperature() -> i32 {
    DEFAULT_TEMP_C
}

fn default_target_modes() -> Vec<TargetMode> {
    vec![TargetMode::Cool]
}
