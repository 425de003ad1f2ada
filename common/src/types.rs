use serde::{Deserialize, Serialize};

/// Operating state reported through the current-state capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrentMode {
    Inactive,
    Idle,
    Cooling,
}

impl CurrentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "INACTIVE",
            Self::Idle => "IDLE",
            Self::Cooling => "COOLING",
        }
    }
}

/// User-requested operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    Auto,
    Cool,
}

impl TargetMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cool => "cool",
        }
    }
}

/// Named fan levels understood by the IR controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanPreset {
    Auto,
    Min,
    Medium,
    Max,
}

impl FanPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Min => "min",
            Self::Medium => "medium",
            Self::Max => "max",
        }
    }
}

/// Attribute segment shared by command and status topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Power,
    Mode,
    Temp,
    FanSpeed,
    SwingV,
    Light,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Self::Power,
        Self::Mode,
        Self::Temp,
        Self::FanSpeed,
        Self::SwingV,
        Self::Light,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Mode => "mode",
            Self::Temp => "temp",
            Self::FanSpeed => "fanspeed",
            Self::SwingV => "swingv",
            Self::Light => "light",
        }
    }
}

/// A single broker command produced by a capability write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub attribute: Attribute,
    pub payload: String,
}

impl Command {
    pub fn new(attribute: Attribute, payload: impl Into<String>) -> Self {
        Self {
            attribute,
            payload: payload.into(),
        }
    }
}

/// Identity reported to the host alongside the characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessoryInformation {
    pub manufacturer: &'static str,
    pub model: &'static str,
    #[serde(rename = "serialNumber")]
    pub serial_number: &'static str,
}

impl AccessoryInformation {
    pub const MANUFACTURER: &'static str = "AC";
    pub const MODEL: &'static str = "IRMQTT-Model";

    pub fn current() -> Self {
        Self {
            manufacturer: Self::MANUFACTURER,
            model: Self::MODEL,
            serial_number: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Snapshot of one accessory, as served to the host binding.
#[derive(Debug, Clone, Serialize)]
pub struct AccessoryStatus {
    pub power: bool,
    #[serde(rename = "currentMode")]
    pub current_mode: &'static str,
    #[serde(rename = "targetMode")]
    pub target_mode: &'static str,
    #[serde(rename = "currentTemperature")]
    pub current_temperature: i32,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: i32,
    #[serde(rename = "fanSpeed")]
    pub fan_speed: u8,
    pub swing: bool,
}
