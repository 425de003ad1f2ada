//! Characteristic registry handed to the host binding at start-up.
//!
//! The host rejects writes that fall outside the registered properties, so the
//! accessory engine only ever sees pre-validated values.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::{
    config::{DeviceConfig, MAX_TARGET_TEMP_C, MIN_TARGET_TEMP_C},
    types::{CurrentMode, TargetMode},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Characteristic {
    Active,
    CurrentState,
    TargetState,
    CurrentTemperature,
    TargetTemperature,
    RotationSpeed,
    SwingMode,
}

impl Characteristic {
    pub const ALL: [Characteristic; 7] = [
        Self::Active,
        Self::CurrentState,
        Self::TargetState,
        Self::CurrentTemperature,
        Self::TargetTemperature,
        Self::RotationSpeed,
        Self::SwingMode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::CurrentState => "current-state",
            Self::TargetState => "target-state",
            Self::CurrentTemperature => "current-temperature",
            Self::TargetTemperature => "target-temperature",
            Self::RotationSpeed => "rotation-speed",
            Self::SwingMode => "swing-mode",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    Bool,
    Int,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicProps {
    pub characteristic: Characteristic,
    pub format: ValueFormat,
    pub writable: bool,
    #[serde(rename = "minValue", skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i32>,
    #[serde(rename = "maxValue", skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i32>,
    #[serde(rename = "minStep", skip_serializing_if = "Option::is_none")]
    pub min_step: Option<i32>,
    #[serde(rename = "validValues", skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<&'static str>>,
}

/// A typed value read from or written to a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Int(i32),
    CurrentMode(CurrentMode),
    TargetMode(TargetMode),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValueError {
    #[error("{0} is read-only")]
    ReadOnly(&'static str),
    #[error("{characteristic} expects a {expected} value")]
    WrongType {
        characteristic: &'static str,
        expected: &'static str,
    },
    #[error("{characteristic} value {value} is outside {min}..={max}")]
    OutOfRange {
        characteristic: &'static str,
        value: i64,
        min: i32,
        max: i32,
    },
    #[error("{characteristic} does not accept '{value}'")]
    InvalidChoice {
        characteristic: &'static str,
        value: String,
    },
}

/// Properties for every characteristic of one accessory.
pub fn register(config: &DeviceConfig) -> Vec<CharacteristicProps> {
    let target_modes = [TargetMode::Auto, TargetMode::Cool]
        .into_iter()
        .filter(|mode| config.allows_target_mode(*mode))
        .map(TargetMode::as_str)
        .collect();

    vec![
        flag(Characteristic::Active, true),
        CharacteristicProps {
            characteristic: Characteristic::CurrentState,
            format: ValueFormat::Enum,
            writable: false,
            min_value: None,
            max_value: None,
            min_step: None,
            valid_values: Some(vec![
                CurrentMode::Inactive.as_str(),
                CurrentMode::Idle.as_str(),
                CurrentMode::Cooling.as_str(),
            ]),
        },
        CharacteristicProps {
            characteristic: Characteristic::TargetState,
            format: ValueFormat::Enum,
            writable: true,
            min_value: None,
            max_value: None,
            min_step: None,
            valid_values: Some(target_modes),
        },
        range(
            Characteristic::CurrentTemperature,
            false,
            MIN_TARGET_TEMP_C,
            MAX_TARGET_TEMP_C,
        ),
        range(
            Characteristic::TargetTemperature,
            true,
            MIN_TARGET_TEMP_C,
            MAX_TARGET_TEMP_C,
        ),
        range(Characteristic::RotationSpeed, true, 0, 100),
        flag(Characteristic::SwingMode, true),
    ]
}

fn flag(characteristic: Characteristic, writable: bool) -> CharacteristicProps {
    CharacteristicProps {
        characteristic,
        format: ValueFormat::Bool,
        writable,
        min_value: None,
        max_value: None,
        min_step: None,
        valid_values: None,
    }
}

fn range(characteristic: Characteristic, writable: bool, min: i32, max: i32) -> CharacteristicProps {
    CharacteristicProps {
        characteristic,
        format: ValueFormat::Int,
        writable,
        min_value: Some(min),
        max_value: Some(max),
        min_step: Some(1),
        valid_values: None,
    }
}

impl CharacteristicProps {
    /// Checks a host write against the registered properties.
    pub fn validate(&self, value: &Value) -> Result<CharacteristicValue, ValueError> {
        let name = self.characteristic.as_str();
        if !self.writable {
            return Err(ValueError::ReadOnly(name));
        }

        match self.format {
            ValueFormat::Bool => match value {
                Value::Bool(flag) => Ok(CharacteristicValue::Bool(*flag)),
                // Hosts commonly encode flags as 0/1.
                Value::Number(n) if n.as_u64() == Some(0) => Ok(CharacteristicValue::Bool(false)),
                Value::Number(n) if n.as_u64() == Some(1) => Ok(CharacteristicValue::Bool(true)),
                _ => Err(ValueError::WrongType {
                    characteristic: name,
                    expected: "boolean",
                }),
            },
            ValueFormat::Int => {
                let number = value.as_i64().ok_or(ValueError::WrongType {
                    characteristic: name,
                    expected: "integer",
                })?;
                let min = self.min_value.unwrap_or(i32::MIN);
                let max = self.max_value.unwrap_or(i32::MAX);
                if number < i64::from(min) || number > i64::from(max) {
                    return Err(ValueError::OutOfRange {
                        characteristic: name,
                        value: number,
                        min,
                        max,
                    });
                }
                Ok(CharacteristicValue::Int(number as i32))
            }
            ValueFormat::Enum => {
                let choice = value.as_str().ok_or(ValueError::WrongType {
                    characteristic: name,
                    expected: "string",
                })?;
                let lower = choice.to_ascii_lowercase();
                let accepted = self
                    .valid_values
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .any(|valid| valid.eq_ignore_ascii_case(&lower));
                let mode = match lower.as_str() {
                    "auto" => Some(TargetMode::Auto),
                    "cool" => Some(TargetMode::Cool),
                    _ => None,
                };
                match mode {
                    Some(mode) if accepted => Ok(CharacteristicValue::TargetMode(mode)),
                    _ => Err(ValueError::InvalidChoice {
                        characteristic: name,
                        value: choice.to_string(),
                    }),
                }
            }
        }
    }
}
