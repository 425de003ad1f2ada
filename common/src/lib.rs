pub mod accessory;
pub mod characteristics;
pub mod config;
pub mod topics;
pub mod types;
pub mod vocabulary;

pub use accessory::{AirConditioner, DeviceState, StatusError, StatusUpdate};
pub use characteristics::{Characteristic, CharacteristicProps, CharacteristicValue, ValueError};
pub use config::{ConfigError, DeviceConfig, MqttConfig, PlatformConfig};
pub use topics::TopicSet;
pub use types::{
    AccessoryInformation, AccessoryStatus, Attribute, Command, CurrentMode, FanPreset,
    TargetMode,
};
