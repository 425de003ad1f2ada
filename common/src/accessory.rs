use thiserror::Error;

use crate::{
    config::{DeviceConfig, MAX_TARGET_TEMP_C, MIN_TARGET_TEMP_C},
    types::{AccessoryStatus, Attribute, Command, CurrentMode, TargetMode},
    vocabulary::{self, ModeReport},
};

const INITIAL_TEMP_C: i32 = 22;
const INITIAL_FAN_PERCENT: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub power: bool,
    pub mode: CurrentMode,
    pub target_mode: TargetMode,
    pub current_temperature: i32,
    pub target_temperature: i32,
    pub fan_speed_percent: u8,
    pub swing: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: false,
            mode: CurrentMode::Inactive,
            target_mode: TargetMode::Cool,
            current_temperature: INITIAL_TEMP_C,
            target_temperature: INITIAL_TEMP_C,
            fan_speed_percent: INITIAL_FAN_PERCENT,
            swing: false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("temperature payload '{0}' is not a number")]
    InvalidTemperature(String),
    #[error("temperature {0} is outside 17..=30")]
    TemperatureOutOfRange(i32),
    #[error("unknown fan speed '{0}'")]
    UnknownFanSpeed(String),
    #[error("unknown mode '{0}'")]
    UnknownMode(String),
}

/// What a status message changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Power(bool),
    Mode {
        mode: CurrentMode,
        target_mode: TargetMode,
    },
    Temperature(i32),
    FanSpeed(u8),
    Swing(bool),
    Ignored(Attribute),
}

/// Logical state of one IR-controlled air conditioner.
///
/// Capability writes update the record first and return the broker commands that
/// carry them, in wire order. Status reports only ever mutate the record; they
/// return no commands, so an echoed status can never trigger another publish.
#[derive(Debug, Clone)]
pub struct AirConditioner {
    state: DeviceState,
    default_temperature: i32,
    target_modes: Vec<TargetMode>,
}

impl AirConditioner {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            state: DeviceState::default(),
            default_temperature: config.default_temperature,
            target_modes: config.target_modes.clone(),
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn status(&self) -> AccessoryStatus {
        AccessoryStatus {
            power: self.state.power,
            current_mode: self.state.mode.as_str(),
            target_mode: self.state.target_mode.as_str(),
            current_temperature: self.current_temperature(),
            target_temperature: self.target_temperature(),
            fan_speed: self.state.fan_speed_percent,
            swing: self.state.swing,
        }
    }

    pub fn power(&self) -> bool {
        self.state.power
    }

    pub fn current_mode(&self) -> CurrentMode {
        self.state.mode
    }

    pub fn target_mode(&self) -> TargetMode {
        self.state.target_mode
    }

    pub fn target_temperature(&self) -> i32 {
        self.state.target_temperature
    }

    /// There is no independent sensor feed; the unit reports its set point.
    pub fn current_temperature(&self) -> i32 {
        self.state.target_temperature
    }

    pub fn fan_speed(&self) -> u8 {
        self.state.fan_speed_percent
    }

    pub fn swing(&self) -> bool {
        self.state.swing
    }

    pub fn set_power(&mut self, on: bool) -> Vec<Command> {
        if !on {
            self.state.power = false;
            self.state.mode = CurrentMode::Inactive;
            return vec![
                Command::new(Attribute::Power, vocabulary::POWER_OFF),
                Command::new(Attribute::SwingV, vocabulary::SWING_OFF),
            ];
        }

        if self.state.mode == CurrentMode::Inactive {
            self.state.mode = CurrentMode::Cooling;
            self.state.target_mode = TargetMode::Cool;
        }
        self.state.power = true;
        self.state.target_temperature = self.default_temperature;
        self.state.current_temperature = self.default_temperature;

        vec![
            Command::new(Attribute::Power, vocabulary::POWER_ON),
            Command::new(Attribute::Mode, vocabulary::mode_payload(self.state.mode)),
        ]
    }

    pub fn set_target_mode(&mut self, mode: TargetMode) -> Vec<Command> {
        let payload = match mode {
            TargetMode::Auto => vocabulary::MODE_AUTO,
            TargetMode::Cool => vocabulary::MODE_COOL,
        };

        self.state.mode = CurrentMode::Cooling;
        self.state.target_mode = self.restrict_target_mode(mode);

        vec![Command::new(Attribute::Mode, payload)]
    }

    pub fn set_target_temperature(&mut self, value: i32) -> Vec<Command> {
        self.state.target_temperature = value;
        self.state.current_temperature = value;
        vec![Command::new(Attribute::Temp, value.to_string())]
    }

    /// The raw percentage is kept locally; only the preset goes on the wire.
    pub fn set_fan_speed(&mut self, percent: u8) -> Vec<Command> {
        self.state.fan_speed_percent = percent;
        let preset = vocabulary::preset_for_percent(percent);
        vec![Command::new(Attribute::FanSpeed, preset.as_str())]
    }

    pub fn set_swing(&mut self, swing: bool) -> Vec<Command> {
        self.state.swing = swing;
        vec![Command::new(
            Attribute::SwingV,
            vocabulary::swing_payload(swing),
        )]
    }

    /// Applies a lower-cased status payload. On error the record is untouched.
    pub fn apply_status(
        &mut self,
        attribute: Attribute,
        payload: &str,
    ) -> Result<StatusUpdate, StatusError> {
        match attribute {
            Attribute::Power => {
                let on = vocabulary::power_from_payload(payload);
                self.state.power = on;
                Ok(StatusUpdate::Power(on))
            }
            Attribute::Temp => {
                let value = parse_temperature(payload)?;
                self.state.target_temperature = value;
                self.state.current_temperature = value;
                Ok(StatusUpdate::Temperature(value))
            }
            Attribute::SwingV => {
                let swing = vocabulary::swing_from_payload(payload);
                self.state.swing = swing;
                Ok(StatusUpdate::Swing(swing))
            }
            Attribute::FanSpeed => {
                let preset = vocabulary::parse_preset(payload)
                    .ok_or_else(|| StatusError::UnknownFanSpeed(payload.to_string()))?;
                let percent = vocabulary::percent_for_preset(preset);
                self.state.fan_speed_percent = percent;
                Ok(StatusUpdate::FanSpeed(percent))
            }
            Attribute::Mode => {
                let report = vocabulary::parse_mode(payload)
                    .ok_or_else(|| StatusError::UnknownMode(payload.to_string()))?;
                match report {
                    ModeReport::Cool => {
                        self.state.mode = CurrentMode::Cooling;
                        self.state.target_mode = TargetMode::Cool;
                    }
                    ModeReport::Auto => {
                        self.state.mode = CurrentMode::Cooling;
                        self.state.target_mode = self.restrict_target_mode(TargetMode::Auto);
                    }
                    ModeReport::Off => {
                        self.state.mode = CurrentMode::Inactive;
                        self.state.target_mode = TargetMode::Cool;
                    }
                }
                Ok(StatusUpdate::Mode {
                    mode: self.state.mode,
                    target_mode: self.state.target_mode,
                })
            }
            Attribute::Light => Ok(StatusUpdate::Ignored(Attribute::Light)),
        }
    }

    fn restrict_target_mode(&self, mode: TargetMode) -> TargetMode {
        if self.target_modes.contains(&mode) {
            mode
        } else {
            TargetMode::Cool
        }
    }
}

fn parse_temperature(payload: &str) -> Result<i32, StatusError> {
    let value = match payload.parse::<i32>() {
        Ok(value) => value,
        Err(_) => {
            let value = payload
                .parse::<f32>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| StatusError::InvalidTemperature(payload.to_string()))?;
            value.trunc() as i32
        }
    };

    if !(MIN_TARGET_TEMP_C..=MAX_TARGET_TEMP_C).contains(&value) {
        return Err(StatusError::TemperatureOutOfRange(value));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MqttConfig;
    use pretty_assertions::assert_eq;

    fn config(target_modes: Vec<TargetMode>) -> DeviceConfig {
        DeviceConfig {
            display_name: "Bedroom".to_string(),
            default_temperature: 24,
            target_modes,
            mqtt: MqttConfig {
                server: "broker".to_string(),
                prefix: "ir".to_string(),
                ..MqttConfig::default()
            },
        }
    }

    fn cool_only() -> AirConditioner {
        AirConditioner::new(&config(vec![TargetMode::Cool]))
    }

    fn words(commands: &[Command]) -> Vec<(&'static str, &str)> {
        commands
            .iter()
            .map(|c| (c.attribute.as_str(), c.payload.as_str()))
            .collect()
    }

    #[test]
    fn power_off_always_sends_power_and_swing_off() {
        let mut ac = cool_only();
        ac.set_power(true);
        ac.set_swing(true);

        let commands = ac.set_power(false);

        assert_eq!(words(&commands), vec![("power", "off"), ("swingv", "off")]);
        assert!(!ac.power());
        assert_eq!(ac.current_mode(), CurrentMode::Inactive);

        let again = ac.set_power(false);
        assert_eq!(words(&again), vec![("power", "off"), ("swingv", "off")]);
    }

    #[test]
    fn power_on_from_inactive_promotes_to_cooling() {
        let mut ac = cool_only();
        ac.set_target_temperature(19);
        ac.set_power(false);

        let commands = ac.set_power(true);

        assert_eq!(words(&commands), vec![("power", "on"), ("mode", "cool")]);
        assert!(ac.power());
        assert_eq!(ac.current_mode(), CurrentMode::Cooling);
        assert_eq!(ac.target_mode(), TargetMode::Cool);
        assert_eq!(ac.target_temperature(), 24);
        assert_eq!(ac.current_temperature(), 24);
    }

    #[test]
    fn power_on_from_idle_keeps_mode_and_sends_auto() {
        let mut ac = cool_only();
        ac.state.mode = CurrentMode::Idle;

        let commands = ac.set_power(true);

        assert_eq!(words(&commands), vec![("power", "on"), ("mode", "auto")]);
        assert_eq!(ac.current_mode(), CurrentMode::Idle);
    }

    #[test]
    fn target_mode_write_resolves_to_cool_when_auto_is_not_declared() {
        let mut ac = cool_only();

        let commands = ac.set_target_mode(TargetMode::Auto);

        assert_eq!(words(&commands), vec![("mode", "auto")]);
        assert_eq!(ac.current_mode(), CurrentMode::Cooling);
        assert_eq!(ac.target_mode(), TargetMode::Cool);
    }

    #[test]
    fn target_mode_write_keeps_auto_when_declared() {
        let mut ac = AirConditioner::new(&config(vec![TargetMode::Auto, TargetMode::Cool]));

        let commands = ac.set_target_mode(TargetMode::Auto);

        assert_eq!(words(&commands), vec![("mode", "auto")]);
        assert_eq!(ac.target_mode(), TargetMode::Auto);
    }

    #[test]
    fn temperature_bounds_are_accepted() {
        let mut ac = cool_only();

        assert_eq!(words(&ac.set_target_temperature(17)), vec![("temp", "17")]);
        assert_eq!(ac.target_temperature(), 17);
        assert_eq!(words(&ac.set_target_temperature(30)), vec![("temp", "30")]);
        assert_eq!(ac.current_temperature(), 30);
    }

    #[test]
    fn fan_speed_keeps_raw_percent() {
        let mut ac = cool_only();

        assert_eq!(words(&ac.set_fan_speed(60)), vec![("fanspeed", "medium")]);
        assert_eq!(ac.fan_speed(), 60);
        assert_eq!(words(&ac.set_fan_speed(10)), vec![("fanspeed", "auto")]);
        assert_eq!(ac.fan_speed(), 10);
    }

    #[test]
    fn swing_write_maps_to_auto_and_off() {
        let mut ac = cool_only();

        assert_eq!(words(&ac.set_swing(true)), vec![("swingv", "auto")]);
        assert!(ac.swing());
        assert_eq!(words(&ac.set_swing(false)), vec![("swingv", "off")]);
        assert!(!ac.swing());
    }

    #[test]
    fn temperature_status_sets_both_temperatures() {
        let mut ac = cool_only();

        let update = ac.apply_status(Attribute::Temp, "22").unwrap();

        assert_eq!(update, StatusUpdate::Temperature(22));
        assert_eq!(ac.target_temperature(), 22);
        assert_eq!(ac.state().current_temperature, 22);
    }

    #[test]
    fn decimal_temperature_status_truncates() {
        let mut ac = cool_only();
        assert_eq!(
            ac.apply_status(Attribute::Temp, "25.7"),
            Ok(StatusUpdate::Temperature(25))
        );
    }

    #[test]
    fn malformed_temperature_status_leaves_state_unchanged() {
        let mut ac = cool_only();
        ac.set_target_temperature(20);
        let before = ac.state().clone();

        assert_eq!(
            ac.apply_status(Attribute::Temp, "warm"),
            Err(StatusError::InvalidTemperature("warm".to_string()))
        );
        assert_eq!(
            ac.apply_status(Attribute::Temp, "nan"),
            Err(StatusError::InvalidTemperature("nan".to_string()))
        );
        assert_eq!(
            ac.apply_status(Attribute::Temp, "45"),
            Err(StatusError::TemperatureOutOfRange(45))
        );
        assert_eq!(ac.state(), &before);
    }

    #[test]
    fn fan_speed_status_uses_inbound_table() {
        let mut ac = cool_only();

        assert_eq!(
            ac.apply_status(Attribute::FanSpeed, "max"),
            Ok(StatusUpdate::FanSpeed(75))
        );
        assert_eq!(ac.fan_speed(), 75);
        assert_eq!(
            ac.apply_status(Attribute::FanSpeed, "auto"),
            Ok(StatusUpdate::FanSpeed(100))
        );
        assert!(ac.apply_status(Attribute::FanSpeed, "turbo").is_err());
        assert_eq!(ac.fan_speed(), 100);
    }

    #[test]
    fn mode_status_policy() {
        let mut ac = cool_only();

        ac.apply_status(Attribute::Mode, "cool").unwrap();
        assert_eq!(ac.current_mode(), CurrentMode::Cooling);
        assert_eq!(ac.target_mode(), TargetMode::Cool);

        ac.apply_status(Attribute::Mode, "off").unwrap();
        assert_eq!(ac.current_mode(), CurrentMode::Inactive);
        assert_eq!(ac.target_mode(), TargetMode::Cool);

        ac.apply_status(Attribute::Mode, "auto").unwrap();
        assert_eq!(ac.current_mode(), CurrentMode::Cooling);
        assert_eq!(ac.target_mode(), TargetMode::Cool);

        let before = ac.state().clone();
        assert_eq!(
            ac.apply_status(Attribute::Mode, "heat"),
            Err(StatusError::UnknownMode("heat".to_string()))
        );
        assert_eq!(ac.state(), &before);
    }

    #[test]
    fn auto_mode_status_surfaces_auto_when_declared() {
        let mut ac = AirConditioner::new(&config(vec![TargetMode::Auto, TargetMode::Cool]));

        assert_eq!(
            ac.apply_status(Attribute::Mode, "auto"),
            Ok(StatusUpdate::Mode {
                mode: CurrentMode::Cooling,
                target_mode: TargetMode::Auto,
            })
        );
    }

    #[test]
    fn off_mode_status_resets_target_to_cool() {
        let mut ac = AirConditioner::new(&config(vec![TargetMode::Auto, TargetMode::Cool]));
        ac.apply_status(Attribute::Mode, "auto").unwrap();
        assert_eq!(ac.target_mode(), TargetMode::Auto);

        assert_eq!(
            ac.apply_status(Attribute::Mode, "off"),
            Ok(StatusUpdate::Mode {
                mode: CurrentMode::Inactive,
                target_mode: TargetMode::Cool,
            })
        );
        assert_eq!(ac.target_mode(), TargetMode::Cool);
    }

    #[test]
    fn power_and_swing_status_fall_back_to_false() {
        let mut ac = cool_only();

        ac.apply_status(Attribute::Power, "on").unwrap();
        assert!(ac.power());
        ac.apply_status(Attribute::Power, "standby").unwrap();
        assert!(!ac.power());

        ac.apply_status(Attribute::SwingV, "auto").unwrap();
        assert!(ac.swing());
        ac.apply_status(Attribute::SwingV, "full").unwrap();
        assert!(!ac.swing());
    }

    #[test]
    fn status_overrides_optimistic_write() {
        let mut ac = cool_only();
        ac.set_fan_speed(30);

        ac.apply_status(Attribute::FanSpeed, "medium").unwrap();

        assert_eq!(ac.fan_speed(), 50);
    }

    #[test]
    fn light_status_is_recognised_but_ignored() {
        let mut ac = cool_only();
        let before = ac.state().clone();

        assert_eq!(
            ac.apply_status(Attribute::Light, "on"),
            Ok(StatusUpdate::Ignored(Attribute::Light))
        );
        assert_eq!(ac.state(), &before);
    }
}
