//! Translations between capability values and the IR controller's payload words.
//!
//! Inbound fan presets do not invert the outbound bands: `auto` is reported by the
//! controller for the unconstrained, full-speed setting and therefore reads back as
//! 100 %, while any outbound value below 25 % is sent as `auto`.

use crate::types::{CurrentMode, FanPreset};

pub const POWER_ON: &str = "on";
pub const POWER_OFF: &str = "off";
pub const MODE_COOL: &str = "cool";
pub const MODE_AUTO: &str = "auto";
pub const MODE_OFF: &str = "off";
pub const SWING_AUTO: &str = "auto";
pub const SWING_OFF: &str = "off";

/// Decoded value of a mode status payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeReport {
    Cool,
    Auto,
    Off,
}

pub fn preset_for_percent(percent: u8) -> FanPreset {
    match percent {
        75..=100 => FanPreset::Max,
        50..=74 => FanPreset::Medium,
        25..=49 => FanPreset::Min,
        _ => FanPreset::Auto,
    }
}

pub fn percent_for_preset(preset: FanPreset) -> u8 {
    match preset {
        FanPreset::Auto => 100,
        FanPreset::Min => 25,
        FanPreset::Medium => 50,
        FanPreset::Max => 75,
    }
}

pub fn parse_preset(payload: &str) -> Option<FanPreset> {
    match payload {
        "auto" => Some(FanPreset::Auto),
        "min" => Some(FanPreset::Min),
        "medium" => Some(FanPreset::Medium),
        "max" => Some(FanPreset::Max),
        _ => None,
    }
}

pub fn mode_payload(mode: CurrentMode) -> &'static str {
    if mode == CurrentMode::Cooling {
        MODE_COOL
    } else {
        MODE_AUTO
    }
}

pub fn parse_mode(payload: &str) -> Option<ModeReport> {
    match payload {
        MODE_COOL => Some(ModeReport::Cool),
        MODE_AUTO => Some(ModeReport::Auto),
        MODE_OFF => Some(ModeReport::Off),
        _ => None,
    }
}

pub fn power_payload(on: bool) -> &'static str {
    if on {
        POWER_ON
    } else {
        POWER_OFF
    }
}

pub fn power_from_payload(payload: &str) -> bool {
    payload == POWER_ON
}

pub fn swing_payload(swing: bool) -> &'static str {
    if swing {
        SWING_AUTO
    } else {
        SWING_OFF
    }
}

pub fn swing_from_payload(payload: &str) -> bool {
    payload == SWING_AUTO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_bands_follow_lower_inclusive_edges() {
        assert_eq!(preset_for_percent(0), FanPreset::Auto);
        assert_eq!(preset_for_percent(24), FanPreset::Auto);
        assert_eq!(preset_for_percent(25), FanPreset::Min);
        assert_eq!(preset_for_percent(49), FanPreset::Min);
        assert_eq!(preset_for_percent(50), FanPreset::Medium);
        assert_eq!(preset_for_percent(74), FanPreset::Medium);
        assert_eq!(preset_for_percent(75), FanPreset::Max);
        assert_eq!(preset_for_percent(100), FanPreset::Max);
    }

    #[test]
    fn fan_presets_are_monotonic() {
        let mut previous = preset_for_percent(0);
        for percent in 0..=100u8 {
            let preset = preset_for_percent(percent);
            assert!(preset >= previous, "{percent}% went from {previous:?} to {preset:?}");
            previous = preset;
        }
    }

    #[test]
    fn inbound_presets_do_not_invert_outbound_bands() {
        // auto is the full-speed signal on the way back in.
        assert_eq!(percent_for_preset(preset_for_percent(10)), 100);
        assert_eq!(percent_for_preset(preset_for_percent(30)), 25);
        assert_eq!(percent_for_preset(preset_for_percent(60)), 50);
        assert_eq!(percent_for_preset(preset_for_percent(90)), 75);
        assert_eq!(percent_for_preset(FanPreset::Max), 75);
        assert_eq!(preset_for_percent(100), FanPreset::Max);
    }

    #[test]
    fn preset_words_parse_back() {
        for preset in [FanPreset::Auto, FanPreset::Min, FanPreset::Medium, FanPreset::Max] {
            assert_eq!(parse_preset(preset.as_str()), Some(preset));
        }
        assert_eq!(parse_preset("turbo"), None);
    }

    #[test]
    fn mode_words() {
        assert_eq!(mode_payload(CurrentMode::Cooling), "cool");
        assert_eq!(mode_payload(CurrentMode::Idle), "auto");
        assert_eq!(mode_payload(CurrentMode::Inactive), "auto");
        assert_eq!(parse_mode("off"), Some(ModeReport::Off));
        assert_eq!(parse_mode("dry"), None);
    }

    #[test]
    fn swing_and_power_words() {
        assert_eq!(swing_payload(true), "auto");
        assert_eq!(swing_payload(false), "off");
        assert!(swing_from_payload("auto"));
        assert!(!swing_from_payload("on"));
        assert!(power_from_payload("on"));
        assert!(!power_from_payload("anything"));
    }
}
