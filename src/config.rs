//! Tunables for the accessory.
//!
//! Everything time-related is an [`embassy_time::Duration`] so it can be fed
//! straight into the scheduler and timers.

use embassy_time::Duration;
use heapless::Vec;

use crate::ButtonId;
use crate::gesture::GestureClass;
use crate::ports::GyroRange;

/// Maximum number of buttons a board may wire to roles.
pub const MAX_BUTTONS: usize = 4;

/// The boot button on the devkit.
pub const BOOT_BUTTON: ButtonId = 0;

/// What a classified gesture asks the coordinator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Gesture deliberately left unbound.
    Nothing,
    /// Enable the accessory service if disabled, disable it otherwise.
    ToggleService,
    /// Re-enter pairing mode after it timed out.
    ResumePairing,
    /// Let a nearby device read the serial number.
    SerialNumberLookup,
}

/// Actions bound to each gesture class for one button role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonBinding {
    pub button: ButtonId,
    pub short_action: Action,
    pub medium_action: Action,
    pub long_action: Action,
}

impl ButtonBinding {
    pub fn action(&self, class: GestureClass) -> Action {
        match class {
            GestureClass::Short => self.short_action,
            GestureClass::Medium => self.medium_action,
            GestureClass::Long => self.long_action,
        }
    }
}

/// Button-to-action wiring for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonMap(Vec<ButtonBinding, MAX_BUTTONS>);

impl ButtonMap {
    /// A wearable tag with a single button doing everything.
    pub fn wearable() -> Self {
        Self::single(ButtonBinding {
            button: BOOT_BUTTON,
            short_action: Action::ResumePairing,
            medium_action: Action::SerialNumberLookup,
            long_action: Action::ToggleService,
        })
    }

    /// A tag paired with an external sensor, where pairing is driven by the
    /// companion device and the button only reveals the serial number.
    pub fn sensor_paired() -> Self {
        Self::single(ButtonBinding {
            button: BOOT_BUTTON,
            short_action: Action::SerialNumberLookup,
            medium_action: Action::Nothing,
            long_action: Action::ToggleService,
        })
    }

    pub fn new(bindings: Vec<ButtonBinding, MAX_BUTTONS>) -> Self {
        Self(bindings)
    }

    pub fn binding(&self, button: ButtonId) -> Option<&ButtonBinding> {
        self.0.iter().find(|b| b.button == button)
    }

    fn single(binding: ButtonBinding) -> Self {
        let mut bindings = Vec::new();
        // capacity is MAX_BUTTONS, one always fits
        let _ = bindings.push(binding);
        Self(bindings)
    }
}

/// Hold-time thresholds splitting gestures into classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    /// Holds shorter than this are short.
    pub lower: Duration,
    /// Holds at least this long are long.
    pub upper: Duration,
    /// Extra hold past `upper` that turns a long gesture into a factory reset.
    pub factory_reset_extension: Duration,
}

impl GestureConfig {
    pub fn factory_reset_hold(&self) -> Duration {
        self.upper + self.factory_reset_extension
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            lower: Duration::from_secs(1),
            upper: Duration::from_secs(3),
            factory_reset_extension: Duration::from_secs(7),
        }
    }
}

/// How long each kind of sound plays before it stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundConfig {
    pub remote: Duration,
    pub unwanted_tracking: Duration,
    pub acknowledge: Duration,
    pub factory_reset_chime: Duration,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            remote: Duration::from_secs(10),
            unwanted_tracking: Duration::from_secs(5),
            acknowledge: Duration::from_secs(1),
            factory_reset_chime: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionConfig {
    /// Average rotation rate, in rad/s, above which a window counts as motion.
    pub threshold: f64,
    pub sample_rate_hz: u32,
    pub range: GyroRange,
}

impl MotionConfig {
    pub fn sample_period(&self) -> Duration {
        Duration::from_hz(self.sample_rate_hz as u64)
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.436,
            sample_rate_hz: 50,
            range: GyroRange::Dps250,
        }
    }
}

/// The coordinator's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub gestures: GestureConfig,
    pub buttons: ButtonMap,
    pub sound: SoundConfig,
    pub motion: MotionConfig,
    /// Delay between enable/disable attempts. Fixed, retried until success
    /// or until a newer activation supersedes it.
    pub retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gestures: GestureConfig::default(),
            buttons: ButtonMap::wearable(),
            sound: SoundConfig::default(),
            motion: MotionConfig::default(),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_reset_needs_ten_seconds_by_default() {
        let gestures = GestureConfig::default();
        assert_eq!(gestures.factory_reset_hold(), Duration::from_secs(10));
    }

    #[test]
    fn fifty_hertz_is_a_twenty_millisecond_period() {
        assert_eq!(
            MotionConfig::default().sample_period(),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn presets_differ_only_in_short_and_medium() {
        let wearable = ButtonMap::wearable();
        let paired = ButtonMap::sensor_paired();
        let w = wearable.binding(BOOT_BUTTON).unwrap();
        let p = paired.binding(BOOT_BUTTON).unwrap();
        assert_eq!(w.action(GestureClass::Short), Action::ResumePairing);
        assert_eq!(p.action(GestureClass::Short), Action::SerialNumberLookup);
        assert_eq!(p.action(GestureClass::Medium), Action::Nothing);
        assert_eq!(w.action(GestureClass::Long), p.action(GestureClass::Long));
    }

    #[test]
    fn unbound_button_has_no_binding() {
        assert!(ButtonMap::wearable().binding(3).is_none());
    }
}
