use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::pipeline::throttle::{
    stride_for_multiplier, BASELINE_STRIDE, MAX_FREQUENCY_MULTIPLIER, MIN_FREQUENCY_MULTIPLIER,
};

/// User-facing translation settings.
///
/// The loop treats these as a read-only surface: the hosting layer owns
/// them and publishes changes over a watch channel. Only the detection
/// frequency and the feedback toggles are honored mid-run; accuracy mode
/// is read once at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Detection-frequency multiplier, 0.2x to 2.0x of the baseline
    /// sampling rate in 0.1 steps.
    pub detection_frequency: f64,
    /// Speak each newly detected sign out loud.
    pub auto_speak: bool,
    /// Trade processing cost for classification accuracy.
    pub high_accuracy: bool,
    /// Vibrate when a new sign is detected.
    pub vibration_feedback: bool,
    /// Mirror pipeline internals to the log in the demo binary.
    pub show_debug_info: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            detection_frequency: 1.0,
            auto_speak: true,
            high_accuracy: false,
            vibration_feedback: true,
            show_debug_info: false,
        }
    }
}

impl Settings {
    /// Loads settings from an optional `signspeak.toml` next to the binary
    /// plus `SIGNSPEAK_*` environment overrides, on top of the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let cfg = Config::builder()
            .set_default("detection_frequency", defaults.detection_frequency)?
            .set_default("auto_speak", defaults.auto_speak)?
            .set_default("high_accuracy", defaults.high_accuracy)?
            .set_default("vibration_feedback", defaults.vibration_feedback)?
            .set_default("show_debug_info", defaults.show_debug_info)?
            .add_source(File::with_name("signspeak").required(false))
            .add_source(Environment::with_prefix("SIGNSPEAK").try_parsing(true))
            .build()?;
        Ok(cfg.try_deserialize::<Settings>()?.normalized())
    }

    /// Clamps the multiplier into range and snaps it to the 0.1 grid the
    /// settings slider exposes.
    pub fn normalized(mut self) -> Self {
        let clamped = self
            .detection_frequency
            .clamp(MIN_FREQUENCY_MULTIPLIER, MAX_FREQUENCY_MULTIPLIER);
        self.detection_frequency = (clamped * 10.0).round() / 10.0;
        self
    }

    /// Sampling stride for the current multiplier.
    pub fn stride(&self, baseline: u32) -> u32 {
        stride_for_multiplier(baseline, self.detection_frequency)
    }
}

/// Internal pacing knobs with workable defaults. These are wiring-level
/// values, not user settings.
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    /// Observed frames per forwarded frame at a 1.0x multiplier.
    pub baseline_stride: u32,
    /// Deadline for one classifier call.
    pub classify_timeout: Duration,
    /// Deadline when high-accuracy mode is on.
    pub high_accuracy_timeout: Duration,
    /// Capacity of the pipeline event broadcast.
    pub event_capacity: usize,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            baseline_stride: BASELINE_STRIDE,
            classify_timeout: Duration::from_millis(800),
            high_accuracy_timeout: Duration::from_millis(2000),
            event_capacity: 64,
        }
    }
}

impl PipelineTuning {
    /// The classification deadline to apply for the accuracy setting.
    pub fn timeout_for(&self, high_accuracy: bool) -> Duration {
        if high_accuracy {
            self.high_accuracy_timeout
        } else {
            self.classify_timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_settings_screen() {
        let settings = Settings::default();
        assert_eq!(settings.detection_frequency, 1.0);
        assert!(settings.auto_speak);
        assert!(!settings.high_accuracy);
        assert!(settings.vibration_feedback);
        assert!(!settings.show_debug_info);
    }

    #[test]
    fn normalized_clamps_and_snaps_the_multiplier() {
        let snap = |value: f64| {
            Settings {
                detection_frequency: value,
                ..Settings::default()
            }
            .normalized()
            .detection_frequency
        };
        assert_eq!(snap(2.7), 2.0);
        assert_eq!(snap(0.05), 0.2);
        assert_eq!(snap(1.27), 1.3);
        assert_eq!(snap(0.44), 0.4);
        assert_eq!(snap(1.0), 1.0);
    }

    #[test]
    fn stride_follows_the_multiplier() {
        let mut settings = Settings::default();
        assert_eq!(settings.stride(BASELINE_STRIDE), 30);
        settings.detection_frequency = 2.0;
        assert_eq!(settings.stride(BASELINE_STRIDE), 15);
        settings.detection_frequency = 0.2;
        assert_eq!(settings.stride(BASELINE_STRIDE), 150);
    }
}
