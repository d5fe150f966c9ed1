//! Down-samples the observed frame rate to the configured detection rate.

/// Observed frames per forwarded frame at a 1.0x detection frequency.
/// Against a nominal 30 fps source this yields about one classification
/// per second.
pub const BASELINE_STRIDE: u32 = 30;

/// Bounds of the user-settable detection-frequency multiplier.
pub const MIN_FREQUENCY_MULTIPLIER: f64 = 0.2;
pub const MAX_FREQUENCY_MULTIPLIER: f64 = 2.0;

/// Maps the detection-frequency multiplier onto a sampling stride.
///
/// A higher multiplier samples more often, so the stride shrinks.
/// Out-of-range multipliers are clamped and the result is never below 1.
pub fn stride_for_multiplier(baseline: u32, multiplier: f64) -> u32 {
    let clamped = multiplier.clamp(MIN_FREQUENCY_MULTIPLIER, MAX_FREQUENCY_MULTIPLIER);
    ((f64::from(baseline) / clamped).round() as u32).max(1)
}

/// Gate deciding which observed frames are forwarded to the classifier.
///
/// Holds no frames: just a counter incremented once per observed frame
/// plus the current stride. The counter keeps advancing even when the
/// caller suppresses forwarding, so pausing never rewinds the cadence.
#[derive(Debug)]
pub struct SamplingThrottle {
    stride: u32,
    counter: u64,
}

impl SamplingThrottle {
    pub fn new(stride: u32) -> Self {
        Self {
            stride: stride.max(1),
            counter: 0,
        }
    }

    pub fn from_multiplier(baseline: u32, multiplier: f64) -> Self {
        Self::new(stride_for_multiplier(baseline, multiplier))
    }

    /// Counts one observed frame; true iff it should be forwarded.
    pub fn observe(&mut self) -> bool {
        let forward = self.counter % u64::from(self.stride) == 0;
        self.counter += 1;
        forward
    }

    /// Swaps the stride without disturbing the frame counter.
    pub fn retune(&mut self, stride: u32) {
        self.stride = stride.max(1);
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn frames_observed(&self) -> u64 {
        self.counter
    }
}
