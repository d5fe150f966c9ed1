//! Spoken and haptic feedback seams.

mod console;

pub use console::ConsoleSpeech;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SpeechError;

/// Text-to-speech playback.
///
/// `speak` resolves exactly once, when playback finishes or fails; it is
/// the async analog of paired done/error callbacks. The serializer spawns
/// the call, so resolution can never race ahead of the call itself.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn speak(&self, phrase: &str) -> Result<(), SpeechError>;

    fn name(&self) -> &'static str {
        "speech"
    }
}

/// Short device vibration fired when a new sign is detected. Synchronous,
/// fire-and-forget, independent of speech playback.
pub trait Haptics: Send + Sync {
    fn pulse(&self);
}

/// No-op haptics for hosts without a vibration motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHaptics;

impl Haptics for NoopHaptics {
    fn pulse(&self) {}
}

/// Logs pulses; stands in for a platform vibration API in the demo.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn pulse(&self) {
        debug!("haptic pulse");
    }
}
