//! Console stand-in for a platform TTS engine.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::SpeechBackend;
use crate::error::SpeechError;

/// Logs the phrase and models playback time as a per-word delay, so the
/// one-utterance-at-a-time behavior is observable in the demo.
pub struct ConsoleSpeech {
    per_word: Duration,
}

impl ConsoleSpeech {
    pub fn new(per_word: Duration) -> Self {
        Self { per_word }
    }
}

impl Default for ConsoleSpeech {
    fn default() -> Self {
        Self::new(Duration::from_millis(220))
    }
}

#[async_trait]
impl SpeechBackend for ConsoleSpeech {
    async fn speak(&self, phrase: &str) -> Result<(), SpeechError> {
        let words = phrase.split_whitespace().count().max(1) as u32;
        info!(phrase, "speaking");
        tokio::time::sleep(self.per_word * words).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "console"
    }
}
