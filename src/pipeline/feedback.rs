//! Serializes spoken feedback so utterances never overlap.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::SpeechError;
use crate::pipeline::types::{DetectionEvent, DetectionLabel, PipelineEvent};
use crate::speech::{Haptics, SpeechBackend};

/// Whether an utterance is currently playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    Idle,
    Speaking,
}

/// Completion notice from a spawned utterance.
#[derive(Debug)]
pub struct UtteranceCompletion {
    pub utterance: Uuid,
    pub outcome: Result<(), SpeechError>,
}

/// Turns detection events into spoken and haptic feedback.
///
/// Owns the speech state: at most one utterance is ever in flight, an
/// event arriving while one plays has its utterance dropped rather than
/// queued, and the visible label still updates on every event regardless
/// of playback.
pub struct FeedbackSerializer {
    backend: Arc<dyn SpeechBackend>,
    haptics: Arc<dyn Haptics>,
    state: SpeechState,
    current: Option<Uuid>,
    playback: Option<JoinHandle<()>>,
    completion_tx: mpsc::Sender<UtteranceCompletion>,
    label_tx: watch::Sender<Option<DetectionLabel>>,
    events: broadcast::Sender<PipelineEvent>,
    utterances_spoken: u64,
    utterances_dropped: u64,
}

impl FeedbackSerializer {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        haptics: Arc<dyn Haptics>,
        completion_tx: mpsc::Sender<UtteranceCompletion>,
        label_tx: watch::Sender<Option<DetectionLabel>>,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            backend,
            haptics,
            state: SpeechState::Idle,
            current: None,
            playback: None,
            completion_tx,
            label_tx,
            events,
            utterances_spoken: 0,
            utterances_dropped: 0,
        }
    }

    pub fn speech_state(&self) -> SpeechState {
        self.state
    }

    /// Handles one detection event under the given settings.
    pub fn on_event(&mut self, event: DetectionEvent, settings: &Settings) {
        // Visual and haptic feedback are never gated by playback.
        self.label_tx.send_replace(Some(event.label));
        if settings.vibration_feedback {
            self.haptics.pulse();
        }
        if !settings.auto_speak {
            debug!(label = %event.label, "auto-speak off, skipping utterance");
            return;
        }
        if self.state == SpeechState::Speaking {
            self.utterances_dropped += 1;
            debug!(label = %event.label, "utterance in flight, dropping announcement");
            let _ = self
                .events
                .send(PipelineEvent::UtteranceDropped { label: event.label });
            return;
        }
        self.begin_utterance(event.label);
    }

    fn begin_utterance(&mut self, label: DetectionLabel) {
        let utterance = Uuid::new_v4();
        self.state = SpeechState::Speaking;
        self.current = Some(utterance);
        self.utterances_spoken += 1;
        let _ = self
            .events
            .send(PipelineEvent::UtteranceStarted { utterance, label });
        let backend = self.backend.clone();
        let completion_tx = self.completion_tx.clone();
        self.playback = Some(tokio::spawn(async move {
            let outcome = backend.speak(label.phrase()).await;
            let _ = completion_tx
                .send(UtteranceCompletion { utterance, outcome })
                .await;
        }));
    }

    /// Applies a playback completion; stale identities are discarded.
    pub fn on_completion(&mut self, completion: UtteranceCompletion) {
        if self.current != Some(completion.utterance) {
            debug!(utterance = %completion.utterance, "stale utterance completion discarded");
            return;
        }
        self.current = None;
        self.playback = None;
        self.state = SpeechState::Idle;
        let ok = match completion.outcome {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "speech backend failed, utterance abandoned");
                false
            }
        };
        let _ = self.events.send(PipelineEvent::UtteranceFinished {
            utterance: completion.utterance,
            ok,
        });
    }

    /// Aborts in-flight playback on loop teardown.
    pub fn shutdown(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.abort();
        }
        self.current = None;
        self.state = SpeechState::Idle;
    }

    pub fn utterances_spoken(&self) -> u64 {
        self.utterances_spoken
    }

    pub fn utterances_dropped(&self) -> u64 {
        self.utterances_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    struct GatedSpeech {
        calls: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl SpeechBackend for GatedSpeech {
        async fn speak(&self, _phrase: &str) -> Result<(), SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => {}
            }
            Ok(())
        }
    }

    struct FailingSpeech;

    #[async_trait]
    impl SpeechBackend for FailingSpeech {
        async fn speak(&self, _phrase: &str) -> Result<(), SpeechError> {
            Err(SpeechError::Backend("engine busy".to_string()))
        }
    }

    struct CountingHaptics(Arc<AtomicUsize>);

    impl Haptics for CountingHaptics {
        fn pulse(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Rig {
        serializer: FeedbackSerializer,
        completion_rx: mpsc::Receiver<UtteranceCompletion>,
        label_rx: watch::Receiver<Option<DetectionLabel>>,
        calls: Arc<AtomicUsize>,
        pulses: Arc<AtomicUsize>,
        gate: Arc<Semaphore>,
    }

    fn rig(backend: Arc<dyn SpeechBackend>, gate: Arc<Semaphore>, calls: Arc<AtomicUsize>) -> Rig {
        let (completion_tx, completion_rx) = mpsc::channel(4);
        let (label_tx, label_rx) = watch::channel(None);
        let (events, _) = broadcast::channel(16);
        let pulses = Arc::new(AtomicUsize::new(0));
        let haptics = Arc::new(CountingHaptics(pulses.clone()));
        let serializer = FeedbackSerializer::new(backend, haptics, completion_tx, label_tx, events);
        Rig {
            serializer,
            completion_rx,
            label_rx,
            calls,
            pulses,
            gate,
        }
    }

    fn gated_rig() -> Rig {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        rig(
            Arc::new(GatedSpeech {
                calls: calls.clone(),
                gate: gate.clone(),
            }),
            gate,
            calls,
        )
    }

    fn event(label: DetectionLabel, seq: u64) -> DetectionEvent {
        DetectionEvent::new(label, seq)
    }

    #[tokio::test]
    async fn second_event_while_speaking_drops_its_utterance() {
        let mut rig = gated_rig();
        let settings = Settings::default();

        rig.serializer
            .on_event(event(DetectionLabel::Hello, 0), &settings);
        assert_eq!(rig.serializer.speech_state(), SpeechState::Speaking);

        rig.serializer
            .on_event(event(DetectionLabel::ThankYou, 30), &settings);
        assert_eq!(rig.serializer.utterances_dropped(), 1);
        // The visible label still follows the dropped event.
        assert_eq!(*rig.label_rx.borrow(), Some(DetectionLabel::ThankYou));

        rig.gate.add_permits(1);
        let completion = rig
            .completion_rx
            .recv()
            .await
            .unwrap_or_else(|| panic!("completion channel closed"));
        rig.serializer.on_completion(completion);
        assert_eq!(rig.serializer.speech_state(), SpeechState::Idle);
        assert_eq!(rig.calls.load(Ordering::SeqCst), 1);

        // Idle again, so the next event speaks.
        rig.serializer
            .on_event(event(DetectionLabel::Hello, 60), &settings);
        rig.gate.add_permits(1);
        let completion = rig
            .completion_rx
            .recv()
            .await
            .unwrap_or_else(|| panic!("completion channel closed"));
        rig.serializer.on_completion(completion);
        assert_eq!(rig.calls.load(Ordering::SeqCst), 2);
        assert_eq!(rig.serializer.utterances_spoken(), 2);
    }

    #[tokio::test]
    async fn speech_failure_resets_to_idle_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut rig = rig(
            Arc::new(FailingSpeech),
            Arc::new(Semaphore::new(0)),
            calls,
        );
        rig.serializer
            .on_event(event(DetectionLabel::Hello, 0), &Settings::default());
        let completion = rig
            .completion_rx
            .recv()
            .await
            .unwrap_or_else(|| panic!("completion channel closed"));
        assert!(completion.outcome.is_err());
        rig.serializer.on_completion(completion);
        assert_eq!(rig.serializer.speech_state(), SpeechState::Idle);
        // No retry was scheduled.
        assert!(rig.completion_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn auto_speak_off_still_updates_label_and_haptics() {
        let mut rig = gated_rig();
        let settings = Settings {
            auto_speak: false,
            ..Settings::default()
        };
        rig.serializer
            .on_event(event(DetectionLabel::MyNameIs, 5), &settings);
        assert_eq!(rig.serializer.speech_state(), SpeechState::Idle);
        assert_eq!(rig.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*rig.label_rx.borrow(), Some(DetectionLabel::MyNameIs));
        assert_eq!(rig.pulses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn vibration_can_be_disabled_independently() {
        let mut rig = gated_rig();
        let settings = Settings {
            vibration_feedback: false,
            ..Settings::default()
        };
        rig.serializer
            .on_event(event(DetectionLabel::Hello, 0), &settings);
        assert_eq!(rig.pulses.load(Ordering::SeqCst), 0);
        assert_eq!(rig.serializer.speech_state(), SpeechState::Speaking);
    }

    #[tokio::test]
    async fn stale_completions_are_discarded() {
        let mut rig = gated_rig();
        rig.serializer
            .on_event(event(DetectionLabel::Hello, 0), &Settings::default());
        rig.serializer.on_completion(UtteranceCompletion {
            utterance: Uuid::new_v4(),
            outcome: Ok(()),
        });
        // The forged identity must not release the real utterance.
        assert_eq!(rig.serializer.speech_state(), SpeechState::Speaking);
    }

    #[tokio::test]
    async fn shutdown_aborts_playback() {
        let mut rig = gated_rig();
        rig.serializer
            .on_event(event(DetectionLabel::Hello, 0), &Settings::default());
        rig.serializer.shutdown();
        assert_eq!(rig.serializer.speech_state(), SpeechState::Idle);
        // The aborted task never delivers a completion.
        drop(rig.serializer);
        assert!(rig.completion_rx.recv().await.is_none());
    }
}
