//! The public surface of the translation loop.

mod state;
mod worker;

pub use state::{next_state, LoopRequest, LoopState, LoopStateMachine};
pub use worker::DebugSnapshot;

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::capture::FrameSource;
use crate::classify::{classification_stack, Classifier};
use crate::config::{PipelineTuning, Settings};
use crate::error::StartError;
use crate::pipeline::feedback::FeedbackSerializer;
use crate::pipeline::suppress::ChangeSuppressor;
use crate::pipeline::throttle::SamplingThrottle;
use crate::pipeline::types::{DetectionLabel, PipelineEvent};
use crate::speech::{Haptics, NoopHaptics, SpeechBackend};
use worker::{PipelineWorker, WorkerCommand, WorkerParts};

/// Handle to one translation loop instance.
///
/// Owns the lifecycle: `start` subscribes to the frame source and spawns
/// the loop task; `stop` is idempotent and terminal and also runs on drop,
/// so the stream is released on every exit path. A stopped translator is
/// done for good; build a fresh one to translate again.
pub struct Translator {
    id: Uuid,
    cancel: CancellationToken,
    command_tx: mpsc::Sender<WorkerCommand>,
    state_tx: Arc<watch::Sender<LoopState>>,
    state_rx: watch::Receiver<LoopState>,
    label_rx: watch::Receiver<Option<DetectionLabel>>,
    events: broadcast::Sender<PipelineEvent>,
    launch: Mutex<Option<Launch>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Start-once materials, consumed by the first successful `start`.
struct Launch {
    source: Arc<dyn FrameSource>,
    classifier: Arc<dyn Classifier>,
    speech: Arc<dyn SpeechBackend>,
    haptics: Arc<dyn Haptics>,
    settings_rx: watch::Receiver<Settings>,
    tuning: PipelineTuning,
    command_rx: mpsc::Receiver<WorkerCommand>,
    label_tx: watch::Sender<Option<DetectionLabel>>,
}

impl Translator {
    /// Begins sampling and classification (Idle to Running).
    ///
    /// A denied or unavailable frame source surfaces here and leaves the
    /// translator stopped; starting twice or after a stop is an error.
    pub async fn start(&self) -> Result<(), StartError> {
        if self.cancel.is_cancelled() {
            return Err(StartError::Stopped);
        }
        let launch = self
            .launch
            .lock()
            .expect("translator launch lock poisoned")
            .take();
        let Some(launch) = launch else {
            return Err(StartError::AlreadyStarted);
        };
        let subscription = match launch.source.subscribe().await {
            Ok(subscription) => subscription,
            Err(err) => {
                // Terminal for this instance; surfaced, never retried.
                self.stop();
                return Err(err.into());
            }
        };
        info!(translator = %self.id, "frame source subscribed, starting loop");
        let settings = launch.settings_rx.borrow().clone().normalized();
        let deadline = launch.tuning.timeout_for(settings.high_accuracy);
        let classifier = classification_stack(launch.classifier, deadline);
        let (completion_tx, completion_rx) = mpsc::channel(4);
        let feedback = FeedbackSerializer::new(
            launch.speech,
            launch.haptics,
            completion_tx,
            launch.label_tx,
            self.events.clone(),
        );
        let throttle = SamplingThrottle::new(settings.stride(launch.tuning.baseline_stride));
        let worker = PipelineWorker::new(WorkerParts {
            subscription,
            classifier,
            deadline,
            throttle,
            suppressor: ChangeSuppressor::new(),
            feedback,
            settings,
            settings_rx: launch.settings_rx,
            command_rx: launch.command_rx,
            completion_rx,
            cancel: self.cancel.clone(),
            state_tx: self.state_tx.clone(),
            events: self.events.clone(),
            baseline_stride: launch.tuning.baseline_stride,
        });
        let task = tokio::spawn(worker.run());
        self.task
            .lock()
            .expect("translator task lock poisoned")
            .replace(task);
        Ok(())
    }

    /// Suspends classification. Frames keep arriving and the sampling
    /// counter keeps advancing, but nothing is forwarded. A no-op unless
    /// the loop is running.
    pub async fn pause(&self) {
        self.request(|done| WorkerCommand::Pause { done }).await;
    }

    /// Resumes a paused loop. A no-op unless the loop is paused.
    pub async fn resume(&self) {
        self.request(|done| WorkerCommand::Resume { done }).await;
    }

    async fn request(&self, make: impl FnOnce(oneshot::Sender<()>) -> WorkerCommand) {
        if !self.started() {
            debug!(translator = %self.id, "loop command ignored, not started");
            return;
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self.command_tx.send(make(done_tx)).await.is_err() {
            debug!(translator = %self.id, "loop command ignored, worker gone");
            return;
        }
        let _ = done_rx.await;
    }

    fn started(&self) -> bool {
        self.launch
            .lock()
            .expect("translator launch lock poisoned")
            .is_none()
    }

    /// Stops the loop for good. Idempotent, non-blocking, and also invoked
    /// on drop.
    pub fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!(translator = %self.id, "stop requested");
        self.cancel.cancel();
        // With no worker spawned yet there is nobody else to publish the
        // terminal state.
        if self
            .task
            .lock()
            .expect("translator task lock poisoned")
            .is_none()
        {
            self.state_tx.send_if_modified(|state| {
                if *state == LoopState::Stopped {
                    false
                } else {
                    *state = LoopState::Stopped;
                    true
                }
            });
        }
    }

    /// Completes once the loop has reached Stopped and its task has wound
    /// down. Safe to call more than once.
    pub async fn join(&self) {
        let mut state = self.state_rx.clone();
        let _ = state.wait_for(|state| *state == LoopState::Stopped).await;
        let task = self
            .task
            .lock()
            .expect("translator task lock poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Observable loop lifecycle state.
    pub fn state(&self) -> watch::Receiver<LoopState> {
        self.state_rx.clone()
    }

    /// Observable "currently detected sign" for presentation layers.
    pub fn detected_label(&self) -> watch::Receiver<Option<DetectionLabel>> {
        self.label_rx.clone()
    }

    /// Subscribes to pipeline events (state changes, detections,
    /// utterances).
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Point-in-time pipeline internals; `None` unless the loop is live.
    pub async fn debug_snapshot(&self) -> Option<DebugSnapshot> {
        if !self.started() {
            return None;
        }
        let (responder, response) = oneshot::channel();
        self.command_tx
            .send(WorkerCommand::Snapshot { responder })
            .await
            .ok()?;
        response.await.ok()
    }
}

impl Drop for Translator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Assembles a [`Translator`] from its collaborators.
pub struct TranslatorBuilder {
    source: Option<Arc<dyn FrameSource>>,
    classifier: Option<Arc<dyn Classifier>>,
    speech: Option<Arc<dyn SpeechBackend>>,
    haptics: Arc<dyn Haptics>,
    settings_rx: Option<watch::Receiver<Settings>>,
    tuning: PipelineTuning,
}

impl TranslatorBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            classifier: None,
            speech: None,
            haptics: Arc::new(NoopHaptics),
            settings_rx: None,
            tuning: PipelineTuning::default(),
        }
    }

    pub fn frame_source(mut self, source: Arc<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn speech(mut self, speech: Arc<dyn SpeechBackend>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    /// Fixed settings for the lifetime of the loop.
    pub fn settings(mut self, settings: Settings) -> Self {
        let (_settings_tx, settings_rx) = watch::channel(settings.normalized());
        self.settings_rx = Some(settings_rx);
        self
    }

    /// Live settings published by the hosting layer; the loop retunes as
    /// they change.
    pub fn live_settings(mut self, settings_rx: watch::Receiver<Settings>) -> Self {
        self.settings_rx = Some(settings_rx);
        self
    }

    /// Overrides the internal pacing knobs.
    pub fn tuning(mut self, tuning: PipelineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn build(self) -> Result<Translator, StartError> {
        let source = self
            .source
            .ok_or(StartError::MissingComponent("frame source"))?;
        let classifier = self
            .classifier
            .ok_or(StartError::MissingComponent("classifier"))?;
        let speech = self
            .speech
            .ok_or(StartError::MissingComponent("speech backend"))?;
        let settings_rx = self.settings_rx.unwrap_or_else(|| {
            let (_settings_tx, settings_rx) = watch::channel(Settings::default());
            settings_rx
        });
        let (command_tx, command_rx) = mpsc::channel(8);
        let (label_tx, label_rx) = watch::channel(None);
        let (events, _) = broadcast::channel(self.tuning.event_capacity);
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);
        Ok(Translator {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            command_tx,
            state_tx: Arc::new(state_tx),
            state_rx,
            label_rx,
            events,
            launch: Mutex::new(Some(Launch {
                source,
                classifier,
                speech,
                haptics: self.haptics,
                settings_rx,
                tuning: self.tuning,
                command_rx,
                label_tx,
            })),
            task: Mutex::new(None),
        })
    }
}

impl Default for TranslatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
