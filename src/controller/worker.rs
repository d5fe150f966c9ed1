//! The translation loop task.
//!
//! One spawned task owns every mutable piece of the pipeline: the
//! throttle, the suppressor, the feedback serializer, and the lifecycle
//! state machine. Everything reaches it over channels, so there is no
//! shared-state locking on the frame path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{LoopRequest, LoopState, LoopStateMachine};
use crate::capture::FrameSubscription;
use crate::classify::{classify_one, ClassifierStack};
use crate::common::Frame;
use crate::config::Settings;
use crate::error::ClassifyError;
use crate::pipeline::feedback::{FeedbackSerializer, UtteranceCompletion};
use crate::pipeline::suppress::ChangeSuppressor;
use crate::pipeline::throttle::SamplingThrottle;
use crate::pipeline::types::{DetectionLabel, PipelineEvent};

/// Requests sent from the `Translator` handle into the loop task.
pub(crate) enum WorkerCommand {
    Pause { done: oneshot::Sender<()> },
    Resume { done: oneshot::Sender<()> },
    Snapshot { responder: oneshot::Sender<DebugSnapshot> },
}

/// Point-in-time pipeline internals for debug views.
#[derive(Debug, Clone)]
pub struct DebugSnapshot {
    pub state: LoopState,
    pub stride: u32,
    pub frames_observed: u64,
    pub frames_forwarded: u64,
    pub frames_skipped_busy: u64,
    pub classification_failures: u64,
    pub utterances_spoken: u64,
    pub utterances_dropped: u64,
    pub last_label: Option<DetectionLabel>,
    pub classification_in_flight: bool,
}

struct ClassificationOutcome {
    frame_seq: u64,
    outcome: Result<Option<DetectionLabel>, ClassifyError>,
}

struct InFlight {
    frame_seq: u64,
    task: JoinHandle<()>,
}

/// Everything the worker needs, assembled by the `Translator` at start.
pub(crate) struct WorkerParts {
    pub subscription: FrameSubscription,
    pub classifier: ClassifierStack,
    pub deadline: Duration,
    pub throttle: SamplingThrottle,
    pub suppressor: ChangeSuppressor,
    pub feedback: FeedbackSerializer,
    pub settings: Settings,
    pub settings_rx: watch::Receiver<Settings>,
    pub command_rx: mpsc::Receiver<WorkerCommand>,
    pub completion_rx: mpsc::Receiver<UtteranceCompletion>,
    pub cancel: CancellationToken,
    pub state_tx: Arc<watch::Sender<LoopState>>,
    pub events: broadcast::Sender<PipelineEvent>,
    pub baseline_stride: u32,
}

pub(crate) struct PipelineWorker {
    subscription: FrameSubscription,
    classifier: ClassifierStack,
    deadline: Duration,
    throttle: SamplingThrottle,
    suppressor: ChangeSuppressor,
    feedback: FeedbackSerializer,
    machine: LoopStateMachine,
    settings: Settings,
    settings_rx: watch::Receiver<Settings>,
    settings_live: bool,
    command_rx: mpsc::Receiver<WorkerCommand>,
    completion_rx: mpsc::Receiver<UtteranceCompletion>,
    classified_tx: mpsc::Sender<ClassificationOutcome>,
    classified_rx: mpsc::Receiver<ClassificationOutcome>,
    cancel: CancellationToken,
    state_tx: Arc<watch::Sender<LoopState>>,
    events: broadcast::Sender<PipelineEvent>,
    baseline_stride: u32,
    in_flight: Option<InFlight>,
    frames_forwarded: u64,
    frames_skipped_busy: u64,
    classification_failures: u64,
}

impl PipelineWorker {
    pub(crate) fn new(parts: WorkerParts) -> Self {
        let (classified_tx, classified_rx) = mpsc::channel(2);
        Self {
            subscription: parts.subscription,
            classifier: parts.classifier,
            deadline: parts.deadline,
            throttle: parts.throttle,
            suppressor: parts.suppressor,
            feedback: parts.feedback,
            machine: LoopStateMachine::new(),
            settings: parts.settings,
            settings_rx: parts.settings_rx,
            settings_live: true,
            command_rx: parts.command_rx,
            completion_rx: parts.completion_rx,
            classified_tx,
            classified_rx,
            cancel: parts.cancel,
            state_tx: parts.state_tx,
            events: parts.events,
            baseline_stride: parts.baseline_stride,
            in_flight: None,
            frames_forwarded: 0,
            frames_skipped_busy: 0,
            classification_failures: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        // A stop that raced the spawn wins outright.
        if self.cancel.is_cancelled() {
            self.transition(LoopRequest::Stop);
            self.shutdown();
            return;
        }
        self.transition(LoopRequest::Start);
        info!(stride = self.throttle.stride(), "translation loop running");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.transition(LoopRequest::Stop);
                    break;
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.on_command(command),
                        None => {
                            // Handle gone without an explicit stop.
                            self.transition(LoopRequest::Stop);
                            break;
                        }
                    }
                }
                changed = self.settings_rx.changed(), if self.settings_live => {
                    match changed {
                        Ok(()) => self.on_settings_changed(),
                        // Publisher gone; keep the last snapshot.
                        Err(_) => self.settings_live = false,
                    }
                }
                maybe_frame = self.subscription.recv() => {
                    match maybe_frame {
                        Some(frame) => self.on_frame(frame),
                        None => {
                            info!("frame source ended, stopping translation loop");
                            self.transition(LoopRequest::Stop);
                            break;
                        }
                    }
                }
                Some(result) = self.classified_rx.recv() => {
                    self.on_classified(result);
                }
                Some(completion) = self.completion_rx.recv() => {
                    self.feedback.on_completion(completion);
                }
            }
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
        }
        self.feedback.shutdown();
        info!(
            frames = self.throttle.frames_observed(),
            forwarded = self.frames_forwarded,
            spoken = self.feedback.utterances_spoken(),
            "translation loop stopped"
        );
    }

    fn transition(&mut self, request: LoopRequest) {
        if let Some(next) = self.machine.apply(request) {
            self.state_tx.send_replace(next);
            let _ = self.events.send(PipelineEvent::StateChanged(next));
            debug!(state = ?next, "loop state changed");
        }
    }

    fn on_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Pause { done } => {
                self.transition(LoopRequest::Pause);
                let _ = done.send(());
            }
            WorkerCommand::Resume { done } => {
                self.transition(LoopRequest::Resume);
                let _ = done.send(());
            }
            WorkerCommand::Snapshot { responder } => {
                let _ = responder.send(self.snapshot());
            }
        }
    }

    fn on_settings_changed(&mut self) {
        let settings = self.settings_rx.borrow_and_update().clone().normalized();
        if settings.detection_frequency != self.settings.detection_frequency {
            let stride = settings.stride(self.baseline_stride);
            self.throttle.retune(stride);
            info!(
                stride,
                multiplier = settings.detection_frequency,
                "sampling stride retuned"
            );
        }
        self.settings = settings;
    }

    fn on_frame(&mut self, frame: Frame) {
        // The counter advances even while paused; forwarding does not.
        let forward = self.throttle.observe();
        if self.machine.state() != LoopState::Running || !forward {
            return;
        }
        if self.in_flight.is_some() {
            // Exclusion, not buffering: the sampled frame is skipped
            // outright while a classification is pending.
            self.frames_skipped_busy += 1;
            debug!(seq = frame.seq(), "classification in flight, skipping sampled frame");
            return;
        }
        self.frames_forwarded += 1;
        let frame_seq = frame.seq();
        let stack = self.classifier.clone();
        let deadline = self.deadline;
        let classified_tx = self.classified_tx.clone();
        let task = tokio::spawn(async move {
            let outcome = classify_one(stack, frame, deadline).await;
            let _ = classified_tx
                .send(ClassificationOutcome { frame_seq, outcome })
                .await;
        });
        self.in_flight = Some(InFlight { frame_seq, task });
    }

    fn on_classified(&mut self, result: ClassificationOutcome) {
        match self.in_flight.take() {
            Some(in_flight) if in_flight.frame_seq == result.frame_seq => {}
            Some(other) => {
                self.in_flight = Some(other);
                debug!(seq = result.frame_seq, "stale classification result discarded");
                return;
            }
            None => {
                debug!(seq = result.frame_seq, "untracked classification result discarded");
                return;
            }
        }
        if self.machine.state() != LoopState::Running {
            debug!(
                seq = result.frame_seq,
                "classification resolved while not running, result discarded"
            );
            return;
        }
        let label = match result.outcome {
            Ok(label) => label,
            Err(err) => {
                self.classification_failures += 1;
                warn!(
                    seq = result.frame_seq,
                    error = %err,
                    "transient classification failure, treating as no sign"
                );
                let _ = self.events.send(PipelineEvent::ClassificationFailed {
                    frame_seq: result.frame_seq,
                });
                None
            }
        };
        if let Some(event) = self.suppressor.evaluate(result.frame_seq, label) {
            info!(label = %event.label, seq = event.frame_seq, "sign detected");
            let _ = self.events.send(PipelineEvent::Detected(event));
            self.feedback.on_event(event, &self.settings);
        }
    }

    fn snapshot(&self) -> DebugSnapshot {
        DebugSnapshot {
            state: self.machine.state(),
            stride: self.throttle.stride(),
            frames_observed: self.throttle.frames_observed(),
            frames_forwarded: self.frames_forwarded,
            frames_skipped_busy: self.frames_skipped_busy,
            classification_failures: self.classification_failures,
            utterances_spoken: self.feedback.utterances_spoken(),
            utterances_dropped: self.feedback.utterances_dropped(),
            last_label: self.suppressor.last_label(),
            classification_in_flight: self.in_flight.is_some(),
        }
    }
}
