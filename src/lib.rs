pub mod capture;
pub mod classify;
pub mod common;
pub mod config;
pub mod controller;
pub mod error;
pub mod pipeline;
pub mod speech;

pub use capture::{FrameSource, FrameSubscription, ScriptCard, SyntheticCamera};
pub use classify::{Classifier, PaletteClassifier};
pub use common::Frame;
pub use config::{PipelineTuning, Settings};
pub use controller::{DebugSnapshot, LoopState, Translator, TranslatorBuilder};
pub use error::{AppError, CaptureError, ClassifyError, SpeechError, StartError};
pub use pipeline::{ChangeSuppressor, DetectionEvent, DetectionLabel, PipelineEvent};
pub use speech::{ConsoleSpeech, Haptics, LogHaptics, NoopHaptics, SpeechBackend};
