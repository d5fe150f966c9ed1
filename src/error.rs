use std::time::Duration;

use thiserror::Error;

// Main application error type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Translator error: {0}")]
    Start(#[from] StartError),
}

/// Frame-source failures. Permission denial is terminal for the loop
/// instance that requested the stream; it is surfaced, never silently
/// retried.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Transient classifier failures. The loop recovers from these by treating
/// the frame as "no sign visible".
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Classification timed out after {0:?}")]
    Timeout(Duration),
    #[error("Classifier failure: {0}")]
    Backend(String),
}

/// Speech backend failures. The serializer recovers by resetting to idle;
/// the failed utterance is not retried.
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("Speech backend failure: {0}")]
    Backend(String),
}

/// Errors assembling or starting the translation loop.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("The translator is already started.")]
    AlreadyStarted,
    #[error("The translator is stopped.")]
    Stopped,
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
    #[error("Failed to subscribe to the frame source: {0}")]
    Capture(#[from] CaptureError),
}
