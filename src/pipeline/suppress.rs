//! Suppresses repeat announcements while the same sign stays in view.

use crate::pipeline::types::{DetectionEvent, DetectionLabel};

/// Pure change predicate: emit iff the classifier recognized a sign and it
/// differs from the last emitted label.
pub fn should_emit(new: Option<&DetectionLabel>, last: Option<&DetectionLabel>) -> bool {
    match new {
        None => false,
        Some(label) => last != Some(label),
    }
}

/// Owns the last emitted label and mints `DetectionEvent`s on change.
///
/// A "none" result leaves the memory untouched, so a sign that briefly
/// drops out of view and returns is not re-announced. Only a different
/// recognized label overwrites the remembered one.
#[derive(Debug, Default)]
pub struct ChangeSuppressor {
    last: Option<DetectionLabel>,
}

impl ChangeSuppressor {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Evaluates one classifier result; `Some` means a new announcement.
    pub fn evaluate(
        &mut self,
        frame_seq: u64,
        result: Option<DetectionLabel>,
    ) -> Option<DetectionEvent> {
        if !should_emit(result.as_ref(), self.last.as_ref()) {
            return None;
        }
        let label = result?;
        self.last = Some(label);
        Some(DetectionEvent::new(label, frame_seq))
    }

    /// The most recently emitted label, if any.
    pub fn last_label(&self) -> Option<DetectionLabel> {
        self.last
    }
}
