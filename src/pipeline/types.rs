use std::fmt;

use uuid::Uuid;

use crate::controller::LoopState;

/// A recognized sign from the finite vocabulary the classifier is trained
/// on. Equality is by value; "no sign visible" is expressed as `None` at
/// the classifier seam, not as a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionLabel {
    Hello,
    ThankYou,
    HowAreYou,
    MyNameIs,
    NiceToMeetYou,
}

impl DetectionLabel {
    pub const ALL: [DetectionLabel; 5] = [
        DetectionLabel::Hello,
        DetectionLabel::ThankYou,
        DetectionLabel::HowAreYou,
        DetectionLabel::MyNameIs,
        DetectionLabel::NiceToMeetYou,
    ];

    /// The phrase handed to the speech backend for this sign.
    pub fn phrase(&self) -> &'static str {
        match self {
            DetectionLabel::Hello => "Hello",
            DetectionLabel::ThankYou => "Thank you",
            DetectionLabel::HowAreYou => "How are you?",
            DetectionLabel::MyNameIs => "My name is...",
            DetectionLabel::NiceToMeetYou => "Nice to meet you",
        }
    }
}

impl fmt::Display for DetectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phrase())
    }
}

/// A label change worth announcing, tagged with the frame that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionEvent {
    pub label: DetectionLabel,
    pub frame_seq: u64,
}

impl DetectionEvent {
    pub fn new(label: DetectionLabel, frame_seq: u64) -> Self {
        Self { label, frame_seq }
    }
}

/// Observable pipeline happenings, broadcast to presentation layers and
/// debug views. Receivers that lag lose old events rather than stalling
/// the loop.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StateChanged(LoopState),
    Detected(DetectionEvent),
    ClassificationFailed { frame_seq: u64 },
    UtteranceStarted { utterance: Uuid, label: DetectionLabel },
    UtteranceFinished { utterance: Uuid, ok: bool },
    UtteranceDropped { label: DetectionLabel },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phrases_match_the_vocabulary() {
        let phrases: Vec<&str> = DetectionLabel::ALL.iter().map(|l| l.phrase()).collect();
        assert_eq!(
            phrases,
            vec![
                "Hello",
                "Thank you",
                "How are you?",
                "My name is...",
                "Nice to meet you"
            ]
        );
    }

    #[test]
    fn display_uses_the_spoken_phrase() {
        assert_eq!(DetectionLabel::HowAreYou.to_string(), "How are you?");
    }
}
