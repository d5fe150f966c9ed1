pub mod feedback;
pub mod suppress;
pub mod throttle;
pub mod types;

pub use feedback::{FeedbackSerializer, SpeechState};
pub use suppress::{should_emit, ChangeSuppressor};
pub use throttle::SamplingThrottle;
pub use types::{DetectionEvent, DetectionLabel, PipelineEvent};
