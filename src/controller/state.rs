//! The loop lifecycle state machine. Pure transitions, no side effects.

/// Lifecycle of one translation loop instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl Default for LoopState {
    fn default() -> Self {
        LoopState::Idle
    }
}

/// Requests the controller surface can make of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRequest {
    Start,
    Pause,
    Resume,
    Stop,
}

/// Next state for a request, or `None` when the request does not apply.
///
/// Stopped is terminal; nothing leaves it. Requests that do not apply in
/// the current state (pause while idle, resume while running, a second
/// stop) are no-ops rather than errors, matching the idempotence rules of
/// the surface.
pub fn next_state(current: LoopState, request: LoopRequest) -> Option<LoopState> {
    match (current, request) {
        (LoopState::Idle, LoopRequest::Start) => Some(LoopState::Running),
        (LoopState::Running, LoopRequest::Pause) => Some(LoopState::Paused),
        (LoopState::Paused, LoopRequest::Resume) => Some(LoopState::Running),
        (LoopState::Stopped, LoopRequest::Stop) => None,
        (_, LoopRequest::Stop) => Some(LoopState::Stopped),
        _ => None,
    }
}

/// Owns the current state; applies requests and reports transitions.
#[derive(Debug, Default)]
pub struct LoopStateMachine {
    state: LoopState,
}

impl LoopStateMachine {
    pub fn new() -> Self {
        Self {
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Applies a request; `Some(next)` when a transition happened.
    pub fn apply(&mut self, request: LoopRequest) -> Option<LoopState> {
        let next = next_state(self.state, request)?;
        self.state = next;
        Some(next)
    }
}
