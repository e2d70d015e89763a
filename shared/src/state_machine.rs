//! Session Lifecycle State Machine
//!
//! Connecting -> Active -> Closing -> Closed. Linear, no cycles: a closed
//! session is never reopened, a new one is connected instead.

use std::fmt;

/// Lifecycle state of a drone session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Channels open, handshake not yet confirmed
    #[default]
    Connecting,
    /// Handshake succeeded, commands may be issued
    Active,
    /// Teardown in progress
    Closing,
    /// All resources released
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Events that drive the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Mode-entry command answered with success
    HandshakeSucceeded,
    /// Teardown requested (explicit disconnect, failed handshake or drop)
    CloseRequested,
    /// Background work stopped and channels closed
    TeardownComplete,
}

/// Result of feeding an event to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// State changed
    Success(SessionState),
    /// Event had nothing to do in this state (e.g. a second close)
    Ignored(SessionState),
    /// Event is not valid from the current state
    Invalid {
        from: SessionState,
        event: LifecycleEvent,
    },
}

/// The session lifecycle state machine
#[derive(Debug, Default)]
pub struct LifecycleStateMachine {
    current_state: SessionState,
}

impl LifecycleStateMachine {
    /// Create a new state machine in Connecting state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.current_state
    }

    /// Whether commands may be issued
    pub fn is_active(&self) -> bool {
        self.current_state == SessionState::Active
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: LifecycleEvent) -> TransitionResult {
        use LifecycleEvent::*;
        use SessionState::*;

        let next = match (self.current_state, event) {
            (Connecting, HandshakeSucceeded) => Active,
            (Connecting | Active, CloseRequested) => Closing,
            (Closing, TeardownComplete) => Closed,

            // Repeated teardown requests are no-ops
            (Closing | Closed, CloseRequested) => {
                return TransitionResult::Ignored(self.current_state)
            }

            (from, event) => return TransitionResult::Invalid { from, event },
        };

        self.current_state = next;
        TransitionResult::Success(next)
    }
}
