//! State transitions - FSM transition logic
//!
//! Implements the state machine that handles event-driven state transitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::events::SessionEvent;
use super::states::SessionState;

/// Error type for invalid state transitions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Invalid transition from {from} with event {event}")]
    InvalidTransition { from: SessionState, event: String },

    #[error("State machine is in terminal state: {0}")]
    TerminalState(SessionState),
}

/// Represents a state transition result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// The state before the transition.
    pub from: SessionState,
    /// The state after the transition.
    pub to: SessionState,
    /// The event that triggered the transition.
    pub event: SessionEvent,
    /// Whether the state actually changed.
    pub changed: bool,
}

/// State machine for managing session state transitions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    /// Current state.
    current_state: SessionState,
    /// Transition history (limited).
    history: Vec<StateTransition>,
    /// Max history entries to keep.
    max_history: usize,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine in Initial state.
    pub fn new() -> Self {
        Self::with_state(SessionState::Initial)
    }

    /// Create a state machine with a specific initial state.
    pub fn with_state(state: SessionState) -> Self {
        Self {
            current_state: state,
            history: Vec::new(),
            max_history: 50,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> SessionState {
        self.current_state
    }

    /// Get the transition history.
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Handle an event and transition to a new state.
    pub fn handle_event(&mut self, event: SessionEvent) -> Result<StateTransition, TransitionError> {
        let old_state = self.current_state;
        let new_state = Self::compute_next_state(old_state, &event)?;

        self.current_state = new_state;

        let transition = StateTransition {
            from: old_state,
            to: new_state,
            event,
            changed: old_state != new_state,
        };

        self.history.push(transition.clone());
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        Ok(transition)
    }

    /// Compute the next state given current state and event.
    fn compute_next_state(
        state: SessionState,
        event: &SessionEvent,
    ) -> Result<SessionState, TransitionError> {
        use SessionEvent::*;
        use SessionState::*;

        let next = match (state, event) {
            (Ended, _) => return Err(TransitionError::TerminalState(Ended)),

            // ========== Triage ==========
            (Initial, SessionOpened) => Bot,
            (Bot, BotReplied) => Bot,
            (Bot, EscalationTriggered { .. }) => Transferring,
            (Bot, TransferRequested) => Transferring,

            // Duplicate requests while escalating or connected are no-ops.
            (Transferring | Queuing | Connected, TransferRequested) => state,

            // ========== Handoff ==========
            (Transferring, TransferAcknowledged { .. }) => Queuing,
            (Queuing, AgentAssigned { .. }) => Connected,
            (Transferring | Queuing, TransferFailed { .. }) => Bot,

            // ========== Live chat ==========
            (Connected, UserMessageRelayed) => Connected,
            (Connected, AgentReplied) => Connected,

            // ========== User Actions ==========
            (_, SessionEnded) => Ended,

            _ => {
                return Err(TransitionError::InvalidTransition {
                    from: state,
                    event: event.name().to_string(),
                })
            }
        };

        Ok(next)
    }

    /// Check if a transition is valid without executing it.
    pub fn can_transition(&self, event: &SessionEvent) -> bool {
        Self::compute_next_state(self.current_state, event).is_ok()
    }
}
