//! support_state - Lifecycle state machine for support chat sessions
//!
//! This crate provides the FSM that drives a visitor's conversation from
//! bot triage through escalation, queuing and a live agent to the end.

pub mod machine;

// Re-export commonly used types
pub use machine::{
    EscalationReason, SessionEvent, SessionState, StateMachine, StateTransition, TransitionError,
};
