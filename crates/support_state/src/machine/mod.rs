//! State machine module
//!
//! Contains the FSM implementation for the support session lifecycle.

mod events;
mod states;
mod transitions;

pub use events::{EscalationReason, SessionEvent};
pub use states::SessionState;
pub use transitions::{StateMachine, StateTransition, TransitionError};
