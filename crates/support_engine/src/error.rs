//! Support engine error types

use support_state::{SessionState, TransitionError};
use thiserror::Error;

/// Escalation could not reach a live agent. Recoverable: the session rolls
/// back to bot triage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferFailure {
    #[error("transfer was not acknowledged: {0}")]
    NotAcknowledged(String),

    #[error("no agent could be assigned: {0}")]
    NoAgent(String),
}

/// Errors reported by an agent directory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("no agent available")]
    NoAgentAvailable,

    #[error("agent directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("transfer failed: {0}")]
    TransferFailure(#[from] TransferFailure),

    #[error("{count} queued message(s) discarded at teardown")]
    DeliveryDiscarded { count: usize },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl EngineError {
    pub fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        Self::InvalidState { operation, state }
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
