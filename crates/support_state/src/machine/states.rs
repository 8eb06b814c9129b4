//! Session states - Defines all possible states of a support session

use serde::{Deserialize, Serialize};

/// Lifecycle state of a support chat session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Created, widget not opened yet.
    #[default]
    Initial,

    /// Automated triage by the bot.
    Bot,

    /// Escalation started, waiting for the transfer desk to acknowledge.
    Transferring,

    /// Waiting in line for a live agent.
    Queuing,

    /// Talking to a live agent.
    Connected,

    /// Session is over (terminal).
    Ended,
}

impl SessionState {
    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// Check if the session is on its way to a live agent.
    pub fn is_escalating(&self) -> bool {
        matches!(self, Self::Transferring | Self::Queuing)
    }

    /// Check if user messages are accepted in this state.
    pub fn accepts_user_input(&self) -> bool {
        !matches!(self, Self::Initial | Self::Ended)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initial => "INITIAL",
            Self::Bot => "BOT",
            Self::Transferring => "TRANSFERRING",
            Self::Queuing => "QUEUING",
            Self::Connected => "CONNECTED",
            Self::Ended => "ENDED",
        };
        f.write_str(name)
    }
}
