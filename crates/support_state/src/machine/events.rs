//! Session events - Defines events that trigger state transitions

use serde::{Deserialize, Serialize};

/// Why automated triage handed the visitor over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// Cumulative escalation score reached the threshold.
    Threshold,
    /// Message contained a keyword that always needs a human.
    Bypass,
}

/// Defines the events that can trigger state transitions in the FSM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    // ========== Lifecycle ==========
    /// The visitor opened the chat widget.
    SessionOpened,

    /// The visitor or the host ended the session.
    SessionEnded,

    // ========== Triage ==========
    /// The bot answered a user message.
    BotReplied,

    /// The escalation scorer asked for a human.
    EscalationTriggered { reason: EscalationReason },

    /// The visitor explicitly asked for a human.
    TransferRequested,

    // ========== Handoff ==========
    /// The transfer desk accepted the visitor into the queue.
    TransferAcknowledged { position: u32 },

    /// An agent was assigned once the queue reached zero.
    AgentAssigned { agent_name: String },

    /// Transfer or queue failed; triage resumes.
    TransferFailed { error: String },

    // ========== Live chat ==========
    /// A user message was relayed to the live agent.
    UserMessageRelayed,

    /// The live agent answered.
    AgentReplied,
}

impl SessionEvent {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionOpened => "session_opened",
            Self::SessionEnded => "session_ended",
            Self::BotReplied => "bot_replied",
            Self::EscalationTriggered { .. } => "escalation_triggered",
            Self::TransferRequested => "transfer_requested",
            Self::TransferAcknowledged { .. } => "transfer_acknowledged",
            Self::AgentAssigned { .. } => "agent_assigned",
            Self::TransferFailed { .. } => "transfer_failed",
            Self::UserMessageRelayed => "user_message_relayed",
            Self::AgentReplied => "agent_replied",
        }
    }
}
