//! Agent - Immutable live-agent record presented by an agent directory

use serde::{Deserialize, Serialize};

/// Availability of a live agent.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Online,
    Busy,
    Away,
    Offline,
}

/// Conversations an agent is handling and waiting on.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AgentLoad {
    pub current: u32,
    pub queued: u32,
}

/// A live support agent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Agent {
    pub name: String,
    #[serde(default)]
    pub status: AgentStatus,
    pub satisfaction_pct: f32,
    /// Average first-response time in seconds.
    pub avg_response_time_secs: u32,
    pub resolution_pct: f32,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub current_load: AgentLoad,
}

impl Agent {
    /// Create an online agent with neutral statistics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: AgentStatus::Online,
            satisfaction_pct: 0.0,
            avg_response_time_secs: 0,
            resolution_pct: 0.0,
            specialties: Vec::new(),
            current_load: AgentLoad::default(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, AgentStatus::Online)
    }
}
