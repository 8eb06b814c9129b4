//! External collaborators the engine calls into
//!
//! Staffing, transfer acknowledgement, user-facing notices and presentation
//! are injected so the session logic never depends on a concrete policy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use support_core::{Agent, AgentLoad, AgentStatus, Message};
use uuid::Uuid;

use crate::error::{DirectoryError, TransferFailure};

/// Source of live agents for sessions leaving the queue.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn assign_agent(&self) -> Result<Agent, DirectoryError>;
}

/// Accepts an escalated session into the wait line.
#[async_trait]
pub trait TransferDesk: Send + Sync {
    /// Returns the visitor's initial queue position.
    async fn acknowledge(&self, session_id: Uuid) -> Result<u32, TransferFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    TransferFailed,
    SendFailed,
}

/// A failure worth showing to the visitor as a toast.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub session_id: Uuid,
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(session_id: Uuid, kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            session_id,
            kind,
            message: message.into(),
        }
    }
}

/// Receives failure notices. The engine never waits on the outcome.
pub trait NotificationService: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Observes every delivered message (sounds, badges).
pub trait PresentationLayer: Send + Sync {
    fn message_delivered(&self, message: &Message);
}

/// Hands out online agents from a fixed roster in round-robin order.
pub struct StaticAgentDirectory {
    roster: Vec<Agent>,
    next: AtomicUsize,
}

impl StaticAgentDirectory {
    pub fn new(roster: Vec<Agent>) -> Self {
        Self {
            roster,
            next: AtomicUsize::new(0),
        }
    }
}

impl Default for StaticAgentDirectory {
    fn default() -> Self {
        Self::new(vec![
            Agent {
                name: "Lily Chen".to_string(),
                status: AgentStatus::Online,
                satisfaction_pct: 98.2,
                avg_response_time_secs: 45,
                resolution_pct: 94.5,
                specialties: vec!["accounts".to_string(), "payments".to_string()],
                current_load: AgentLoad {
                    current: 2,
                    queued: 1,
                },
            },
            Agent {
                name: "Marcus Lee".to_string(),
                status: AgentStatus::Online,
                satisfaction_pct: 96.7,
                avg_response_time_secs: 60,
                resolution_pct: 91.0,
                specialties: vec!["orders".to_string(), "refunds".to_string()],
                current_load: AgentLoad {
                    current: 3,
                    queued: 0,
                },
            },
        ])
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn assign_agent(&self) -> Result<Agent, DirectoryError> {
        let available: Vec<&Agent> = self.roster.iter().filter(|a| a.is_available()).collect();
        if available.is_empty() {
            return Err(DirectoryError::NoAgentAvailable);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % available.len();
        Ok(available[index].clone())
    }
}

/// Always acknowledges with the same queue position.
pub struct FixedTransferDesk {
    position: u32,
}

impl FixedTransferDesk {
    pub fn new(position: u32) -> Self {
        Self { position }
    }
}

#[async_trait]
impl TransferDesk for FixedTransferDesk {
    async fn acknowledge(&self, _session_id: Uuid) -> Result<u32, TransferFailure> {
        Ok(self.position)
    }
}

/// Writes notices to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationService for LogNotifier {
    fn notify(&self, notice: Notice) {
        log::warn!(
            "[{}] Notice {:?}: {}",
            notice.session_id,
            notice.kind,
            notice.message
        );
    }
}

#[derive(Debug, Default)]
pub struct NoopPresentation;

impl PresentationLayer for NoopPresentation {
    fn message_delivered(&self, _message: &Message) {}
}

/// The set of collaborators a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn AgentDirectory>,
    pub transfer_desk: Arc<dyn TransferDesk>,
    pub notifier: Arc<dyn NotificationService>,
    pub presentation: Arc<dyn PresentationLayer>,
}

impl Collaborators {
    /// Default collaborators with a transfer desk that reports `initial_queue_position`.
    pub fn with_queue_position(initial_queue_position: u32) -> Self {
        Self {
            directory: Arc::new(StaticAgentDirectory::default()),
            transfer_desk: Arc::new(FixedTransferDesk::new(initial_queue_position)),
            notifier: Arc::new(LogNotifier),
            presentation: Arc::new(NoopPresentation),
        }
    }

    pub fn directory(mut self, directory: Arc<dyn AgentDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn transfer_desk(mut self, transfer_desk: Arc<dyn TransferDesk>) -> Self {
        self.transfer_desk = transfer_desk;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationService>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn presentation(mut self, presentation: Arc<dyn PresentationLayer>) -> Self {
        self.presentation = presentation;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::with_queue_position(3)
    }
}
