//! # Support Engine
//!
//! Runs customer-support chat sessions: keyword triage by a bot, escalation
//! scoring, a simulated wait line and handoff to a live agent.
//! Outbound messages are paced and delivered in order; every timer belongs to
//! its session and is cancelled when the session ends or is dropped.

pub mod catalog;
pub mod collaborators;
pub mod engine;
pub mod error;
pub mod outbound;
pub mod queue_simulator;
pub mod scorer;
pub mod session;
pub mod tasks;

// Re-exports
pub use catalog::ResponseCatalog;
pub use collaborators::{
    AgentDirectory, Collaborators, FixedTransferDesk, LogNotifier, NoopPresentation, Notice,
    NoticeKind, NotificationService, PresentationLayer, StaticAgentDirectory, TransferDesk,
};
pub use engine::{OutgoingMessage, SessionHandle, SupportEngine};
pub use error::{DirectoryError, EngineError, Result, TransferFailure};
pub use outbound::{MessageQueue, MessageSink};
pub use queue_simulator::{QueueSimulator, QueueUpdate};
pub use scorer::{EscalationScorer, ScoreContext, ScoreVerdict, Verdict};
pub use session::{ChatSession, SessionSnapshot};
pub use tasks::TaskSet;

pub use support_core::{
    Agent, Attachment, Author, Category, DeliveryStatus, EngineConfig, Message, MessageKind,
};
pub use support_state::{SessionEvent, SessionState, StateTransition};
