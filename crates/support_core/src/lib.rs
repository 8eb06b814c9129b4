//! support_core - Core types for the support chat engine
//!
//! This crate provides the plain data shared by the engine crates:
//! - `message` - Message, Author, MessageKind, DeliveryStatus
//! - `agent` - Agent profiles presented by an agent directory
//! - `keywords` - Category and keyword matching
//! - `config` - EngineConfig, EscalationRule, catalog and texts

pub mod agent;
pub mod config;
pub mod keywords;
pub mod message;

// Re-export commonly used types
pub use agent::{Agent, AgentLoad, AgentStatus};
pub use config::{
    default_catalog, default_keyword_sets, default_keywords, CatalogEntry, ConfigError,
    EngineConfig, EscalationRule, ScoreWeights, SessionTexts, TimingConfig,
};
pub use keywords::{normalize, Category, KeywordSet};
pub use message::{Attachment, Author, DeliveryStatus, Message, MessageKind};
