//! Agent module - Live agent profiles
//!
//! Agents are presented by an external directory; the engine only attaches
//! them to a session.

mod profile;

pub use profile::{Agent, AgentLoad, AgentStatus};
