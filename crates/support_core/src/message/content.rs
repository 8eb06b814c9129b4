//! Message - transcript entries exchanged in a support conversation
//!
//! Messages are plain data tagged with a [`MessageKind`]; the presentation
//! layer decides how to render them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who wrote a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Bot,
    Agent,
    System,
}

/// Rendering hint for the presentation layer.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain conversational text.
    #[default]
    Text,
    /// Bot message offering quick-reply options.
    BotMenu,
    /// Lifecycle notice (welcome, transferring, connected, ended, errors).
    System,
}

/// Delivery progress of a user message sent to a live agent.
///
/// Ordered: `Sent < Delivered < Read`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

/// Opaque reference to a file attached by the visitor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }
}

/// A single transcript entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub author: Author,
    #[serde(default)]
    pub kind: MessageKind,
    pub text: String,
    /// Quick-reply options, only populated on [`MessageKind::BotMenu`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<DeliveryStatus>,
}

impl Message {
    fn new(author: Author, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            kind,
            text: text.into(),
            options: Vec::new(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            delivery_status: None,
        }
    }

    pub fn user(text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            attachments,
            ..Self::new(Author::User, MessageKind::Text, text)
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Author::Bot, MessageKind::Text, text)
    }

    /// Bot message carrying quick-reply options.
    pub fn bot_menu(text: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            options,
            ..Self::new(Author::Bot, MessageKind::BotMenu, text)
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Author::Agent, MessageKind::Text, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Author::System, MessageKind::System, text)
    }

    /// Start tracking delivery progress for this message.
    pub fn tracked(mut self) -> Self {
        self.delivery_status = Some(DeliveryStatus::Sent);
        self
    }

    /// Move the delivery status forward. Returns `true` when it changed.
    ///
    /// Untracked messages and backwards moves are ignored.
    pub fn advance_delivery(&mut self, next: DeliveryStatus) -> bool {
        match self.delivery_status {
            Some(current) if next > current => {
                self.delivery_status = Some(next);
                true
            }
            _ => false,
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.author == Author::User
    }
}
