//! Message module - Transcript message types

mod content;

pub use content::{Attachment, Author, DeliveryStatus, Message, MessageKind};
