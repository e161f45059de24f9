//! API request and response types

use crate::db::{Conversation, Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub content: String,
    /// Omitted to start a new conversation
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// A stored message as returned to clients
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub has_graph: bool,
    pub graph_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            id: message.message_id.clone(),
            role: message.role,
            content: message.content.clone(),
            has_graph: message.has_graph,
            graph_path: message.graph_path.clone(),
            created_at: message.created_at,
        }
    }
}

/// Response for a chat turn
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: MessageResponse,
    pub conversation_id: String,
    pub should_offer_graph: bool,
    /// Inline PNG for locally served graphs
    pub graph_base64: Option<String>,
}

/// Response with conversation and messages
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<MessageResponse>,
}

impl ConversationResponse {
    pub fn new(conversation: Conversation, messages: &[Message]) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            messages: messages.iter().map(MessageResponse::from).collect(),
        }
    }
}

/// Response for graph regeneration
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphResponse {
    pub graph_path: String,
    pub graph_base64: Option<String>,
}

/// Response for deletion
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Service description at `/`
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
