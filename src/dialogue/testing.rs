//! Mock oracle and history builders for testing

use super::DialogueState;
use crate::db::{Message, Role};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful text response
    pub fn queue_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(LlmResponse::text(text)));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// History builders
// ============================================================================

fn message(role: Role, text: &str, state: DialogueState) -> Message {
    Message {
        message_id: uuid::Uuid::new_v4().to_string(),
        conversation_id: "test-conversation".to_string(),
        sequence_id: 0,
        role,
        content: text.to_string(),
        has_graph: false,
        graph_path: None,
        dialogue_state: state,
        created_at: Utc::now(),
    }
}

pub fn user(text: &str) -> Message {
    message(Role::User, text, DialogueState::Idle)
}

pub fn assistant(text: &str) -> Message {
    message(Role::Assistant, text, DialogueState::Idle)
}

pub fn assistant_in(text: &str, state: DialogueState) -> Message {
    message(Role::Assistant, text, state)
}

/// Assistant reply that ended with a graph offer
pub fn awaiting(text: &str) -> Message {
    message(Role::Assistant, text, DialogueState::AwaitingGraphConfirmation)
}

/// Number messages in order, as the store would
pub fn history(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .zip(1..)
        .map(|(mut m, seq)| {
            m.sequence_id = seq;
            m
        })
        .collect()
}
