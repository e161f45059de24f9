//! Per-turn dialogue state, persisted with each assistant message

use serde::{Deserialize, Serialize};

/// What the assistant is waiting for after its last reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DialogueState {
    #[default]
    Idle,
    /// The reply ended with a graph offer; a short affirmative renders it
    AwaitingGraphConfirmation,
}

impl DialogueState {
    pub fn after_reply(offered_graph: bool) -> Self {
        if offered_graph {
            DialogueState::AwaitingGraphConfirmation
        } else {
            DialogueState::Idle
        }
    }

    pub fn awaiting_confirmation(self) -> bool {
        matches!(self, DialogueState::AwaitingGraphConfirmation)
    }
}
