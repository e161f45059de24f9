//! Per-turn decision logic
//!
//! A turn takes one of three paths:
//! 1. the user confirms a pending graph offer: render the original problem only
//! 2. the user explicitly asks for a graph: solve and render
//! 3. anything else: solve, then maybe offer a graph

use super::state::DialogueState;
use super::vocabulary::Vocabulary;
use crate::db::Message;
use crate::graph::{extract_code, ArtifactPublisher, GraphReference, GraphRenderer};
use crate::llm::{LlmMessage, LlmRequest, LlmService};
use crate::system_prompt::{GRAPH_CODE_PROMPT, SOLVER_PROMPT};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Appended to solutions that come with a graph offer
pub const OFFER_SUFFIX: &str =
    "\n\n---\n📊 **Would you like me to generate a graph for this?** (Just say 'yes' or 'show graph')";
pub const GRAPH_ACKNOWLEDGEMENT: &str = "Here's the graph you requested:";
pub const GRAPH_APOLOGY: &str =
    "Sorry, I couldn't generate the graph. Please try with a different problem.";

/// Messages sent to the solver, including the new one
pub const CONTEXT_WINDOW: usize = 10;

const SOLVER_TEMPERATURE: f32 = 0.3;
const SOLVER_MAX_TOKENS: u32 = 1500;
const GRAPH_CODE_TEMPERATURE: f32 = 0.2;
const GRAPH_CODE_MAX_TOKENS: u32 = 800;

/// Result of one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub response_text: String,
    pub should_offer_graph: bool,
    pub graph: Option<GraphReference>,
}

impl TurnOutcome {
    fn reply(response_text: String, should_offer_graph: bool, graph: Option<GraphReference>) -> Self {
        Self {
            response_text,
            should_offer_graph,
            graph,
        }
    }

    /// State to store with the assistant message for this outcome
    pub fn next_state(&self) -> DialogueState {
        DialogueState::after_reply(self.should_offer_graph)
    }
}

pub struct DialogueEngine {
    llm: Arc<dyn LlmService>,
    renderer: Arc<dyn GraphRenderer>,
    publisher: ArtifactPublisher,
    vocabulary: Vocabulary,
    cancel: CancellationToken,
}

impl DialogueEngine {
    pub fn new(
        llm: Arc<dyn LlmService>,
        renderer: Arc<dyn GraphRenderer>,
        publisher: ArtifactPublisher,
    ) -> Self {
        Self {
            llm,
            renderer,
            publisher,
            vocabulary: Vocabulary::default(),
            cancel: CancellationToken::new(),
        }
    }

    #[cfg(test)]
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Renders in flight are cancelled when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[cfg(test)]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Decide and produce the reply to `user_text` given the prior `history`.
    ///
    /// `history` must not include the new message. Never fails: oracle errors
    /// become inline `Error:` text and render errors become an apology or an
    /// absent reference.
    pub async fn process_turn(&self, history: &[Message], user_text: &str) -> TurnOutcome {
        if let Some(problem) = self.confirmed_problem(history, user_text) {
            tracing::info!("Graph offer confirmed");
            return match self.generate_graph(problem).await {
                Some(graph) => TurnOutcome::reply(GRAPH_ACKNOWLEDGEMENT.to_string(), false, Some(graph)),
                None => TurnOutcome::reply(GRAPH_APOLOGY.to_string(), false, None),
            };
        }

        if self.vocabulary.requests_graph(user_text) {
            tracing::info!("Explicit graph request");
            let solution = self.solve(history, user_text).await;
            let graph = self.generate_graph(user_text).await;
            return TurnOutcome::reply(solution, false, graph);
        }

        let solution = self.solve(history, user_text).await;
        let offer = self.vocabulary.should_offer_graph(user_text, &solution);
        let mut response_text = solution.trim().to_string();
        if offer {
            response_text.push_str(OFFER_SUFFIX);
        }
        TurnOutcome::reply(response_text, offer, None)
    }

    /// Produce a graph for `problem`, or `None` on any failure along the way
    pub async fn generate_graph(&self, problem: &str) -> Option<GraphReference> {
        let request = LlmRequest::single(GRAPH_CODE_PROMPT, problem)
            .with_temperature(GRAPH_CODE_TEMPERATURE)
            .with_max_tokens(GRAPH_CODE_MAX_TOKENS);

        let generated = match self.llm.complete(&request).await {
            Ok(response) => response.text,
            Err(e) => {
                tracing::warn!(error = %e.message, "Plot code request failed");
                return None;
            }
        };

        let code = extract_code(&generated);
        match self.renderer.render(&code, self.cancel.child_token()).await {
            Ok(image_path) => Some(self.publisher.publish(&image_path).await),
            Err(e) => {
                tracing::warn!(error = %e, "Graph rendering failed");
                None
            }
        }
    }

    /// Most recent user message that was not an answer to a graph offer.
    ///
    /// Uses the stored offer state, so short problems like "plot sin(x)" still
    /// count as problems.
    pub fn latest_problem<'a>(&self, history: &'a [Message]) -> Option<&'a str> {
        history
            .iter()
            .enumerate()
            .rev()
            .find(|&(i, m)| m.is_user() && !self.answers_offer(history, i))
            .map(|(_, m)| m.content.as_str())
    }

    /// Whether `history[index]` confirmed an offer made just before it
    fn answers_offer(&self, history: &[Message], index: usize) -> bool {
        let offered = index
            .checked_sub(1)
            .and_then(|prev| history.get(prev))
            .is_some_and(|prev| !prev.is_user() && prev.dialogue_state.awaiting_confirmation());
        offered && self.vocabulary.is_confirmation(&history[index].content)
    }

    /// Most recent user message that does not read as a confirmation
    fn last_non_confirmation<'a>(&self, history: &'a [Message]) -> Option<&'a str> {
        history
            .iter()
            .rev()
            .find(|m| m.is_user() && !self.vocabulary.is_confirmation(&m.content))
            .map(|m| m.content.as_str())
    }

    /// The problem to render if `user_text` confirms a pending offer
    fn confirmed_problem<'a>(&self, history: &'a [Message], user_text: &str) -> Option<&'a str> {
        let last_assistant = history.iter().rev().find(|m| !m.is_user())?;
        if !last_assistant.dialogue_state.awaiting_confirmation()
            || !self.vocabulary.is_confirmation(user_text)
        {
            return None;
        }
        self.last_non_confirmation(history)
    }

    async fn solve(&self, history: &[Message], user_text: &str) -> String {
        let start = history.len().saturating_sub(CONTEXT_WINDOW - 1);
        let mut messages: Vec<LlmMessage> = history[start..]
            .iter()
            .map(|m| {
                if m.is_user() {
                    LlmMessage::user(&m.content)
                } else {
                    LlmMessage::assistant(&m.content)
                }
            })
            .collect();
        messages.push(LlmMessage::user(user_text));

        let request = LlmRequest {
            system: SOLVER_PROMPT.to_string(),
            messages,
            max_tokens: Some(SOLVER_MAX_TOKENS),
            temperature: Some(SOLVER_TEMPERATURE),
        };

        match self.llm.complete(&request).await {
            Ok(response) => response.text,
            Err(e) => format!("Error: {}", e.message),
        }
    }
}
