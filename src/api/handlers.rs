//! HTTP request handlers

use super::types::{
    ChatRequest, ChatResponse, ConversationResponse, DeleteResponse, ErrorResponse, GraphResponse,
    HealthResponse, MessageResponse, ServiceInfo,
};
use super::{AppState, ACCOUNT_HEADER, DEFAULT_ACCOUNT};
use crate::db::{ConversationSummary, DbError, DialogueState, Role};
use crate::graph::{GraphReference, LOCAL_ROUTE_PREFIX};
use crate::title_generator::generate_title;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use tower_http::services::ServeDir;
use uuid::Uuid;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let graphs = ServeDir::new(&state.output_dir);

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        // Chat turns
        .route("/chat", post(send_chat))
        .route("/chat/history", get(list_conversations))
        .route("/chat/:id", get(get_conversation).delete(delete_conversation))
        .route("/chat/:id/graph", post(regenerate_graph))
        // Locally published graph images
        .nest_service(LOCAL_ROUTE_PREFIX, graphs)
        .with_state(state)
}

// ============================================================
// Service
// ============================================================

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "Math Tutor",
        version: env!("CARGO_PKG_VERSION"),
        status: "online",
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

// ============================================================
// Chat
// ============================================================

/// Run one turn: store the user message, decide the reply, store it
async fn send_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::BadRequest("Message content is empty".to_string()));
    }
    let owner = account_id(&headers);

    let conversation = match &req.conversation_id {
        Some(id) => state.db.get_conversation(id, owner)?,
        None => {
            let id = Uuid::new_v4().to_string();
            let title = generate_title(&req.content);
            tracing::info!(conversation_id = %id, title = %title, "Creating conversation");
            state.db.create_conversation(&id, owner, &title)?
        }
    };

    let _turn = state.turns.acquire(&conversation.id).await;

    let history = state.db.get_messages(&conversation.id)?;
    state.db.add_message(
        &Uuid::new_v4().to_string(),
        &conversation.id,
        Role::User,
        &req.content,
        None,
        DialogueState::Idle,
    )?;

    let outcome = state.engine.process_turn(&history, &req.content).await;

    let message = state.db.add_message(
        &Uuid::new_v4().to_string(),
        &conversation.id,
        Role::Assistant,
        &outcome.response_text,
        outcome.graph.as_ref(),
        outcome.next_state(),
    )?;

    let graph_base64 = match &outcome.graph {
        Some(graph) => inline_local_graph(&state, graph).await,
        None => None,
    };

    Ok(Json(ChatResponse {
        message: MessageResponse::from(&message),
        conversation_id: conversation.id,
        should_offer_graph: outcome.should_offer_graph,
        graph_base64,
    }))
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let conversations = state.db.list_conversations(account_id(&headers))?;
    Ok(Json(conversations))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation = state.db.get_conversation(&id, account_id(&headers))?;
    let messages = state.db.get_messages(&id)?;
    Ok(Json(ConversationResponse::new(conversation, &messages)))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, AppError> {
    state.db.delete_conversation(&id, account_id(&headers))?;
    state.turns.forget(&id);
    tracing::info!(conversation_id = %id, "Conversation deleted");
    Ok(Json(DeleteResponse {
        message: "Conversation deleted".to_string(),
    }))
}

/// Render a fresh graph for the conversation's latest problem
async fn regenerate_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GraphResponse>, AppError> {
    state.db.get_conversation(&id, account_id(&headers))?;
    let messages = state.db.get_messages(&id)?;

    let problem = state
        .engine
        .latest_problem(&messages)
        .ok_or_else(|| AppError::BadRequest("No problem found in conversation".to_string()))?;

    let graph = state
        .engine
        .generate_graph(problem)
        .await
        .ok_or_else(|| AppError::Internal("Failed to generate graph".to_string()))?;

    let graph_base64 = inline_local_graph(&state, &graph).await;
    Ok(Json(GraphResponse {
        graph_path: graph.into_string(),
        graph_base64,
    }))
}

// ============================================================
// Helpers
// ============================================================

fn account_id(headers: &HeaderMap) -> &str {
    headers
        .get(ACCOUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ACCOUNT)
}

/// Base64 of a locally served graph; remote graphs are fetched by URL instead
async fn inline_local_graph(state: &AppState, graph: &GraphReference) -> Option<String> {
    let file_name = graph.local_file_name()?;
    let path = state.output_dir.join(file_name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        Err(e) => {
            tracing::warn!(error = %e, path = %path.display(), "Failed to read local graph");
            None
        }
    }
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::ConversationNotFound(_) => AppError::NotFound("Conversation not found".to_string()),
            other => {
                tracing::error!(error = %other, "Database error");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TurnLocks;
    use crate::db::Database;
    use crate::dialogue::testing::MockLlmClient;
    use crate::dialogue::{DialogueEngine, GRAPH_ACKNOWLEDGEMENT, OFFER_SUFFIX};
    use crate::graph::testing::MockRenderer;
    use crate::graph::ArtifactPublisher;
    use axum::body::Body;
    use axum::http::Request;
    use base64::Engine as _;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const PLOT_REPLY: &str = "```python\nplt.plot([1, 2], [1, 4])\n```";

    struct TestApp {
        router: Router,
        llm: Arc<MockLlmClient>,
        db: Database,
        turns: Arc<TurnLocks>,
        _dir: TempDir,
    }

    fn test_app_with(renderer: impl FnOnce(&TempDir) -> MockRenderer) -> TestApp {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(MockLlmClient::new("mock"));
        let renderer = Arc::new(renderer(&dir));
        let engine = DialogueEngine::new(llm.clone(), renderer, ArtifactPublisher::local_only());
        let db = Database::open_in_memory().unwrap();
        let state = AppState::new(db.clone(), engine, dir.path().to_path_buf());
        let turns = state.turns.clone();
        TestApp {
            router: create_router(state),
            llm,
            db,
            turns,
            _dir: dir,
        }
    }

    fn test_app() -> TestApp {
        test_app_with(|dir| MockRenderer::succeeding(dir.path()))
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(router, request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn chat(account: &str, body: &Value) -> Request<Body> {
        Request::post("/chat")
            .header("content-type", "application/json")
            .header(ACCOUNT_HEADER, account)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(account: &str, uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(ACCOUNT_HEADER, account)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_service_info_and_health() {
        let app = test_app();
        let (status, info) = send_json(&app.router, get("a", "/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["status"], "online");

        let (status, health) = send_json(&app.router, get("a", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
    }

    #[tokio::test]
    async fn test_first_message_creates_titled_conversation() {
        let app = test_app();
        app.llm.queue_text("42");

        let (status, body) = send_json(
            &app.router,
            chat("alice", &serde_json::json!({ "content": "what is 17 + 25" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["content"], "42");
        assert_eq!(body["message"]["role"], "assistant");
        assert_eq!(body["message"]["has_graph"], false);
        assert_eq!(body["should_offer_graph"], false);
        assert!(body["graph_base64"].is_null());

        let conversation_id = body["conversation_id"].as_str().unwrap();
        let conversation = app.db.get_conversation(conversation_id, "alice").unwrap();
        assert_eq!(conversation.title, "what is 17 + 25");

        let messages = app.db.get_messages(conversation_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_finished_turn_releases_conversation_lock() {
        let app = test_app();
        app.llm.queue_text("42");
        app.llm.queue_text("43");

        let (_, body) = send_json(
            &app.router,
            chat("alice", &serde_json::json!({ "content": "what is 17 + 25" })),
        )
        .await;
        let conversation_id = body["conversation_id"].as_str().unwrap().to_string();
        let (status, _) = send_json(
            &app.router,
            chat(
                "alice",
                &serde_json::json!({ "content": "and 18 + 25?", "conversation_id": conversation_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(app.turns.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offer_then_confirm_over_http() {
        let app = test_app();
        app.llm.queue_text("The quadratic has roots 1 and 3.");

        let (_, first) = send_json(
            &app.router,
            chat("alice", &serde_json::json!({ "content": "solve x^2 - 4x + 3 = 0" })),
        )
        .await;
        assert_eq!(first["should_offer_graph"], true);
        assert!(first["message"]["content"].as_str().unwrap().ends_with(OFFER_SUFFIX));
        let conversation_id = first["conversation_id"].as_str().unwrap().to_string();

        app.llm.queue_text(PLOT_REPLY);
        let (status, second) = send_json(
            &app.router,
            chat(
                "alice",
                &serde_json::json!({ "content": "yes", "conversation_id": conversation_id }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["message"]["content"], GRAPH_ACKNOWLEDGEMENT);
        assert_eq!(second["message"]["has_graph"], true);
        assert_eq!(second["should_offer_graph"], false);

        let graph_path = second["message"]["graph_path"].as_str().unwrap();
        assert!(graph_path.starts_with("/graph/"));
        let encoded = second["graph_base64"].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();

        // The inline image matches what the static route serves
        let (status, served) = send(&app.router, get("alice", graph_path)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(served, decoded);

        let requests = app.llm.recorded_requests();
        assert_eq!(requests[1].last_user_text(), Some("solve x^2 - 4x + 3 = 0"));
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_not_found() {
        let app = test_app();
        let (status, body) = send_json(
            &app.router,
            chat("alice", &serde_json::json!({ "content": "hi", "conversation_id": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Conversation not found");
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let app = test_app();
        let (status, _) = send_json(&app.router, chat("alice", &serde_json::json!({ "content": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.llm.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_scoped_to_account() {
        let app = test_app();
        app.db.create_conversation("c1", "alice", "Alice's").unwrap();
        app.db.create_conversation("c2", "bob", "Bob's").unwrap();

        let (status, list) = send_json(&app.router, get("alice", "/chat/history")).await;
        assert_eq!(status, StatusCode::OK);
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], "c1");
        assert_eq!(list[0]["message_count"], 0);

        let (status, _) = send_json(&app.router, get("alice", "/chat/c2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_account_header_uses_default() {
        let app = test_app();
        app.db.create_conversation("c1", DEFAULT_ACCOUNT, "Local").unwrap();
        let request = Request::get("/chat/c1").body(Body::empty()).unwrap();
        let (status, body) = send_json(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Local");
        assert_eq!(body["messages"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_delete_conversation() {
        let app = test_app();
        app.db.create_conversation("c1", "alice", "Doomed").unwrap();

        let delete = |account: &str| {
            Request::delete("/chat/c1")
                .header(ACCOUNT_HEADER, account)
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = send_json(&app.router, delete("bob")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send_json(&app.router, delete("alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Conversation deleted");
        assert!(app.db.get_conversation("c1", "alice").is_err());
    }

    fn regenerate(account: &str, id: &str) -> Request<Body> {
        Request::post(format!("/chat/{id}/graph"))
            .header(ACCOUNT_HEADER, account)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_regenerate_graph() {
        let app = test_app();
        app.db.create_conversation("c1", "alice", "t").unwrap();
        app.db
            .add_message("m1", "c1", Role::User, "solve x^2 = 4", None, DialogueState::Idle)
            .unwrap();
        app.db
            .add_message("m2", "c1", Role::User, "ok", None, DialogueState::Idle)
            .unwrap();
        app.llm.queue_text(PLOT_REPLY);

        let (status, body) = send_json(&app.router, regenerate("alice", "c1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["graph_path"].as_str().unwrap().starts_with("/graph/"));
        assert!(body["graph_base64"].is_string());
        assert_eq!(app.llm.recorded_requests()[0].last_user_text(), Some("solve x^2 = 4"));
    }

    #[tokio::test]
    async fn test_regenerate_without_problem_is_bad_request() {
        let app = test_app();
        app.db.create_conversation("c1", "alice", "t").unwrap();
        let (status, body) = send_json(&app.router, regenerate("alice", "c1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No problem found in conversation");
    }

    #[tokio::test]
    async fn test_regenerate_render_failure_is_internal_error() {
        let app = test_app_with(|_| MockRenderer::failing("SyntaxError"));
        app.db.create_conversation("c1", "alice", "t").unwrap();
        app.db
            .add_message("m1", "c1", Role::User, "plot sin(x)", None, DialogueState::Idle)
            .unwrap();
        app.llm.queue_text(PLOT_REPLY);

        let (status, body) = send_json(&app.router, regenerate("alice", "c1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to generate graph");
    }

    #[tokio::test]
    async fn test_missing_graph_file_is_not_found() {
        let app = test_app();
        let (status, _) = send(&app.router, get("a", "/graph/graph_missing.png")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
