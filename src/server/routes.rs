//! HTTP route handlers for the digital employee API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::agent::TurnTrace;
use crate::memory::core::errors::MemoryError;
use crate::memory::core::kinds::MemoryKind;
use crate::memory::core::record::{MemoryMetadata, kind_metadata};
use crate::memory::prompt::prompt_builder::HistoryMessage;

use super::state::AppState;

type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Create the API router with all routes.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/api/memories/{user_id}", post(add_memory).delete(delete_memories))
        .route("/api/memories/{user_id}/count", get(count_memories))
        .route("/calendar/feed.ics", get(calendar_feed))
        .with_state(state)
}

fn api_error(err: &MemoryError) -> (StatusCode, String) {
    if err.is_validation() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        error!(error = %err, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "digital-employee",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Chat turn request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Caller identity; memories are scoped to it.
    pub user_id: String,
    /// The user's message.
    pub message: String,
    /// Earlier messages of the conversation, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

/// Chat turn response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The agent's answer.
    pub answer: String,
    /// What happened during the turn.
    pub trace: TurnTrace,
}

/// Run one agent turn.
async fn chat(State(state): State<Arc<AppState>>, Json(request): Json<ChatRequest>) -> ApiResult<Json<ChatResponse>> {
    let turn = state
        .agent
        .run_turn(&request.user_id, &request.message, &request.history)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(ChatResponse {
        trace: turn.trace(),
        answer: turn.final_answer,
    }))
}

/// New memory request.
#[derive(Debug, Deserialize)]
pub struct AddMemoryRequest {
    /// Memory text.
    pub text: String,
    /// Memory kind; untagged when absent.
    pub kind: Option<String>,
}

/// New memory response.
#[derive(Debug, Serialize)]
pub struct AddMemoryResponse {
    /// Whether a record was written; false when the text was already stored.
    pub created: bool,
    /// Identifier of the new record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Store a memory for a user unless it is already known.
async fn add_memory(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(request): Json<AddMemoryRequest>,
) -> ApiResult<(StatusCode, Json<AddMemoryResponse>)> {
    let metadata = match request.kind.as_deref() {
        Some(raw) => {
            let kind: MemoryKind = raw.parse().map_err(|e| (StatusCode::BAD_REQUEST, format!("{e}")))?;
            kind_metadata(kind, "api")
        }
        None => MemoryMetadata::new(),
    };

    let inserted = state
        .store()
        .insert_if_absent(&user_id, &request.text, metadata)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(match inserted {
        Some(record) => (
            StatusCode::CREATED,
            Json(AddMemoryResponse {
                created: true,
                id: Some(record.id.to_string()),
            }),
        ),
        None => (
            StatusCode::OK,
            Json(AddMemoryResponse {
                created: false,
                id: None,
            }),
        ),
    })
}

/// Number of memories stored for a user.
async fn count_memories(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.store().count(&user_id).await.map_err(|e| api_error(&e))?;
    Ok(Json(serde_json::json!({ "user_id": user_id, "count": count })))
}

/// Delete every memory of a user.
async fn delete_memories(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.store().delete_user(&user_id).await.map_err(|e| api_error(&e))?;
    Ok(Json(serde_json::json!({ "user_id": user_id, "deleted": deleted })))
}

/// All bookings as an iCalendar feed.
async fn calendar_feed(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let body = state.calendar.ical_feed().await.map_err(|e| api_error(&e))?;
    Ok(([(header::CONTENT_TYPE, "text/calendar; charset=utf-8")], body))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::agent::AgentService;
    use crate::config::{AgentConfig, CalendarConfig, RetrievalConfig, SearchConfig};
    use crate::llm::decision::{Decision, ToolCall};
    use crate::llm::reasoner::Reasoner;
    use crate::llm::retry::RetryPolicy;
    use crate::memory::embedding::embedder::Embedder;
    use crate::memory::retrieval::retriever::Retriever;
    use crate::memory::storage::memory_store::{MemoryStore, SqliteMemoryStore};
    use crate::server::build_app;
    use crate::testing::{KeywordEmbedder, ScriptedReasoner, StaticSearchBackend};
    use crate::tools::calendar::{BOOK_TOOL, Calendar, SqliteBookingStore};
    use crate::tools::search::WebSearchTool;
    use crate::tools::standard_registry;

    async fn app(reasoner: ScriptedReasoner) -> Router {
        let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::new());
        let store: Arc<dyn MemoryStore> =
            Arc::new(SqliteMemoryStore::open_in_memory(Arc::clone(&embedder)).await.unwrap());
        let retriever = Arc::new(Retriever::new(
            Arc::clone(&store),
            embedder,
            None,
            RetrievalConfig::default(),
        ));
        let calendar = Arc::new(
            Calendar::new(
                Arc::new(SqliteBookingStore::open_in_memory().await.unwrap()),
                &CalendarConfig::default(),
            )
            .with_today(NaiveDate::from_ymd_opt(2025, 3, 12).unwrap()),
        );
        let search = WebSearchTool::new(
            Arc::new(StaticSearchBackend::with_snippet("s")),
            &SearchConfig::default(),
            RetryPolicy::no_retry(),
        );
        let registry = Arc::new(standard_registry(&calendar, search, Duration::from_secs(5)));
        let reasoner: Arc<dyn Reasoner> = Arc::new(reasoner);
        let agent = AgentService::new(retriever, store, reasoner, registry, None, AgentConfig::default()).unwrap();
        build_app(AppState::new(Arc::new(agent), calendar))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(ScriptedReasoner::default()).await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn test_memory_lifecycle() {
        let app = app(ScriptedReasoner::default()).await;
        let memory = json!({"text": "User follows EV industry news.", "kind": "interest"});

        let (status, body) = send(&app, "POST", "/api/memories/alice", Some(memory.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.contains("\"created\":true"));

        let (status, body) = send(&app, "POST", "/api/memories/alice", Some(memory)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"created\":false"));

        let (status, _) = send(&app, "POST", "/api/memories/alice", Some(json!({"text": "x y", "kind": "mood"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, "GET", "/api/memories/alice/count", None).await;
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["count"], 1);

        let (status, body) = send(&app, "DELETE", "/api/memories/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["deleted"], 1);
    }

    #[tokio::test]
    async fn test_chat_books_and_feed_lists_booking() {
        let reasoner = ScriptedReasoner::new([
            Ok(Decision::ToolCalls(vec![ToolCall::new(
                BOOK_TOOL,
                json!({"day": "friday", "time_slot": "afternoon"}),
            )])),
            Ok(Decision::Answer("Booked 1001 Medium Room for Friday 14:00.".to_string())),
        ]);
        let app = app(reasoner).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/chat",
            Some(json!({"user_id": "alice", "message": "Book a room", "history": [{"role": "user", "content": "hi"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["answer"], "Booked 1001 Medium Room for Friday 14:00.");
        assert_eq!(value["trace"]["termination"], "answered");
        assert_eq!(value["trace"]["actions"][0]["tool"], BOOK_TOOL);
        assert_eq!(value["trace"]["actions"][0]["ok"], true);

        let (status, feed) = send(&app, "GET", "/calendar/feed.ics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(feed.contains("DTSTART:20250314T140000\r\n"));
        assert!(feed.contains("LOCATION:1001 Medium Room\r\n"));
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let app = app(ScriptedReasoner::default()).await;
        let (status, _) = send(&app, "POST", "/api/chat", Some(json!({"user_id": "alice", "message": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
