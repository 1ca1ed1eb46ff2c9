//! HTTP handlers, request/response types and error mapping.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crawlpilot_agent::AgentError;
use crawlpilot_core::{Message, SessionError, SessionId, ToolCall, ToolDescriptor, ToolResult};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::SharedState;

// --- Wire types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    pub tools_used: Vec<String>,
    pub session_id: String,
    pub truncated: bool,
    pub iterations: u32,
    pub tool_calls: Vec<ToolCall>,
    pub tool_outputs: Vec<ToolOutputPreview>,
}

/// Output characters kept per tool result in a chat response.
pub const TOOL_OUTPUT_PREVIEW_CHARS: usize = 1000;

/// A tool result cut down for the chat response; the full text stays in
/// the session history.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutputPreview {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

impl From<&ToolResult> for ToolOutputPreview {
    fn from(result: &ToolResult) -> Self {
        let content = match result.content.char_indices().nth(TOOL_OUTPUT_PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &result.content[..cut]),
            None => result.content.clone(),
        };
        Self {
            tool_call_id: result.tool_call_id.clone(),
            name: result.name.clone(),
            content,
            is_error: result.is_error,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub tools_available: usize,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDescriptor>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummaryDto {
    pub session_id: String,
    pub message_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub running: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummaryDto>,
    pub count: usize,
}

// --- Errors ---

/// An error response: a status code and a `{"detail": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let status = match e {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::Busy(_) => StatusCode::CONFLICT,
            SessionError::AtCapacity(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.to_string())
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Session(inner) => inner.into(),
            AgentError::Model(_) => Self::new(StatusCode::BAD_GATEWAY, e.to_string()),
            AgentError::TurnTimeout { .. } => Self::new(StatusCode::GATEWAY_TIMEOUT, e.to_string()),
            AgentError::IterationLimitExceeded { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), detail = %self.detail, "Request failed");
        } else {
            warn!(status = self.status.as_u16(), detail = %self.detail, "Request rejected");
        }
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}

// --- Handlers ---

pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        tools_available: state.registry.len(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

pub async fn tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools = state.registry.list();
    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}

pub async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;

    if request.message.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Empty message"));
    }

    let session_id = match request.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => SessionId::from(id),
        _ => state.store.create_session()?,
    };

    info!(session_id = %session_id, chars = request.message.len(), "Chat request");
    let answer = state.agent.run(&session_id, &request.message).await?;

    Ok(Json(ChatResponse {
        tool_outputs: answer.tool_results.iter().map(ToolOutputPreview::from).collect(),
        reply: answer.reply,
        tools_used: answer.tools_used,
        session_id: session_id.to_string(),
        truncated: answer.truncated,
        iterations: answer.iterations,
        tool_calls: answer.tool_calls,
    }))
}

pub async fn create_session_handler(
    State(state): State<SharedState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let id = state.store.create_session()?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: id.to_string(),
            messages: Vec::new(),
        }),
    ))
}

pub async fn list_sessions_handler(State(state): State<SharedState>) -> Json<SessionListResponse> {
    let sessions: Vec<SessionSummaryDto> = state
        .store
        .list()
        .into_iter()
        .map(|s| SessionSummaryDto {
            session_id: s.id.to_string(),
            message_count: s.message_count,
            created_at: s.created_at,
            updated_at: s.updated_at,
            running: s.running,
        })
        .collect();
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

pub async fn get_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let id = SessionId::from(id.as_str());
    let messages = state.store.history(&id)?;
    Ok(Json(SessionResponse {
        session_id: id.to_string(),
        messages,
    }))
}

pub async fn delete_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.evict(&SessionId::from(id.as_str()))?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::{GatewayState, build_router};
    use axum::body::Body;
    use axum::http::Request;
    use crawlpilot_agent::AgentSettings;
    use crawlpilot_core::{BusyPolicy, LimitPolicy, ModelError, ModelResponse};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_tool_count() {
        let app = build_router(test_state(StubModel::answering("hi")));
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["toolsAvailable"], 4);
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn tools_listing_shape() {
        let app = build_router(test_state(StubModel::answering("hi")));
        let response = app.oneshot(get("/tools")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let list: ToolListResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(list.count, 4);
        assert_eq!(list.tools[0].name, "firecrawl_search");
        assert_eq!(list.tools[0].parameters["type"], "object");
    }

    #[tokio::test]
    async fn chat_creates_session_and_answers() {
        let state = test_state(StubModel::answering("Hello from the agent"));
        let app = build_router(state.clone());

        let response = app.oneshot(post_json("/chat", serde_json::json!({"message": "Hi"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["reply"], "Hello from the agent");
        assert_eq!(json["toolsUsed"], serde_json::json!([]));
        assert_eq!(json["truncated"], false);
        assert_eq!(json["iterations"], 1);

        let session_id = SessionId::from(json["sessionId"].as_str().unwrap());
        assert_eq!(state.store.history(&session_id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn chat_continues_existing_session() {
        let state = test_state(StubModel::answering("again"));
        let id = state.store.create_session().unwrap();

        for _ in 0..2 {
            let app = build_router(state.clone());
            let response = app
                .oneshot(post_json("/chat", serde_json::json!({"sessionId": id.as_str(), "message": "q"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["sessionId"], id.as_str());
        }
        assert_eq!(state.store.history(&id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn failing_tool_is_reported_to_model_not_client() {
        // Without a Firecrawl key the search call fails; the model still answers.
        let model = StubModel::new(vec![
            ModelResponse::ToolCalls {
                content: String::new(),
                calls: vec![ToolCall::new("c1", "firecrawl_search", serde_json::json!({"query": "rust"}))],
            },
            ModelResponse::Final { content: "Search is unavailable right now.".into() },
        ]);
        let app = build_router(test_state(model));

        let response = app.oneshot(post_json("/chat", serde_json::json!({"message": "search rust"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["toolsUsed"], serde_json::json!(["firecrawl_search"]));
        assert_eq!(json["iterations"], 2);
    }

    #[tokio::test]
    async fn empty_message_is_bad_request() {
        let app = build_router(test_state(StubModel::answering("x")));
        let response = app.oneshot(post_json("/chat", serde_json::json!({"message": "   "}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, serde_json::json!({"detail": "Empty message"}));
    }

    #[tokio::test]
    async fn missing_message_is_unprocessable() {
        let app = build_router(test_state(StubModel::answering("x")));
        let response = app.oneshot(post_json("/chat", serde_json::json!({"sessionId": "abc"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["detail"].is_string());
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let app = build_router(test_state(StubModel::answering("x")));
        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let app = build_router(test_state(StubModel::answering("x")));
        let response = app
            .oneshot(post_json("/chat", serde_json::json!({"sessionId": "nope", "message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn multi_call_batch_is_reported_in_call_order() {
        let model = StubModel::new(vec![
            ModelResponse::ToolCalls {
                content: "Looking around.".into(),
                calls: vec![
                    ToolCall::new("s1", "firecrawl_search", serde_json::json!({"query": "apple headphones"})),
                    ToolCall::new("m1", "firecrawl_map", serde_json::json!({"url": "https://www.apple.com"})),
                    ToolCall::new("x1", "no_such_tool", serde_json::json!({})),
                ],
            },
            ModelResponse::Final { content: "Here is what I found.".into() },
        ]);
        let app = build_router(test_state(model));

        let response = app.oneshot(post_json("/chat", serde_json::json!({"message": "headphones"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["reply"], "Here is what I found.");
        assert_eq!(
            json["toolsUsed"],
            serde_json::json!(["firecrawl_search", "firecrawl_map", "no_such_tool"])
        );
        let call_ids: Vec<&str> = json["toolCalls"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap())
            .collect();
        assert_eq!(call_ids, vec!["s1", "m1", "x1"]);
        let outputs = json["toolOutputs"].as_array().unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[2]["toolCallId"], "x1");
        assert_eq!(outputs[2]["isError"], true);
        assert!(outputs[2]["content"].as_str().unwrap().contains("Tool not found: no_such_tool"));
    }

    #[test]
    fn tool_output_preview_is_capped() {
        let long = ToolResult::ok("c1", "firecrawl_scrape", "a".repeat(TOOL_OUTPUT_PREVIEW_CHARS + 50));
        let preview = ToolOutputPreview::from(&long);
        assert_eq!(preview.content.len(), TOOL_OUTPUT_PREVIEW_CHARS + 3);
        assert!(preview.content.ends_with("..."));

        let short = ToolResult::ok("c2", "firecrawl_scrape", "short");
        assert_eq!(ToolOutputPreview::from(&short).content, "short");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_chats_on_distinct_sessions_overlap() {
        const REQUESTS: usize = 5;
        let delay = Duration::from_secs(1);
        let state = test_state(StubModel::answering("parallel").with_delay(delay));
        let app = build_router(state.clone());

        let started = tokio::time::Instant::now();
        let mut set = tokio::task::JoinSet::new();
        for i in 0..REQUESTS {
            let app = app.clone();
            set.spawn(async move {
                let body = serde_json::json!({"message": format!("question {i}")});
                let response = app.oneshot(post_json("/chat", body)).await.unwrap();
                let status = response.status();
                (status, json_body(response).await)
            });
        }

        let mut sessions = std::collections::HashSet::new();
        while let Some(joined) = set.join_next().await {
            let (status, json) = joined.unwrap();
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["reply"], "parallel");
            sessions.insert(json["sessionId"].as_str().unwrap().to_string());
        }

        assert_eq!(sessions.len(), REQUESTS);
        assert_eq!(state.store.len(), REQUESTS);
        assert!(started.elapsed() < delay * REQUESTS as u32);
    }

    #[tokio::test]
    async fn session_capacity_is_service_unavailable() {
        let state = test_state(StubModel::answering("x"));
        let store = state.store.clone();
        let mut guards = Vec::new();
        while store.len() < 100 {
            let id = store.create_session().unwrap();
            guards.push(store.begin_turn(&id, BusyPolicy::Reject).await.unwrap());
        }

        let app = build_router(state);
        let response = app
            .oneshot(post_json("/chat", serde_json::json!({"message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(json_body(response).await["detail"].as_str().unwrap().contains("capacity"));
    }

    #[tokio::test]
    async fn busy_session_is_conflict() {
        let state = test_state(StubModel::answering("x"));
        let id = state.store.create_session().unwrap();
        let _running = state.store.begin_turn(&id, BusyPolicy::Reject).await.unwrap();

        let app = build_router(state.clone());
        let response = app
            .oneshot(post_json("/chat", serde_json::json!({"sessionId": id.as_str(), "message": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn model_failure_is_bad_gateway() {
        let app = build_router(test_state(FailingModel(ModelError::AuthenticationFailed("bad key".into()))));
        let response = app.oneshot(post_json("/chat", serde_json::json!({"message": "hi"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test(start_paused = true)]
    async fn turn_timeout_is_gateway_timeout() {
        let settings = AgentSettings {
            turn_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let model = StubModel::answering("late").with_delay(Duration::from_secs(30));
        let app = build_router(test_state_with(model, settings));
        let response = app.oneshot(post_json("/chat", serde_json::json!({"message": "hi"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn fail_policy_limit_is_server_error() {
        let settings = AgentSettings {
            max_iterations: 2,
            limit_policy: LimitPolicy::Fail,
            ..Default::default()
        };
        let model = StubModel::new(vec![ModelResponse::ToolCalls {
            content: String::new(),
            calls: vec![ToolCall::new("", "firecrawl_map", serde_json::json!({"url": "https://example.com"}))],
        }]);
        let app = build_router(test_state_with(model, settings));
        let response = app.oneshot(post_json("/chat", serde_json::json!({"message": "hi"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let state = test_state(StubModel::answering("x"));

        let response = build_router(state.clone())
            .oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        let id = created["sessionId"].as_str().unwrap().to_string();

        let response = build_router(state.clone()).oneshot(get(&format!("/sessions/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["messages"], serde_json::json!([]));

        let response = build_router(state.clone()).oneshot(get("/sessions")).await.unwrap();
        assert_eq!(json_body(response).await["count"], 1);

        let response = build_router(state.clone())
            .oneshot(Request::builder().method("DELETE").uri(format!("/sessions/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = build_router(state).oneshot(get(&format!("/sessions/{id}"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let state: Arc<GatewayState> = test_state(StubModel::answering("x"));
        let app = build_router(state);
        let huge = "a".repeat(2 * 1024 * 1024);
        let response = app.oneshot(post_json("/chat", serde_json::json!({"message": huge}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
