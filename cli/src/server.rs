use crate::error::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use toolloop_core::{MemoryRecord, Orchestrator, ToolSpec};

pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/execute-function", post(execute_function))
        .route("/api/openai-call", post(openai_call))
        .route("/api/prompt", post(record_prompt))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/refresh", post(refresh_tools))
        .route("/api/memories", get(list_memories))
        .with_state(state)
}

pub async fn serve(bind: &str, state: Arc<ServerState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "Server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteFunctionRequest {
    #[serde(alias = "function_name")]
    function_name: String,
    #[serde(default)]
    parameters: Value,
}

/// POST /api/execute-function
async fn execute_function(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<ExecuteFunctionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let registry = state.orchestrator.tool_registry();
    tracing::info!(tool = %request.function_name, "Direct tool invocation");

    let result = registry
        .invoke(&request.function_name, request.parameters)
        .await?;

    Ok(Json(json!({
        "result": result,
        "functions": registry.names(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnRequest {
    #[serde(default, alias = "user_message")]
    user_message: Option<String>,
}

/// POST /api/openai-call
async fn openai_call(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let user_message = request
        .user_message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("userMessage is required"))?;

    let outcome = state.orchestrator.process(&user_message).await?;

    Ok(Json(json!({
        "finalText": outcome.final_text,
        "toolResult": outcome.tool_invocation.as_ref().map(|t| &t.result),
        "availableToolNames": state.orchestrator.tool_registry().names(),
        "ignoredToolCalls": outcome.ignored_tool_calls,
    })))
}

/// POST /api/prompt
async fn record_prompt(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(client_state) = payload?;
    let record = state.orchestrator.record_prompt(&client_state).await?;

    Ok(Json(json!({
        "message": format!("Saved prompt: {}", record.user_message),
        "key": record.key,
        "state": client_state,
    })))
}

async fn list_tools(State(state): State<Arc<ServerState>>) -> Json<Vec<ToolSpec>> {
    Json(state.orchestrator.tool_registry().list_descriptors())
}

/// Manifest sources read the filesystem synchronously, so the refresh runs
/// off the async workers.
async fn refresh_tools(State(state): State<Arc<ServerState>>) -> Result<Json<Value>, ApiError> {
    let registry = state.orchestrator.tool_registry().clone();
    let report = tokio::task::spawn_blocking(move || registry.refresh())
        .await
        .map_err(|e| ApiError::internal(format!("tool refresh did not complete: {e}")))?;
    let skipped: Vec<String> = report.skipped.iter().map(|e| e.to_string()).collect();

    Ok(Json(json!({
        "loaded": report.loaded,
        "skipped": skipped,
    })))
}

#[derive(Debug, Deserialize)]
struct MemoryQuery {
    q: Option<String>,
}

async fn list_memories(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<Vec<MemoryRecord>>, ApiError> {
    let memory = state.orchestrator.memory();
    let records = match query.q.as_deref() {
        Some(q) => memory.search(q).await?,
        None => memory.all().await?,
    };
    Ok(Json(records))
}
