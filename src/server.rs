use axum::{
    Json, Router,
    extract::{
        Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    middleware::Next,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::AppState;
use crate::agents::{AgentRegistry, CodingAgent, ExecutionAgent, SearchAgent};
use crate::config::{AppConfig, EmbedderKind};
use crate::domain::{AgentType, RecalledMemory};
use crate::error::TaskError;
use crate::llm::{ChatCompletionsClient, LlmSettings, TemplateGenerator, TextGenerator};
use crate::memory::{
    ChronologicalLog, DEFAULT_HISTORY_LIMIT, DEFAULT_TOP_K, Embedder, FastEmbedder,
    HashingEmbedder, InMemoryIndex, InMemoryLog, MemoryStore, SqliteLog,
};
use crate::orchestrator::Orchestrator;
use crate::progress::ProgressHub;
use crate::sandbox::{ProcessSandbox, PythonAstScreen, PythonSyntaxValidator};
use crate::search::{SearchProvider, SerpApiClient, UnconfiguredSearch};

/// Wire collaborators, memory and agents into the shared state.
///
/// `llm` is `None` when no generation endpoint is configured; code
/// generation then uses the offline template.
pub async fn build_state(
    config: Arc<AppConfig>,
    llm: Option<LlmSettings>,
) -> anyhow::Result<AppState> {
    let embedder: Arc<dyn Embedder> = match config.memory.embedder {
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(config.memory.vector_dimension)),
        EmbedderKind::Fastembed => Arc::new(FastEmbedder::initialize().await?),
    };

    let log: Arc<dyn ChronologicalLog> = if config.memory.is_in_memory() {
        Arc::new(InMemoryLog::new())
    } else {
        Arc::new(SqliteLog::connect(&config.memory.database_url).await?)
    };

    let memory = MemoryStore::new(log, Arc::new(InMemoryIndex::new()), embedder);
    let indexed = memory.reconcile().await?;
    info!(
        name: "memory.ready",
        backend = memory.log_backend(),
        embedder = memory.embedder_name(),
        indexed,
        "Memory store ready"
    );

    let search: Arc<dyn SearchProvider> = match &config.search.api_key {
        Some(key) => Arc::new(SerpApiClient::new(
            &config.search.endpoint,
            key,
            config.provider_timeout(),
        )?),
        None => {
            warn!(name: "search.unconfigured", "No search API key, search tasks will fail");
            Arc::new(UnconfiguredSearch)
        }
    };

    let generator: Arc<dyn TextGenerator> = match llm {
        Some(settings) => {
            info!(
                name: "llm.config.loaded",
                base_url = %settings.base_url,
                model = %settings.model,
                "LLM configuration loaded"
            );
            Arc::new(ChatCompletionsClient::new(settings, config.provider_timeout())?)
        }
        None => {
            warn!(name: "llm.unconfigured", "No LLM configured, using template generator");
            Arc::new(TemplateGenerator)
        }
    };

    let agents = AgentRegistry::new(
        Arc::new(SearchAgent::new(search, config.agents.max_search_results)),
        Arc::new(CodingAgent::new(
            generator,
            Arc::new(PythonSyntaxValidator::new(&config.agents.python_bin)),
        )),
        Arc::new(ExecutionAgent::new(
            Arc::new(ProcessSandbox::new(
                &config.agents.python_bin,
                config.agents.max_output_chars,
            )),
            Arc::new(PythonAstScreen::new(&config.agents.python_bin)),
            Duration::from_secs(config.agents.execution_timeout_secs),
        )),
    )?;

    let orchestrator = Orchestrator::new(agents, memory, ProgressHub::default());

    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
        config,
    })
}

pub fn build_router(state: AppState) -> Router {
    let timeout_duration = Duration::from_secs(state.config.server.request_timeout_secs);
    let cors = if state.config.server.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(api_status))
        .route("/api/tasks", post(submit_task))
        .route("/api/events", get(progress_events))
        .route("/api/memory", axum::routing::delete(clear_memory))
        .route("/api/memory/recall", get(recall_memory))
        .route("/api/memory/history", get(memory_history))
        .route("/api/memory/stats", get(memory_stats))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| {
                let duration = timeout_duration;
                async move {
                    match tokio::time::timeout(duration, next.run(req)).await {
                        Ok(res) => res,
                        Err(_) => error_response(
                            StatusCode::REQUEST_TIMEOUT,
                            "request_timeout",
                            &format!("request timed out after {}s", duration.as_secs()),
                        ),
                    }
                }
            },
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, llm: Option<LlmSettings>) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config), llm).await?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({
        "status": "error",
        "code": code,
        "error_message": message,
    });
    (status, Json(body)).into_response()
}

/// Caller-facing error: 400 for bad input, 500 for storage failures.
#[derive(Debug)]
pub struct ApiError(TaskError);

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            TaskError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            TaskError::Storage(_) | TaskError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.0.code(), &self.0.to_string())
    }
}

/// Malformed query strings get the same JSON error body as other bad input.
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, TaskError> {
    query
        .map(|Query(params)| params)
        .map_err(|e| TaskError::InvalidArgument(e.body_text()))
}

/// Request body for task submission.
#[derive(Debug, Deserialize)]
struct SubmitRequest {
    description: String,
    #[serde(default)]
    agent_type: Option<String>,
}

/// POST /api/tasks - Run one task to completion.
///
/// The task runs on its own tokio task: a timed-out or disconnected caller
/// does not cancel it, so it still emits its terminal event and is recorded.
async fn submit_task(
    State(state): State<AppState>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| TaskError::InvalidArgument(e.body_text()))?;
    let explicit = req
        .agent_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse::<AgentType>)
        .transpose()?;

    let orchestrator = Arc::clone(&state.orchestrator);
    let description = req.description;
    let response = tokio::spawn(async move {
        orchestrator.execute_task(&description, explicit).await
    })
    .await
    .map_err(|e| TaskError::Internal(format!("task runner failed: {e}")))??;
    Ok(Json(response).into_response())
}

#[derive(Debug, Deserialize)]
struct RecallParams {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

/// GET /api/memory/recall?q=&limit= - Similarity search over past tasks.
async fn recall_memory(
    State(state): State<AppState>,
    query: Result<Query<RecallParams>, QueryRejection>,
) -> Result<Json<Vec<RecalledMemory>>, ApiError> {
    let params = query_params(query)?;
    let context = state
        .orchestrator
        .recall_context(&params.q, params.limit.unwrap_or(DEFAULT_TOP_K))
        .await?;
    Ok(Json(context.relevant_memories))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

/// GET /api/memory/history?limit= - Most recent tasks first.
async fn memory_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = query_params(query)?;
    let records = state
        .orchestrator
        .history(params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await?;
    Ok(Json(records).into_response())
}

/// DELETE /api/memory - Empty both memory stores.
async fn clear_memory(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.orchestrator.clear_memory().await?;
    Ok(Json(json!({"status": "success", "message": "memory cleared"})).into_response())
}

async fn memory_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state
        .orchestrator
        .memory()
        .stats()
        .await
        .map_err(TaskError::from)?;
    Ok(Json(stats).into_response())
}

async fn api_status(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.orchestrator.status().await?).into_response())
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// GET /api/events - Live progress events. No replay; lagging clients skip.
async fn progress_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let stream = state.orchestrator.progress().stream().map(|event| {
        let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event.kind.as_str()).data(json))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
