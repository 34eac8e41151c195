use agent_orchestra::AppState;
use agent_orchestra::agents::{AgentRegistry, CapabilityAgent};
use agent_orchestra::config::AppConfig;
use agent_orchestra::domain::{AgentResult, AgentType, ProgressKind};
use agent_orchestra::memory::{HashingEmbedder, MemoryStore};
use agent_orchestra::orchestrator::Orchestrator;
use agent_orchestra::progress::{ProgressHub, ProgressReporter};
use agent_orchestra::server::{build_router, build_state};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Map, Value, json};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

/// Answers after a fixed delay.
#[derive(Debug)]
struct Sleepy(AgentType, Duration);

#[async_trait::async_trait]
impl CapabilityAgent for Sleepy {
    fn agent_type(&self) -> AgentType {
        self.0
    }

    async fn run(&self, _description: &str, _progress: &ProgressReporter) -> AgentResult {
        tokio::time::sleep(self.1).await;
        AgentResult::success(self.name(), json!("done"), Map::new())
    }
}

async fn server() -> TestServer {
    unsafe {
        std::env::remove_var("SERPAPI_API_KEY");
        std::env::remove_var("ORCHESTRA_MEMORY__DATABASE_URL");
    }
    let config = AppConfig::load_from_args(["agent-orchestra", "--database-url", "memory"])
        .expect("Failed to load config");
    let state = build_state(Arc::new(config), None)
        .await
        .expect("Failed to build state");
    TestServer::new(build_router(state)).expect("Failed to start test server")
}

#[tokio::test]
#[serial]
async fn test_health_and_status() {
    let server = server().await;

    let health = server.get("/health").await;
    health.assert_status_ok();
    health.assert_json(&json!({"status": "ok"}));

    let status: Value = server.get("/api/status").await.json();
    assert_eq!(status["status"], "active");
    assert_eq!(status["memory_backend"], "memory");
    assert_eq!(status["embedder"], "hashing");
    assert_eq!(status["agents"].as_array().unwrap().len(), 3);
    assert_eq!(status["memory"]["total_records"], 0);
}

#[tokio::test]
#[serial]
async fn test_submit_rejects_bad_input() {
    let server = server().await;

    let response = server
        .post("/api/tasks")
        .json(&json!({"description": "search rust", "agent_type": "planner"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "invalid_argument");
    assert!(body["error_message"].as_str().unwrap().contains("planner"));

    let response = server
        .post("/api/tasks")
        .json(&json!({"description": "   "}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let history: Value = server.get("/api/memory/history").await.json();
    assert_eq!(history, json!([]));
}

#[tokio::test]
#[serial]
async fn test_agent_failure_is_a_successful_http_response() {
    let server = server().await;

    let response = server
        .post("/api/tasks")
        .json(&json!({"description": "Search for the latest tokio release"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["task"]["agent_type"], "search");
    assert_eq!(body["agent_response"]["error"]["code"], "provider_error");
    assert_eq!(body["memory"]["chronological"], "written");

    let history: Value = server
        .get("/api/memory/history")
        .add_query_param("limit", 10)
        .await
        .json();
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "error");
    assert_eq!(history[0]["id"], body["task"]["id"]);

    let recalled: Value = server
        .get("/api/memory/recall")
        .add_query_param("q", "tokio release")
        .await
        .json();
    assert_eq!(recalled[0]["task_ref"], body["task"]["id"]);
    assert_eq!(recalled[0]["type"], "search");
}

#[tokio::test]
#[serial]
async fn test_execution_is_rejected_before_running() {
    let server = server().await;

    let body: Value = server
        .post("/api/tasks")
        .json(&json!({
            "description": "open('/tmp/owned', 'w').write('x')",
            "agent_type": "execution"
        }))
        .await
        .json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["agent_response"]["error"]["code"], "security_error");
    assert_eq!(body["task"]["classified_by"], "explicit");
}

#[tokio::test]
#[serial]
async fn test_memory_endpoints_validate_and_clear() {
    let server = server().await;

    server
        .get("/api/memory/history")
        .add_query_param("limit", 0)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/api/memory/recall")
        .add_query_param("q", "   ")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    for response in [
        server
            .get("/api/memory/history")
            .add_query_param("limit", "abc")
            .await,
        server
            .get("/api/memory/recall")
            .add_query_param("q", "tokio")
            .add_query_param("limit", -1)
            .await,
        server.post("/api/tasks").text("not json").await,
    ] {
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "invalid_argument");
    }

    let recalled: Value = server
        .get("/api/memory/recall")
        .add_query_param("q", "anything")
        .await
        .json();
    assert_eq!(recalled, json!([]));

    server
        .post("/api/tasks")
        .json(&json!({"description": "look up axum extractors"}))
        .await
        .assert_status_ok();

    let cleared = server.delete("/api/memory").await;
    cleared.assert_status_ok();
    assert_eq!(cleared.json::<Value>()["status"], "success");

    let stats: Value = server.get("/api/memory/stats").await.json();
    assert_eq!(stats["total_records"], 0);
    assert_eq!(stats["indexed_entries"], 0);

    server.delete("/api/memory").await.assert_status_ok();
}

#[tokio::test]
#[serial]
async fn test_events_endpoint_is_an_sse_stream() {
    use axum::body::Body;
    use axum::http::{Request, header};
    use tower::ServiceExt;

    let config = AppConfig::load_from_args(["agent-orchestra", "--database-url", "memory"])
        .expect("Failed to load config");
    let state = build_state(Arc::new(config), None)
        .await
        .expect("Failed to build state");
    let hub = state.orchestrator.progress().clone();
    let router = build_router(state);

    let response = router
        .oneshot(Request::get("/api/events").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(hub.observer_count(), 1);

    drop(response);
    assert_eq!(hub.observer_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_timed_out_request_still_finishes_and_records_the_task() {
    let mut config = AppConfig::load_from_args(["agent-orchestra", "--database-url", "memory"])
        .expect("Failed to load config");
    config.server.request_timeout_secs = 1;

    let agents = AgentRegistry::new(
        Arc::new(Sleepy(AgentType::Search, Duration::from_secs(2))),
        Arc::new(Sleepy(AgentType::Coding, Duration::ZERO)),
        Arc::new(Sleepy(AgentType::Execution, Duration::ZERO)),
    )
    .unwrap();
    let orchestrator = Arc::new(Orchestrator::new(
        agents,
        MemoryStore::in_memory(Arc::new(HashingEmbedder::new(64))),
        ProgressHub::default(),
    ));
    let mut rx = orchestrator.progress().subscribe();
    let server = TestServer::new(build_router(AppState {
        orchestrator: Arc::clone(&orchestrator),
        config: Arc::new(config),
    }))
    .expect("Failed to start test server");

    let response = server
        .post("/api/tasks")
        .json(&json!({"description": "search for slow answers"}))
        .await;
    response.assert_status(StatusCode::REQUEST_TIMEOUT);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], "request_timeout");

    let history = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let history = orchestrator.history(10).await.unwrap();
            if !history.is_empty() {
                break history;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("task was never recorded");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].description, "search for slow answers");

    let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(events.first().unwrap().kind, ProgressKind::Start);
    assert_eq!(events.last().unwrap().kind, ProgressKind::Complete);
}
