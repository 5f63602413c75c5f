//! End-to-end batches against throwaway HTTP backends.
//!
//! The orchestrator stands in for `docker compose`: `up` serves the
//! readiness, seed, and chat endpoints on the allocated app port and `down`
//! shuts that server down. Everything else (port allocation, the lifecycle
//! state machine, HTTP probe, chat client, judge, aggregation, reporting) is
//! the production code.

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use convsim_core::domain::conversation::alternates_from_user;
use convsim_core::{
    write_batch_report, BatchCoordinator, BatchRequest, Catalog, Complexity, DialogueDriver,
    DialoguePolicy, Goal, HttpChatClient, IsolatedRunner, MetricsExtractor, Persona,
    PersonaTraits, RuleBasedJudge, ScriptedUtteranceGenerator,
};
use isolated_env::{
    EnvError, EnvironmentHandle, HttpProbe, IsolatedEnvironmentProvider, Orchestrator,
    PortAllocator, ReadinessPolicy, Secrets,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, PartialEq)]
enum Backend {
    Healthy,
    NeverReady,
    SeedRejects,
    ChatBroken,
}

struct LocalOrchestrator {
    backend: Backend,
    ups: AtomicU32,
    downs: AtomicU32,
    servers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl LocalOrchestrator {
    fn new(backend: Backend) -> Arc<Self> {
        Arc::new(Self {
            backend,
            ups: AtomicU32::new(0),
            downs: AtomicU32::new(0),
            servers: Mutex::new(HashMap::new()),
        })
    }

    fn app(backend: Backend) -> Router {
        let seed = move || async move {
            if backend == Backend::SeedRejects {
                Json(serde_json::json!({"success": false, "error": "embedding quota"}))
            } else {
                Json(serde_json::json!({"success": true, "message": "seeded"}))
            }
        };
        let chat = move |Json(body): Json<serde_json::Value>| async move {
            if backend == Backend::ChatBroken {
                return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
            }
            let turns = body["messages"].as_array().map(|m| m.len()).unwrap_or(0);
            let sse = format!(
                "data: {{\"type\":\"text-delta\",\"delta\":\"I found a stored memory \"}}\n\n\
                 data: {{\"type\":\"text-delta\",\"delta\":\"after {turns} messages.\"}}\n\n\
                 data: [DONE]\n\n"
            );
            ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response()
        };
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/api/eval/seed", post(seed))
            .route("/api/chat", post(chat))
    }
}

#[async_trait]
impl Orchestrator for LocalOrchestrator {
    async fn up(&self, handle: &EnvironmentHandle, _secrets: &Secrets) -> isolated_env::Result<()> {
        self.ups.fetch_add(1, Ordering::SeqCst);
        if self.backend == Backend::NeverReady {
            return Ok(());
        }
        let listener = TcpListener::bind(("127.0.0.1", handle.app_port))
            .await
            .map_err(|e| EnvError::StartFailure {
                run_id: handle.run_id.clone(),
                reason: e.to_string(),
            })?;
        let app = Self::app(self.backend);
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        self.servers
            .lock()
            .unwrap()
            .insert(handle.run_id.clone(), server);
        Ok(())
    }

    async fn down(&self, handle: &EnvironmentHandle) -> isolated_env::Result<()> {
        self.downs.fetch_add(1, Ordering::SeqCst);
        if let Some(server) = self.servers.lock().unwrap().remove(&handle.run_id) {
            server.abort();
        }
        Ok(())
    }
}

fn catalog() -> Arc<Catalog> {
    let goal = Goal::new("g1", "recall a dinner", "What did I do last Tuesday?", Complexity::Simple)
        .with_criterion("Assistant finds the stored memory")
        .with_follow_up("Who was I with?")
        .with_follow_up("Where was it?");
    let other = Goal::new("g2", "recall groceries", "What did I buy?", Complexity::Simple)
        .with_criterion("Assistant finds the stored memory");
    Arc::new(
        Catalog::new(
            vec![Persona::new("p1", "Tester", PersonaTraits::neutral())],
            vec![goal, other],
        )
        .unwrap(),
    )
}

fn coordinator(orchestrator: Arc<LocalOrchestrator>, start_port: u16) -> BatchCoordinator {
    let probe = Arc::new(HttpProbe::new(Duration::from_millis(500), Duration::from_secs(5)).unwrap());
    let provider = IsolatedEnvironmentProvider::new(orchestrator, probe)
        .with_allocator(PortAllocator::default(), start_port);
    let transport = Arc::new(HttpChatClient::new(Duration::from_secs(5)).unwrap());
    let driver = DialogueDriver::new(transport, Arc::new(ScriptedUtteranceGenerator::new()))
        .with_policy(DialoguePolicy::default());
    let runner = IsolatedRunner::new(
        Arc::new(provider),
        driver,
        MetricsExtractor::new(Arc::new(RuleBasedJudge::new())),
    )
    .with_readiness(ReadinessPolicy {
        max_retries: 3,
        poll_interval_ms: 20,
    })
    .with_run_deadline(Some(Duration::from_secs(30)));
    BatchCoordinator::new(catalog(), Arc::new(runner))
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn two_repetitions_produce_two_isolated_lifecycles() {
    let orchestrator = LocalOrchestrator::new(Backend::Healthy);
    let coordinator = coordinator(orchestrator.clone(), 39_100);
    let request = BatchRequest::new(ids(&["p1"]), ids(&["g1"]))
        .with_repetitions(2)
        .with_max_turns(3);

    let outcome = coordinator.run_batch(&request).await;

    assert_eq!(outcome.total_runs(), 2);
    assert_eq!(outcome.successful_runs(), 2, "failures: {:?}", outcome.failures);
    assert_eq!(orchestrator.ups.load(Ordering::SeqCst), 2);
    assert_eq!(orchestrator.downs.load(Ordering::SeqCst), 2);

    let ids: Vec<&str> = outcome
        .results
        .iter()
        .map(|r| r.config.simulation_id.as_str())
        .collect();
    assert_ne!(ids[0], ids[1]);
    assert!(ids[0].starts_with("batch-p1-g1-1-"));
    assert!(ids[1].starts_with("batch-p1-g1-2-"));

    for result in &outcome.results {
        assert!(result.transcript.len() <= 6);
        assert!(alternates_from_user(&result.transcript));
        assert_eq!(result.transcript[0].text, "What did I do last Tuesday?");
        assert!(result.transcript[1].text.starts_with("I found a stored memory"));
        assert!(result.config.api_endpoint.ends_with("/api/chat"));
        assert_eq!(result.metrics.total_turns, 3);
        assert!(result.errors.is_empty());
    }

    let dir = tempfile::tempdir().unwrap();
    let path = write_batch_report(dir.path(), &outcome.into_report()).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["total_runs"], 2);
    assert_eq!(written["all_results"].as_array().unwrap().len(), 2);
    assert_eq!(written["results_by_persona"]["p1"]["runs"], 2);
}

#[tokio::test]
async fn unknown_goal_never_starts_an_environment() {
    let orchestrator = LocalOrchestrator::new(Backend::Healthy);
    let coordinator = coordinator(orchestrator.clone(), 39_300);
    let request = BatchRequest::new(ids(&["p1"]), ids(&["does-not-exist"])).with_max_turns(2);

    let outcome = coordinator.run_batch(&request).await;

    assert_eq!(outcome.total_runs(), 1);
    assert_eq!(outcome.failed_runs(), 1);
    assert_eq!(orchestrator.ups.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.downs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn readiness_timeout_tears_down_and_batch_continues() {
    let orchestrator = LocalOrchestrator::new(Backend::NeverReady);
    let coordinator = coordinator(orchestrator.clone(), 39_500);
    let request = BatchRequest::new(ids(&["p1"]), ids(&["g1", "g2"])).with_max_turns(2);

    let outcome = coordinator.run_batch(&request).await;

    assert_eq!(outcome.total_runs(), 2);
    assert_eq!(outcome.failed_runs(), 2);
    assert!(outcome.failures[0].error.contains("not ready"));
    assert_eq!(orchestrator.ups.load(Ordering::SeqCst), 2);
    assert_eq!(orchestrator.downs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn seed_rejection_fails_run_and_stops_once() {
    let orchestrator = LocalOrchestrator::new(Backend::SeedRejects);
    let coordinator = coordinator(orchestrator.clone(), 39_700);
    let request = BatchRequest::new(ids(&["p1"]), ids(&["g1"])).with_max_turns(2);

    let outcome = coordinator.run_batch(&request).await;

    assert_eq!(outcome.failed_runs(), 1);
    assert!(outcome.failures[0].error.contains("embedding quota"));
    assert_eq!(orchestrator.ups.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.downs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chat_errors_are_recorded_not_fatal() {
    let orchestrator = LocalOrchestrator::new(Backend::ChatBroken);
    let coordinator = coordinator(orchestrator.clone(), 39_900);
    let request = BatchRequest::new(ids(&["p1"]), ids(&["g1"])).with_max_turns(5);

    let outcome = coordinator.run_batch(&request).await;

    assert_eq!(outcome.successful_runs(), 1);
    let result = &outcome.results[0];
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.transcript.len(), 4);
    assert!(alternates_from_user(&result.transcript));
    assert!(result.transcript[1].is_transport_error());
    assert_eq!(result.metrics.average_response_time, 0.0);
    assert_eq!(orchestrator.downs.load(Ordering::SeqCst), 1);
}
