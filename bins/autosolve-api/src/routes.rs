use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/submit_challenge", post(handlers::submit_challenge))
        .route("/challenge_status/:challenge_id", get(handlers::challenge_status))
        .route("/solved_challenges", get(handlers::solved_challenges))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChallengeRegistry;
    use async_trait::async_trait;
    use autosolve_common::types::{ExecutionReport, TestCase, TestResult};
    use autosolve_common::SolutionCache;
    use autosolve_engine::gateway::{ModelGateway, Turn};
    use autosolve_engine::{Sandbox, Solver, SolverSettings};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::num::NonZeroU32;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct ScriptedGateway {
        replies: Mutex<VecDeque<Option<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<Option<&str>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn complete(&self, _history: &[Turn]) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().pop_front().flatten()
        }
    }

    /// Passes every test when the candidate adds, fails every test otherwise
    struct AddingSandbox;

    #[async_trait]
    impl Sandbox for AddingSandbox {
        async fn execute(&self, code: &str, test_cases: &[TestCase]) -> ExecutionReport {
            let passed = code.contains("a + b");
            let test_results: Vec<TestResult> = test_cases
                .iter()
                .enumerate()
                .map(|(i, tc)| TestResult {
                    test_number: i as u32 + 1,
                    input: tc.input.clone(),
                    expected_output: tc.expected_output.clone(),
                    actual_output: Some(if passed { tc.expected_output.to_string() } else { "0".to_string() }),
                    passed,
                    error: None,
                })
                .collect();
            ExecutionReport {
                success: passed,
                output: String::new(),
                error_message: None,
                exception_type: None,
                test_results,
            }
        }
    }

    fn app(dir: &TempDir, replies: Vec<Option<&str>>) -> Router {
        let gateway = ScriptedGateway::new(replies);
        app_with_gateways(dir, gateway.clone(), gateway)
    }

    fn app_with_gateways(
        dir: &TempDir,
        gateway: Arc<ScriptedGateway>,
        parser_gateway: Arc<ScriptedGateway>,
    ) -> Router {
        let solver = Solver::new(
            gateway,
            Arc::new(AddingSandbox),
            SolutionCache::open(dir.path()).unwrap(),
            SolverSettings {
                repair_delay: Duration::ZERO,
                max_detailed_failures: 2,
            },
        );
        let state = Arc::new(AppState {
            solver,
            parser_gateway,
            registry: ChallengeRegistry::new(),
            default_max_attempts: NonZeroU32::new(5).unwrap(),
        });
        routes().with_state(state)
    }

    fn add_challenge() -> Value {
        json!({
            "description": "add two numbers",
            "test_cases": [
                {"input": [1, 2], "expected_output": 3},
                {"input": [-5, 10], "expected_output": 5}
            ]
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn wait_for_terminal(app: &Router, id: &str) -> Value {
        for _ in 0..200 {
            let (status, run) = send(app, get(&format!("/challenge_status/{}", id))).await;
            assert_eq!(status, StatusCode::OK);
            if matches!(run["status"].as_str(), Some("solved" | "failed" | "error")) {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("challenge {} never finished", id);
    }

    const ADD_REPLY: &str = "```python\ndef solve(a, b):\n    return a + b\n```";

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let resp = app(&dir, vec![]).oneshot(get("/status")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submit_solve_then_cached() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, vec![Some(ADD_REPLY)]);

        let (status, body) = send(&app, post_json("/submit_challenge", &add_challenge())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "processing");
        let id = body["challenge_id"].as_str().unwrap().to_string();
        let hash = body["challenge_hash"].as_str().unwrap().to_string();

        let run = wait_for_terminal(&app, &id).await;
        assert_eq!(run["status"], "solved");
        assert_eq!(run["attempts_made"], 1);
        assert_eq!(run["result"]["final_code"], "def solve(a, b):\n    return a + b");

        // Same challenge again is answered from the cache
        let (status, body) = send(&app, post_json("/submit_challenge", &add_challenge())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["challenge_id"], format!("cached_{}", hash));
        assert_eq!(body["solution"]["attempts_taken"], 1);

        let (status, body) = send(&app, get(&format!("/challenge_status/cached_{}", hash))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "solved");

        let (status, body) = send(&app, get("/solved_challenges")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["fingerprint"], hash);
    }

    #[tokio::test]
    async fn test_gateway_exhaustion_reports_error() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, vec![None]);

        let (_, body) = send(&app, post_json("/submit_challenge", &add_challenge())).await;
        let run = wait_for_terminal(&app, body["challenge_id"].as_str().unwrap()).await;

        assert_eq!(run["status"], "error");
        assert_eq!(run["result"]["reason"], "no_response");
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, vec![]);

        let (status, body) = send(&app, post_json("/submit_challenge", &json!({"description": "x"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("test_cases"));

        let mut zero = add_challenge();
        zero["max_attempts"] = json!(0);
        let (status, _) = send(&app, post_json("/submit_challenge", &zero)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_raw_input_parse_failure_is_422() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, vec![Some("not json"), Some("nope"), Some("still no")]);

        let (status, body) = send(
            &app,
            post_json("/submit_challenge", &json!({"raw_input": "add two numbers"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("Failed to parse"));
    }

    #[tokio::test]
    async fn test_raw_input_parse_is_bounded_to_parser_tries() {
        let dir = TempDir::new().unwrap();
        let solver_gateway = ScriptedGateway::new(vec![]);
        let parser_gateway = ScriptedGateway::new(vec![
            Some("not json"),
            None,
            Some("still no"),
            Some(r#"{"description": "add", "test_cases": [{"input": [1, 2], "expected_output": 3}]}"#),
        ]);
        let app = app_with_gateways(&dir, solver_gateway.clone(), parser_gateway.clone());

        let (status, _) = send(
            &app,
            post_json("/submit_challenge", &json!({"raw_input": "add two numbers"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(parser_gateway.calls(), 3);
        assert_eq!(solver_gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_challenge_is_404() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, vec![]);

        let (status, _) = send(&app, get("/challenge_status/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get(&format!("/challenge_status/cached_{}", "0".repeat(64)))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
