//! Solve-loop scenarios against scripted collaborators.
//!
//! The gateway replays canned replies and records every conversation it is
//! shown; the sandbox judges candidates with a lookup table so no Python
//! interpreter is needed.

use async_trait::async_trait;
use autosolve_common::types::{ChallengeSpec, ExecutionReport, GatewayFailure, Outcome, TestCase, TestResult};
use autosolve_common::SolutionCache;
use autosolve_engine::gateway::{ModelGateway, Role, Turn};
use autosolve_engine::{Sandbox, Solver, SolverSettings};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const SUBTRACT: &str = "def solve(a, b):\n    return a - b";
const ADD: &str = "def solve(a, b):\n    return a + b";

fn fenced(code: &str) -> String {
    format!("Here you go:\n```python\n{}\n```\n", code)
}

struct ScriptedGateway {
    replies: Mutex<VecDeque<Option<String>>>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedGateway {
    fn new(replies: Vec<Option<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn conversations(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn complete(&self, history: &[Turn]) -> Option<String> {
        self.seen.lock().unwrap().push(history.to_vec());
        self.replies.lock().unwrap().pop_front().flatten()
    }
}

/// Evaluates `a + b` / `a - b` candidates against the test vectors
struct ArithmeticSandbox {
    calls: AtomicU32,
}

impl ArithmeticSandbox {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sandbox for ArithmeticSandbox {
    async fn execute(&self, code: &str, test_cases: &[TestCase]) -> ExecutionReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let op: fn(i64, i64) -> i64 = if code.contains("a + b") {
            |a, b| a + b
        } else if code.contains("a - b") {
            |a, b| a - b
        } else {
            return ExecutionReport::failure(
                "MissingEntryPoint",
                "No callable named 'solve' found in generated code",
                "",
            );
        };

        let test_results: Vec<TestResult> = test_cases
            .iter()
            .enumerate()
            .map(|(i, tc)| {
                let a = tc.input[0].as_i64().unwrap();
                let b = tc.input[1].as_i64().unwrap();
                let actual = json!(op(a, b));
                TestResult {
                    test_number: i as u32 + 1,
                    input: tc.input.clone(),
                    expected_output: tc.expected_output.clone(),
                    actual_output: Some(actual.to_string()),
                    passed: actual == tc.expected_output,
                    error: None,
                }
            })
            .collect();

        ExecutionReport {
            success: test_results.iter().all(|r| r.passed),
            output: String::new(),
            error_message: None,
            exception_type: None,
            test_results,
        }
    }
}

fn add_two_numbers() -> ChallengeSpec {
    let case = |a: i64, b: i64, out: i64| TestCase {
        input: vec![Value::from(a), Value::from(b)],
        expected_output: Value::from(out),
    };
    ChallengeSpec::new(
        "Write a function that adds two numbers",
        vec![case(1, 2, 3), case(-5, 10, 5)],
    )
}

fn solver(gateway: Arc<ScriptedGateway>, sandbox: Arc<ArithmeticSandbox>, dir: &TempDir) -> Solver {
    Solver::new(
        gateway,
        sandbox,
        SolutionCache::open(dir.path()).unwrap(),
        SolverSettings {
            repair_delay: Duration::ZERO,
            max_detailed_failures: 2,
        },
    )
}

fn attempts(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
}

#[tokio::test]
async fn repairs_then_solves_and_persists() {
    let dir = TempDir::new().unwrap();
    let gateway = ScriptedGateway::new(vec![Some(fenced(SUBTRACT)), Some(fenced(ADD))]);
    let sandbox = ArithmeticSandbox::new();
    let solver = solver(gateway.clone(), sandbox.clone(), &dir);
    let spec = add_two_numbers();

    let outcome = solver.solve(&spec, attempts(5)).await;

    assert_eq!(
        outcome,
        Outcome::Solved {
            final_code: ADD.to_string(),
            attempts_taken: 2,
            from_cache: false,
        }
    );
    assert_eq!(sandbox.calls(), 2);

    // The repair prompt names both failing tests and quotes the broken code
    let conversations = gateway.conversations();
    let repair = &conversations[1].last().unwrap().text;
    assert!(repair.contains("Test 1 FAILED"));
    assert!(repair.contains("Test 2 FAILED"));
    assert!(repair.contains(SUBTRACT));

    let record = solver.cache().get(&spec.fingerprint()).expect("record persisted");
    assert_eq!(record.final_code, ADD);
    assert_eq!(record.attempts_taken, 2);
    assert_eq!(record.test_cases, spec.test_cases);
}

#[tokio::test]
async fn second_solve_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let spec = add_two_numbers();

    let first = solver(ScriptedGateway::new(vec![Some(fenced(ADD))]), ArithmeticSandbox::new(), &dir);
    assert!(matches!(first.solve(&spec, attempts(3)).await, Outcome::Solved { .. }));

    let gateway = ScriptedGateway::new(vec![]);
    let sandbox = ArithmeticSandbox::new();
    let second = solver(gateway.clone(), sandbox.clone(), &dir);

    let outcome = second.solve(&spec, attempts(3)).await;

    assert_eq!(
        outcome,
        Outcome::Solved {
            final_code: ADD.to_string(),
            attempts_taken: 1,
            from_cache: true,
        }
    );
    assert_eq!(gateway.calls(), 0);
    assert_eq!(sandbox.calls(), 0);
}

#[tokio::test]
async fn single_attempt_budget_returns_failed() {
    let dir = TempDir::new().unwrap();
    let gateway = ScriptedGateway::new(vec![Some(fenced(SUBTRACT)), Some(fenced(ADD))]);
    let sandbox = ArithmeticSandbox::new();
    let solver = solver(gateway.clone(), sandbox.clone(), &dir);
    let spec = add_two_numbers();

    let outcome = solver.solve(&spec, attempts(1)).await;

    match outcome {
        Outcome::Failed {
            last_code,
            attempts_taken,
            last_report,
        } => {
            assert_eq!(last_code, SUBTRACT);
            assert_eq!(attempts_taken, 1);
            assert_eq!(last_report.failed_count(), 2);
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(gateway.calls(), 1);
    assert!(solver.cache().get(&spec.fingerprint()).is_none());
}

#[tokio::test]
async fn exhausted_gateway_aborts_without_running_code() {
    let dir = TempDir::new().unwrap();
    let gateway = ScriptedGateway::new(vec![None]);
    let sandbox = ArithmeticSandbox::new();
    let solver = solver(gateway.clone(), sandbox.clone(), &dir);

    let outcome = solver.solve(&add_two_numbers(), attempts(5)).await;

    assert_eq!(
        outcome,
        Outcome::GatewayError {
            reason: GatewayFailure::NoResponse
        }
    );
    assert_eq!(gateway.calls(), 1);
    assert_eq!(sandbox.calls(), 0);
}

#[tokio::test]
async fn reply_without_code_block_aborts() {
    let dir = TempDir::new().unwrap();
    let gateway = ScriptedGateway::new(vec![Some("I think you should add them.".to_string())]);
    let sandbox = ArithmeticSandbox::new();
    let solver = solver(gateway, sandbox.clone(), &dir);

    let outcome = solver.solve(&add_two_numbers(), attempts(5)).await;

    assert_eq!(
        outcome,
        Outcome::GatewayError {
            reason: GatewayFailure::NoCodeBlock
        }
    );
    assert_eq!(sandbox.calls(), 0);
}

#[tokio::test]
async fn setup_failures_feed_the_repair_loop() {
    let dir = TempDir::new().unwrap();
    let gateway = ScriptedGateway::new(vec![
        Some(fenced("def add(a, b):\n    return a + 0")),
        Some(fenced(ADD)),
    ]);
    let sandbox = ArithmeticSandbox::new();
    let solver = solver(gateway.clone(), sandbox, &dir);

    let outcome = solver.solve(&add_two_numbers(), attempts(3)).await;

    assert_eq!(outcome.attempts_taken(), Some(2));
    let conversations = gateway.conversations();
    let repair = &conversations[1].last().unwrap().text;
    assert!(repair.contains("Execution error (MissingEntryPoint)"));
}

#[tokio::test]
async fn conversation_window_stays_bounded() {
    let dir = TempDir::new().unwrap();
    let replies = (0..4).map(|_| Some(fenced(SUBTRACT))).collect();
    let gateway = ScriptedGateway::new(replies);
    let sandbox = ArithmeticSandbox::new();
    let solver = solver(gateway.clone(), sandbox, &dir);

    let outcome = solver.solve(&add_two_numbers(), attempts(4)).await;
    assert_eq!(outcome.attempts_taken(), Some(4));

    let conversations = gateway.conversations();
    assert_eq!(conversations[0].len(), 1);
    for conversation in &conversations[1..] {
        assert_eq!(conversation.len(), 3);
        let roles: Vec<Role> = conversation.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model, Role::User]);
    }
}

#[tokio::test]
async fn observer_sees_each_attempt() {
    let dir = TempDir::new().unwrap();
    let gateway = ScriptedGateway::new(vec![Some(fenced(SUBTRACT)), Some(fenced(ADD))]);
    let solver = solver(gateway, ArithmeticSandbox::new(), &dir);
    let seen = Mutex::new(Vec::new());

    solver
        .solve_observed(&add_two_numbers(), attempts(5), |n| seen.lock().unwrap().push(n))
        .await;

    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
}
