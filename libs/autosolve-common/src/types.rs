use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fingerprint::Fingerprint;

/// Language tag of the only supported execution target
pub const TARGET_LANGUAGE: &str = "python";

/// One example the candidate must reproduce.
///
/// `input` is unpacked into positional arguments of `solve`, so its order
/// matters. Values are arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Vec<Value>,
    pub expected_output: Value,
}

/// A challenge as submitted: free-text description plus examples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSpec {
    pub description: String,
    pub test_cases: Vec<TestCase>,
}

impl ChallengeSpec {
    pub fn new(description: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self {
            description: description.into(),
            test_cases,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.description, &self.test_cases)
    }
}

/// Outcome of a single test case inside one sandbox run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// 1-based position in the submitted test list
    pub test_number: u32,
    pub input: Vec<Value>,
    pub expected_output: Value,
    /// Canonical JSON of the value `solve` returned, absent if it raised
    pub actual_output: Option<String>,
    pub passed: bool,
    pub error: Option<String>,
}

/// Structured result of running one candidate against all test cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    /// Captured `print` output of the candidate, trimmed
    pub output: String,
    /// Setup-level failure (harness, entry point, timeout), distinct from per-test errors
    pub error_message: Option<String>,
    pub exception_type: Option<String>,
    pub test_results: Vec<TestResult>,
}

impl ExecutionReport {
    /// Report for a run that never reached the test cases
    pub fn failure(
        exception_type: impl Into<String>,
        error_message: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            output: output.into(),
            error_message: Some(error_message.into()),
            exception_type: Some(exception_type.into()),
            test_results: Vec::new(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.test_results.iter().filter(|r| !r.passed).count()
    }
}

/// Bookkeeping for one generate/execute iteration of the solve loop
#[derive(Debug, Clone, Default)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub generated_code: Option<String>,
    pub execution_report: Option<ExecutionReport>,
}

/// Persisted record of the first verified solution for a fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvedChallenge {
    pub fingerprint: Fingerprint,
    pub challenge_description: String,
    pub test_cases: Vec<TestCase>,
    pub final_code: String,
    pub attempts_taken: u32,
    pub solved_timestamp: DateTime<Utc>,
}

/// Why the loop stopped without ever reaching the sandbox for an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum GatewayFailure {
    #[error("Failed to get a response from the model provider")]
    NoResponse,
    #[error("No valid Python code block found in the model response")]
    NoCodeBlock,
}

/// Final result of a solve loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Solved {
        final_code: String,
        attempts_taken: u32,
        from_cache: bool,
    },
    Failed {
        last_code: String,
        attempts_taken: u32,
        last_report: ExecutionReport,
    },
    #[serde(rename = "error")]
    GatewayError { reason: GatewayFailure },
}

impl Outcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            Outcome::Solved { .. } => "solved",
            Outcome::Failed { .. } => "failed",
            Outcome::GatewayError { .. } => "error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Outcome::Solved { from_cache: true, .. } => {
                "Challenge already solved, loaded from cache.".to_string()
            }
            Outcome::Solved { .. } => "Challenge successfully solved.".to_string(),
            Outcome::Failed { .. } => {
                "Challenge could not be solved within max attempts.".to_string()
            }
            Outcome::GatewayError { reason } => reason.to_string(),
        }
    }

    pub fn attempts_taken(&self) -> Option<u32> {
        match self {
            Outcome::Solved { attempts_taken, .. } | Outcome::Failed { attempts_taken, .. } => {
                Some(*attempts_taken)
            }
            Outcome::GatewayError { .. } => None,
        }
    }
}
