/// Test Evaluator - Output Comparison and Report Assembly
///
/// **Core Responsibility:**
/// Turn the raw harness document into an `ExecutionReport` by comparing what
/// `solve` returned against each expected output.
///
/// **Critical Properties:**
/// - Knows nothing about Docker or subprocesses
/// - Knows nothing about the model or the solve loop
/// - Pure function: (harness output, test cases) → report
///
/// **Comparison Rules:**
/// - Both sides go through the same canonical JSON form and the strings are compared
/// - Object keys: sorted at every depth
/// - Integral floats within i64 range: rendered as integers (`3.0` == `3`)
/// - Integers: compared digit for digit at any size (`2**70` != `2**70 + 1`)
/// - Sequence order: significant (`[1,2]` != `[2,1]`)
/// - A test that raised never passes
///
/// **Why This Exists:**
/// Pass/fail is decided in one place, independently of how the code ran.

use autosolve_common::fingerprint::canonical_json;
use autosolve_common::types::{ExecutionReport, TestCase, TestResult};
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::debug;

pub const MISSING_ENTRY_POINT: &str = "MissingEntryPoint";
pub const HARNESS_ERROR: &str = "HarnessError";

/// Largest magnitude at which every integer is exactly representable as f64
const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Lifecycle stage the harness reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessStatus {
    Ok,
    LoadError,
    MissingEntryPoint,
    HarnessError,
}

/// Raw per-test output, produced by the harness and consumed here
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessTestOutput {
    pub test_number: u32,
    /// JSON text of the return value
    pub actual: Option<String>,
    pub error: Option<String>,
}

/// The single document the harness writes to stdout
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessOutput {
    pub status: HarnessStatus,
    pub error_message: Option<String>,
    pub exception_type: Option<String>,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub results: Vec<HarnessTestOutput>,
}

impl HarnessOutput {
    /// Parse harness stdout, tolerating stray lines before the final document
    pub fn parse(stdout: &str) -> Result<Self, serde_json::Error> {
        let trimmed = stdout.trim();
        serde_json::from_str(trimmed).or_else(|err| {
            match trimmed.lines().last() {
                Some(last) if last.len() != trimmed.len() => serde_json::from_str(last),
                _ => Err(err),
            }
        })
    }
}

/// Normalize a JSON value for comparison
pub fn canonicalize(value: &Value) -> Value {
    match value {
        // Integers keep their exact digits; only floats are re-rendered
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= EXACT_F64_INT => {
                Value::Number(Number::from(f as i64))
            }
            Some(f) => Number::from_f64(f).map_or_else(|| value.clone(), Value::Number),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Canonical serialized form used both for comparison and for reporting
pub fn canonical_form(value: &Value) -> String {
    canonical_json(&canonicalize(value))
}

pub fn outputs_match(actual: &Value, expected: &Value) -> bool {
    canonical_form(actual) == canonical_form(expected)
}

/// Evaluate a single test case against what the harness reported for it
pub fn evaluate_test(
    test_number: u32,
    test_case: &TestCase,
    output: Option<&HarnessTestOutput>,
) -> TestResult {
    let mut result = TestResult {
        test_number,
        input: test_case.input.clone(),
        expected_output: test_case.expected_output.clone(),
        actual_output: None,
        passed: false,
        error: None,
    };

    let Some(output) = output else {
        result.error = Some("No result reported for this test".to_string());
        return result;
    };

    if let Some(error) = &output.error {
        result.error = Some(error.clone());
        return result;
    }

    let parsed = output
        .actual
        .as_deref()
        .map(|raw| serde_json::from_str::<Value>(raw));
    match parsed {
        Some(Ok(actual)) => {
            result.passed = outputs_match(&actual, &test_case.expected_output);
            result.actual_output = Some(canonical_form(&actual));
        }
        Some(Err(e)) => {
            result.error = Some(format!("Unparseable return value: {}", e));
        }
        None => {
            result.error = Some("Return value missing from harness output".to_string());
        }
    }
    result
}

/// Assemble the final report for one sandbox run
pub fn evaluate(test_cases: &[TestCase], harness: HarnessOutput) -> ExecutionReport {
    match harness.status {
        HarnessStatus::Ok => {}
        HarnessStatus::LoadError => {
            return ExecutionReport::failure(
                harness.exception_type.unwrap_or_else(|| "Exception".to_string()),
                harness
                    .error_message
                    .unwrap_or_else(|| "Generated code failed to load".to_string()),
                harness.output,
            );
        }
        HarnessStatus::MissingEntryPoint => {
            return ExecutionReport::failure(
                MISSING_ENTRY_POINT,
                "No callable named 'solve' found in generated code",
                harness.output,
            );
        }
        HarnessStatus::HarnessError => {
            return ExecutionReport::failure(
                HARNESS_ERROR,
                format!(
                    "Harness could not start: {}",
                    harness.error_message.unwrap_or_default()
                ),
                harness.output,
            );
        }
    }

    let test_results: Vec<TestResult> = test_cases
        .iter()
        .enumerate()
        .map(|(idx, tc)| {
            let number = (idx + 1) as u32;
            let output = harness.results.iter().find(|o| o.test_number == number);
            let result = evaluate_test(number, tc, output);
            debug!(
                test_number = number,
                passed = result.passed,
                errored = result.error.is_some(),
                "Evaluated test"
            );
            result
        })
        .collect();

    ExecutionReport {
        success: test_results.iter().all(|r| r.passed),
        output: harness.output.trim().to_string(),
        error_message: None,
        exception_type: None,
        test_results,
    }
}
