//! Condensed failure summaries for repair prompts.
//!
//! Only the first few failing tests are rendered in full; the rest collapse
//! into one count line so prompt size stays bounded whatever the suite size.

use autosolve_common::types::TestResult;
use serde_json::Value;
use std::fmt::Write;

pub const DEFAULT_MAX_DETAILED: usize = 2;

pub const ALL_PASSED: &str = "All provided tests passed.";

fn render_input(input: &[Value]) -> String {
    Value::Array(input.to_vec()).to_string()
}

pub fn summarize(test_results: &[TestResult], max_detailed: usize) -> String {
    let failing: Vec<&TestResult> = test_results.iter().filter(|r| !r.passed).collect();
    if failing.is_empty() {
        return ALL_PASSED.to_string();
    }

    let mut out = String::new();
    for result in failing.iter().take(max_detailed) {
        let _ = writeln!(out, "Test {} FAILED:", result.test_number);
        let _ = writeln!(out, "  Input: {}", render_input(&result.input));
        let _ = writeln!(
            out,
            "  Expected: {}, Actual: {}",
            result.expected_output,
            result.actual_output.as_deref().unwrap_or("None")
        );
        if let Some(error) = &result.error {
            let _ = writeln!(out, "  Error: {}", error);
        }
    }

    let remaining = failing.len().saturating_sub(max_detailed);
    if remaining > 0 {
        let _ = writeln!(out, "... {} more tests failed.", remaining);
    }

    out.trim_end().to_string()
}
