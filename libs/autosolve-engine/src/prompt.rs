//! Prompt construction and the bounded conversation window.

use crate::gateway::{Role, Turn};
use crate::summary;
use autosolve_common::types::{ExecutionReport, TestCase};
use std::collections::VecDeque;

/// Turns kept in the window: the latest user/model exchange plus the current prompt
pub const HISTORY_WINDOW: usize = 3;

/// How much of the description the repair prompt repeats
const REPAIR_DESCRIPTION_CHARS: usize = 100;

const FORMAT_RULES: &str = "Provide minimal and only necessary comments. Do NOT include extensive docstrings or block comments.\n";

/// Conversation history that retains only the most recent `capacity` turns
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ConversationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Turn::new(Role::User, text));
    }

    pub fn push_model(&mut self, text: impl Into<String>) {
        self.push(Turn::new(Role::Model, text));
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Contiguous snapshot in chronological order
    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

impl Default for ConversationWindow {
    fn default() -> Self {
        Self::new(HISTORY_WINDOW)
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Prompt for the first attempt at a challenge
pub fn fresh_prompt(description: &str, test_cases: &[TestCase]) -> String {
    let examples = serde_json::to_string_pretty(test_cases).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are an AI programming assistant. Your task is to write a Python function.\n\
         Problem: {description}\n\
         Write a Python function named `solve` that correctly implements the solution. \
         Its positional parameters must match the `input` array of each test case, in order, \
         and it must return the value shown as `expected_output`.\n\
         {FORMAT_RULES}\
         Here are example test cases with their inputs and expected outputs to guide you:\n\
         {examples}\n\
         Provide ONLY the Python code block (including imports if any) within a python markdown block. \
         Do NOT include any conversational text before or after the code block."
    )
}

/// Prompt asking the model to fix its previous attempt
pub fn repair_prompt(
    description: &str,
    previous_code: &str,
    report: &ExecutionReport,
    max_detailed: usize,
) -> String {
    let mut failures = String::new();
    if let Some(message) = &report.error_message {
        let kind = report.exception_type.as_deref().unwrap_or("Error");
        failures.push_str(&format!("Execution error ({}): {}\n", kind, message));
    }
    if !report.test_results.is_empty() || report.error_message.is_none() {
        failures.push_str(&summary::summarize(&report.test_results, max_detailed));
        failures.push('\n');
    }

    format!(
        "Your previous Python code for the problem: '{}...' failed some tests.\n\
         Here is the failed code:\n\
         ```python\n{}\n```\n\
         The following tests failed (or errors occurred):\n\
         {}\
         Carefully review the problem, the failed code, and the test results. \
         Identify the bugs and provide the corrected Python function `solve`.\n\
         {}\
         Provide ONLY the corrected Python code block (including imports if any) within a python markdown block. \
         Do NOT include any conversational text before or after the code block.",
        truncate_chars(description, REPAIR_DESCRIPTION_CHARS),
        previous_code,
        failures,
        FORMAT_RULES,
    )
}
