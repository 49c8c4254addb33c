//! Free-text challenge parsing.
//!
//! Asks the model to restate a human-written challenge as
//! `{description, test_cases}` JSON. Each try sends a single-turn
//! conversation; replies that are missing, unparseable or lack either key
//! are retried with backoff.

use crate::extract::extract_json_block;
use crate::gateway::{ModelGateway, Role, Turn};
use crate::retry::RetryPolicy;
use autosolve_common::types::{ChallengeSpec, TestCase};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_PARSE_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("challenge input is empty")]
    EmptyInput,
    #[error("could not parse challenge input after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

#[derive(Debug, Deserialize)]
struct ParsedChallenge {
    description: Option<String>,
    test_cases: Option<Vec<TestCase>>,
}

const PARSE_INSTRUCTIONS: &str = "You are a helpful assistant designed to parse coding challenge descriptions into a structured JSON format. \
Output a JSON object with two top-level keys: 'description' (string) and 'test_cases' (array of objects). \
Each object in 'test_cases' has an 'input' key, which is ALWAYS an array of the positional arguments of the `solve` call \
(for `f(x)` the input `5` becomes `[5]`, for `f(x, y)` the inputs `1, 2` become `[1, 2]`), and an 'expected_output' key. \
Assume the solution language is Python.\n\
Output ONLY the JSON object, optionally inside a json markdown block, with no other text.\n\n\
Example:\n\
User Input:\n\
Problem: Write a function `add` that takes two numbers and returns their sum.\n\
Test cases:\n\
1. Input: 1, 2. Output: 3\n\
2. Input: -5, 10. Output: 5\n\n\
Your JSON output:\n\
```json\n\
{\"description\": \"Write a function `add` that takes two numbers and returns their sum.\", \
\"test_cases\": [{\"input\": [1, 2], \"expected_output\": 3}, {\"input\": [-5, 10], \"expected_output\": 5}]}\n\
```\n\n";

pub fn parse_prompt(raw_input: &str) -> String {
    format!(
        "{PARSE_INSTRUCTIONS}Now, parse the following user input:\n\
         [USER_CHALLENGE_INPUT_START]\n{raw_input}\n[USER_CHALLENGE_INPUT_END]\n\n\
         Your JSON output:"
    )
}

/// Decode one model reply into a challenge, or say why it is unusable
fn decode_reply(reply: &str) -> Result<ChallengeSpec, String> {
    let json = extract_json_block(reply).unwrap_or_else(|| reply.trim().to_string());
    let parsed: ParsedChallenge =
        serde_json::from_str(&json).map_err(|e| format!("invalid JSON: {}", e))?;
    match (parsed.description, parsed.test_cases) {
        (Some(description), Some(test_cases)) => Ok(ChallengeSpec::new(description, test_cases)),
        _ => Err("reply is missing 'description' or 'test_cases'".to_string()),
    }
}

pub struct ChallengeParser<'a> {
    gateway: &'a dyn ModelGateway,
    retry: RetryPolicy,
}

impl<'a> ChallengeParser<'a> {
    pub fn new(gateway: &'a dyn ModelGateway) -> Self {
        Self::with_retry(
            gateway,
            RetryPolicy::new(DEFAULT_PARSE_ATTEMPTS, Duration::from_secs(1)),
        )
    }

    pub fn with_retry(gateway: &'a dyn ModelGateway, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    pub async fn parse(&self, raw_input: &str) -> Result<ChallengeSpec, ParseError> {
        if raw_input.trim().is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let history = [Turn::new(Role::User, parse_prompt(raw_input))];
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts {
            match self.gateway.complete(&history).await {
                Some(reply) => match decode_reply(&reply) {
                    Ok(spec) => {
                        info!(attempt, test_cases = spec.test_cases.len(), "Parsed free-text challenge");
                        return Ok(spec);
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Unusable parse reply");
                        last_error = e;
                    }
                },
                None => {
                    warn!(attempt, "No response while parsing challenge input");
                    last_error = "no response from model provider".to_string();
                }
            }
            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.next_delay(attempt)).await;
            }
        }

        Err(ParseError::Exhausted {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }
}

/// Parse free text with the default three tries
pub async fn parse_challenge(
    gateway: &dyn ModelGateway,
    raw_input: &str,
) -> Result<ChallengeSpec, ParseError> {
    ChallengeParser::new(gateway).parse(raw_input).await
}
