//! Fenced-block extraction from model replies.

use regex::Regex;
use std::sync::OnceLock;

fn python_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```python[ \t]*\r?\n(.*?)```").expect("valid regex"))
}

fn json_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json[ \t]*\r?\n(.*?)```").expect("valid regex"))
}

/// First ```` ```python ```` block, trimmed; `None` if absent or empty
pub fn extract_python_code(reply: &str) -> Option<String> {
    first_block(python_block(), reply)
}

/// First ```` ```json ```` block, trimmed; `None` if absent or empty
pub fn extract_json_block(reply: &str) -> Option<String> {
    first_block(json_block(), reply)
}

fn first_block(re: &Regex, reply: &str) -> Option<String> {
    re.captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
}
