use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::{TestCase, TARGET_LANGUAGE};

/// Content hash identifying a challenge
///
/// Derived from the description, the canonical JSON of the test cases and
/// the target language tag. Two submissions that differ only in JSON key
/// order or whitespace share a fingerprint and therefore a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint(String);

const HEX_LEN: usize = 64;

impl Fingerprint {
    pub fn of(description: &str, test_cases: &[TestCase]) -> Self {
        let cases: Vec<Value> = test_cases
            .iter()
            .map(|tc| {
                let mut obj = Map::new();
                obj.insert("expected_output".to_string(), tc.expected_output.clone());
                obj.insert("input".to_string(), Value::Array(tc.input.clone()));
                Value::Object(obj)
            })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(description.as_bytes());
        hasher.update(canonical_json(&Value::Array(cases)).as_bytes());
        hasher.update(TARGET_LANGUAGE.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Accept only well-formed digests so a fingerprint is always a safe file stem
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("malformed fingerprint '{}'", value))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize with object keys sorted at every depth and no insignificant whitespace
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
