// In-memory record of submitted challenges, polled by id

use autosolve_common::types::{ChallengeSpec, Outcome, TestCase};
use autosolve_common::Fingerprint;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Submitted,
    Processing,
    Solved,
    Failed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Solved | RunStatus::Failed | RunStatus::Error)
    }
}

impl From<&Outcome> for RunStatus {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Solved { .. } => RunStatus::Solved,
            Outcome::Failed { .. } => RunStatus::Failed,
            Outcome::GatewayError { .. } => RunStatus::Error,
        }
    }
}

/// One submitted challenge and wherever its solve loop has got to
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeRun {
    pub challenge_id: String,
    pub challenge_hash: Fingerprint,
    pub description: String,
    pub test_cases: Vec<TestCase>,
    pub max_attempts: u32,
    pub status: RunStatus,
    pub attempts_made: u32,
    pub message: String,
    pub result: Option<Outcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shared run table; clones refer to the same table
#[derive(Clone, Default)]
pub struct ChallengeRegistry {
    runs: Arc<RwLock<HashMap<String, ChallengeRun>>>,
}

impl ChallengeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: &ChallengeSpec, max_attempts: u32) -> ChallengeRun {
        let now = Utc::now();
        let run = ChallengeRun {
            challenge_id: Uuid::new_v4().to_string(),
            challenge_hash: spec.fingerprint(),
            description: spec.description.clone(),
            test_cases: spec.test_cases.clone(),
            max_attempts,
            status: RunStatus::Submitted,
            attempts_made: 0,
            message: "Challenge submitted for processing. Use /challenge_status to check."
                .to_string(),
            result: None,
            created_at: now,
            updated_at: now,
        };
        self.runs.write().insert(run.challenge_id.clone(), run.clone());
        debug!(challenge_id = %run.challenge_id, "Challenge registered");
        run
    }

    pub fn get(&self, challenge_id: &str) -> Option<ChallengeRun> {
        self.runs.read().get(challenge_id).cloned()
    }

    /// Record that `attempt` has started; ignored once the run is terminal
    pub fn record_attempt(&self, challenge_id: &str, attempt: u32) {
        self.update(challenge_id, |run| {
            run.status = RunStatus::Processing;
            run.attempts_made = attempt;
        });
    }

    pub fn complete(&self, challenge_id: &str, outcome: Outcome) {
        self.update(challenge_id, |run| {
            run.status = RunStatus::from(&outcome);
            if let Some(attempts) = outcome.attempts_taken() {
                run.attempts_made = attempts;
            }
            run.message = outcome.message();
            run.result = Some(outcome);
        });
    }

    /// Mark a run as errored for reasons outside the solve loop (e.g. a panicked task)
    pub fn fail(&self, challenge_id: &str, message: impl Into<String>) {
        let message = message.into();
        self.update(challenge_id, |run| {
            run.status = RunStatus::Error;
            run.message = message;
        });
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    fn update(&self, challenge_id: &str, apply: impl FnOnce(&mut ChallengeRun)) {
        let mut runs = self.runs.write();
        if let Some(run) = runs.get_mut(challenge_id) {
            if run.status.is_terminal() {
                return;
            }
            apply(run);
            run.updated_at = Utc::now();
        }
    }
}
