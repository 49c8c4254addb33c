// HTTP route handlers for the AutoSolve API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use autosolve_common::types::{ChallengeSpec, SolvedChallenge, TestCase};
use autosolve_common::Fingerprint;
use autosolve_engine::parse_challenge;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::metrics;
use crate::AppState;

const CACHED_PREFIX: &str = "cached_";

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub description: Option<String>,
    pub test_cases: Option<Vec<TestCase>>,
    pub raw_input: Option<String>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub challenge_id: String,
    pub challenge_hash: String,
    pub status: &'static str,
    pub message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn cached_response(record: &SolvedChallenge) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "challenge_id": format!("{}{}", CACHED_PREFIX, record.fingerprint),
            "challenge_hash": record.fingerprint,
            "status": "solved",
            "message": "Challenge already solved and loaded from cache.",
            "solution": {
                "final_code": record.final_code,
                "attempts_taken": record.attempts_taken,
                "solved_timestamp": record.solved_timestamp,
            }
        })),
    )
        .into_response()
}

/// POST /submit_challenge - Submit a challenge for solving
pub async fn submit_challenge(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Response {
    let spec = match payload.raw_input.as_deref().filter(|raw| !raw.trim().is_empty()) {
        Some(raw) => {
            info!(raw_len = raw.len(), "Parsing free-text challenge");
            match parse_challenge(state.parser_gateway.as_ref(), raw).await {
                Ok(spec) => spec,
                Err(e) => {
                    warn!(error = %e, "Free-text challenge could not be parsed");
                    return error_response(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        format!("Failed to parse challenge input: {}", e),
                    );
                }
            }
        }
        None => match (payload.description, payload.test_cases) {
            (Some(description), Some(test_cases)) => ChallengeSpec::new(description, test_cases),
            _ => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "Missing 'description' or 'test_cases' in request (or provide 'raw_input')",
                );
            }
        },
    };

    let requested = payload
        .max_attempts
        .unwrap_or(state.default_max_attempts.get());
    let Some(max_attempts) = NonZeroU32::new(requested) else {
        return error_response(StatusCode::BAD_REQUEST, "'max_attempts' must be at least 1");
    };

    metrics::SUBMISSIONS.inc();
    let fingerprint = spec.fingerprint();

    if let Some(record) = state.solver.cache().get(&fingerprint) {
        metrics::CACHE_HITS.inc();
        info!(fingerprint = %fingerprint, "Submission served from cache");
        return cached_response(&record);
    }

    let run = state.registry.register(&spec, max_attempts.get());
    let challenge_id = run.challenge_id.clone();
    info!(
        challenge_id = %challenge_id,
        fingerprint = %fingerprint,
        test_cases = spec.test_cases.len(),
        max_attempts = max_attempts.get(),
        "Challenge queued"
    );

    spawn_solve(state.clone(), challenge_id.clone(), spec, max_attempts);

    (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            challenge_id,
            challenge_hash: fingerprint.to_string(),
            status: "processing",
            message: run.message,
        }),
    )
        .into_response()
}

/// Run the solve loop in its own task; a panic inside it marks the run as errored
fn spawn_solve(state: Arc<AppState>, challenge_id: String, spec: ChallengeSpec, max_attempts: NonZeroU32) {
    tokio::spawn(async move {
        let solver = state.solver.clone();
        let registry = state.registry.clone();
        let id = challenge_id.clone();

        let task = tokio::spawn(async move {
            solver
                .solve_observed(&spec, max_attempts, move |attempt| {
                    registry.record_attempt(&id, attempt)
                })
                .await
        });

        match task.await {
            Ok(outcome) => {
                info!(challenge_id = %challenge_id, status = outcome.status_label(), "Solve task finished");
                metrics::record_outcome(outcome.status_label());
                state.registry.complete(&challenge_id, outcome);
            }
            Err(e) => {
                error!(challenge_id = %challenge_id, error = %e, "Solve task aborted");
                metrics::record_outcome("error");
                state
                    .registry
                    .fail(&challenge_id, format!("Solver task failed: {}", e));
            }
        }
    });
}

/// GET /challenge_status/:challenge_id - Poll a submitted challenge
pub async fn challenge_status(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Response {
    if let Some(run) = state.registry.get(&challenge_id) {
        return (StatusCode::OK, Json(run)).into_response();
    }

    let cached = challenge_id
        .strip_prefix(CACHED_PREFIX)
        .and_then(Fingerprint::parse)
        .and_then(|fp| state.solver.cache().get(&fp));

    match cached {
        Some(record) => cached_response(&record),
        None => error_response(StatusCode::NOT_FOUND, "Challenge ID not found or expired."),
    }
}

/// GET /solved_challenges - Every persisted solution
pub async fn solved_challenges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.solver.cache().list())
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_endpoint() -> impl IntoResponse {
    metrics::render_metrics()
}
