/// Solve Orchestrator - the generate → execute → repair loop
///
/// **Responsibility:**
/// Turn a challenge into a verified, cached solution (or a structured
/// failure) within a bounded number of attempts.
///
/// **Architecture:**
/// 1. Fingerprint + cache lookup (a hit spends no model or sandbox budget)
/// 2. Prompt builder → gateway → code extraction
/// 3. Sandbox run, judged by the evaluator
/// 4. Cache write on success, repair prompt on failure
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (engine's job)
/// - How outputs are compared (evaluator's job)
/// - How the provider is reached (gateway's job)

use crate::engine::Sandbox;
use crate::extract::extract_python_code;
use crate::gateway::ModelGateway;
use crate::prompt::{self, ConversationWindow, HISTORY_WINDOW};
use crate::summary::DEFAULT_MAX_DETAILED;
use autosolve_common::cache::SolutionCache;
use autosolve_common::config::SolverConfig;
use autosolve_common::types::{AttemptRecord, ChallengeSpec, GatewayFailure, Outcome};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Tunables of the loop itself
#[derive(Debug, Clone)]
pub struct SolverSettings {
    pub repair_delay: Duration,
    pub max_detailed_failures: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            repair_delay: Duration::from_secs(2),
            max_detailed_failures: DEFAULT_MAX_DETAILED,
        }
    }
}

impl From<&SolverConfig> for SolverSettings {
    fn from(config: &SolverConfig) -> Self {
        Self {
            repair_delay: Duration::from_millis(config.repair_delay_ms),
            max_detailed_failures: config.max_detailed_failures,
        }
    }
}

/// Owns the collaborators of one solve loop; cheap to clone and share across tasks
#[derive(Clone)]
pub struct Solver {
    gateway: Arc<dyn ModelGateway>,
    sandbox: Arc<dyn Sandbox>,
    cache: SolutionCache,
    settings: SolverSettings,
}

impl Solver {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        sandbox: Arc<dyn Sandbox>,
        cache: SolutionCache,
        settings: SolverSettings,
    ) -> Self {
        Self {
            gateway,
            sandbox,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &SolutionCache {
        &self.cache
    }

    pub async fn solve(&self, spec: &ChallengeSpec, max_attempts: NonZeroU32) -> Outcome {
        self.solve_observed(spec, max_attempts, |_| {}).await
    }

    /// Run the loop, calling `on_attempt` with the attempt number before each attempt
    #[instrument(
        skip(self, spec, on_attempt),
        fields(fingerprint = tracing::field::Empty, max_attempts = max_attempts.get())
    )]
    pub async fn solve_observed<F>(
        &self,
        spec: &ChallengeSpec,
        max_attempts: NonZeroU32,
        on_attempt: F,
    ) -> Outcome
    where
        F: Fn(u32) + Send + Sync,
    {
        let fingerprint = spec.fingerprint();
        tracing::Span::current().record("fingerprint", tracing::field::display(&fingerprint));

        if let Some(existing) = self.cache.get(&fingerprint) {
            info!(attempts_taken = existing.attempts_taken, "Challenge already solved; returning cached solution");
            return Outcome::Solved {
                final_code: existing.final_code,
                attempts_taken: existing.attempts_taken,
                from_cache: true,
            };
        }

        let max_attempts = max_attempts.get();
        let mut history = ConversationWindow::new(HISTORY_WINDOW);
        let mut last = AttemptRecord::default();

        info!(
            test_cases = spec.test_cases.len(),
            description_len = spec.description.len(),
            "Starting solve loop"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            on_attempt(attempt);

            let prompt = match (&last.generated_code, &last.execution_report) {
                (Some(code), Some(report)) => prompt::repair_prompt(
                    &spec.description,
                    code,
                    report,
                    self.settings.max_detailed_failures,
                ),
                _ => prompt::fresh_prompt(&spec.description, &spec.test_cases),
            };
            history.push_user(prompt);

            let Some(reply) = self.gateway.complete(&history.to_vec()).await else {
                error!(attempt, "No response from model provider; aborting");
                return Outcome::GatewayError {
                    reason: GatewayFailure::NoResponse,
                };
            };

            let Some(code) = extract_python_code(&reply) else {
                error!(attempt, reply_len = reply.len(), "No Python code block in model response; aborting");
                return Outcome::GatewayError {
                    reason: GatewayFailure::NoCodeBlock,
                };
            };
            history.push_model(reply);
            debug!(attempt, code_len = code.len(), "Extracted candidate");

            let start = Instant::now();
            let report = self.sandbox.execute(&code, &spec.test_cases).await;

            info!(
                attempt,
                success = report.success,
                failed_tests = report.failed_count(),
                exception_type = report.exception_type.as_deref().unwrap_or(""),
                execution_ms = start.elapsed().as_millis() as u64,
                "Attempt executed"
            );

            if report.success {
                if let Err(e) = self.cache.put(
                    &fingerprint,
                    &spec.description,
                    &spec.test_cases,
                    &code,
                    attempt,
                ) {
                    error!(error = %e, "Failed to persist solution; returning it uncached");
                }
                info!(attempts_taken = attempt, "Challenge solved");
                return Outcome::Solved {
                    final_code: code,
                    attempts_taken: attempt,
                    from_cache: false,
                };
            }

            if attempt >= max_attempts {
                warn!(max_attempts, "Max attempts reached; challenge unsolved");
                return Outcome::Failed {
                    last_code: code,
                    attempts_taken: attempt,
                    last_report: report,
                };
            }

            last = AttemptRecord {
                attempt_number: attempt,
                generated_code: Some(code),
                execution_report: Some(report),
            };

            if !self.settings.repair_delay.is_zero() {
                tokio::time::sleep(self.settings.repair_delay).await;
            }
        }
    }
}
