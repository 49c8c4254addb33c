// CLI commands for solving and inspecting challenges
use anyhow::{bail, Context, Result};
use autosolve_common::config::AppConfig;
use autosolve_common::types::{ChallengeSpec, ExecutionReport, Outcome, SolvedChallenge};
use autosolve_common::SolutionCache;
use autosolve_engine::summary::summarize;
use autosolve_engine::{build_sandbox, HttpGateway, Solver, SolverSettings};
use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

/// Load config from an explicit path, or fall back to the default lookup
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load(path)?;
            config.apply_overrides(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => AppConfig::load_default(),
    }
}

/// Read a challenge file
fn load_challenge(path: &Path) -> Result<ChallengeSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let spec: ChallengeSpec = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a challenge (need description and test_cases)", path.display()))?;
    if spec.test_cases.is_empty() {
        bail!("{} has no test cases", path.display());
    }
    Ok(spec)
}

pub async fn solve(config: &AppConfig, file: &Path, max_attempts: Option<u32>) -> Result<()> {
    let spec = load_challenge(file)?;
    let requested = max_attempts.unwrap_or(config.solver.default_max_attempts);
    let Some(max_attempts) = NonZeroU32::new(requested) else {
        bail!("--max-attempts must be at least 1");
    };
    if config.llm.api_key.is_empty() {
        bail!("No model API key configured; set GEMINI_API_KEY or LLM_API_KEY");
    }

    let cache = SolutionCache::open(&config.cache_dir)?;
    let sandbox = build_sandbox(&config.sandbox)?;
    let gateway = Arc::new(HttpGateway::new(config.llm.clone())?);
    let solver = Solver::new(gateway, sandbox, cache, SolverSettings::from(&config.solver));

    println!("🚀 Solving challenge {}", spec.fingerprint());
    let outcome = solver
        .solve_observed(&spec, max_attempts, |attempt| {
            println!("  attempt {}/{}", attempt, max_attempts)
        })
        .await;

    print_outcome(&outcome, config.solver.max_detailed_failures);
    match outcome {
        Outcome::Solved { .. } => Ok(()),
        other => bail!("{}", other.message()),
    }
}

fn print_outcome(outcome: &Outcome, max_detailed: usize) {
    match outcome {
        Outcome::Solved {
            final_code,
            attempts_taken,
            from_cache,
        } => {
            let source = if *from_cache { " (from cache)" } else { "" };
            println!("✅ Solved in {} attempt(s){}\n", attempts_taken, source);
            println!("{}", final_code);
        }
        Outcome::Failed {
            last_code,
            attempts_taken,
            last_report,
        } => {
            println!("❌ Unsolved after {} attempt(s). Last candidate:\n", attempts_taken);
            println!("{}\n", last_code);
            print_report(last_report, max_detailed);
        }
        Outcome::GatewayError { reason } => {
            println!("⚠️  Model error: {}", reason);
        }
    }
}

fn print_report(report: &ExecutionReport, max_detailed: usize) {
    if let Some(message) = &report.error_message {
        println!(
            "Execution error ({}): {}",
            report.exception_type.as_deref().unwrap_or("Error"),
            message
        );
    }
    if !report.test_results.is_empty() {
        let passed = report.test_results.len() - report.failed_count();
        println!("{}/{} tests passed", passed, report.test_results.len());
        println!("{}", summarize(&report.test_results, max_detailed));
    }
    if !report.output.is_empty() {
        println!("--- captured output ---\n{}", report.output);
    }
}

pub async fn run(config: &AppConfig, file: &Path, code: &Path) -> Result<()> {
    let spec = load_challenge(file)?;
    let source = fs::read_to_string(code)
        .with_context(|| format!("Failed to read {}", code.display()))?;

    let sandbox = build_sandbox(&config.sandbox)?;
    let report = sandbox.execute(&source, &spec.test_cases).await;

    print_report(&report, usize::MAX);
    if report.success {
        println!("✅ All tests passed");
        Ok(())
    } else {
        bail!("candidate failed")
    }
}

pub fn fingerprint(file: &Path) -> Result<()> {
    let spec = load_challenge(file)?;
    println!("{}", spec.fingerprint());
    Ok(())
}

pub fn list(config: &AppConfig) -> Result<()> {
    let cache = SolutionCache::open(&config.cache_dir)?;
    let records = cache.list();
    if records.is_empty() {
        println!("No cached solutions in {}", cache.dir().display());
        return Ok(());
    }

    println!("{:<16}  {:>8}  {:<20}  DESCRIPTION", "FINGERPRINT", "ATTEMPTS", "SOLVED");
    for record in &records {
        println!("{}", format_row(record));
    }
    Ok(())
}

fn format_row(record: &SolvedChallenge) -> String {
    let description: String = record
        .challenge_description
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(50)
        .collect();
    let short_fp: String = record.fingerprint.as_str().chars().take(16).collect();
    format!(
        "{:<16}  {:>8}  {:<20}  {}",
        short_fp,
        record.attempts_taken,
        record.solved_timestamp.format("%Y-%m-%d %H:%M:%S"),
        description
    )
}
