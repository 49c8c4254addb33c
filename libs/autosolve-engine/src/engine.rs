/// Execution Engine - Sandboxed Runs of Candidate Code
///
/// **Core Responsibility:**
/// Run one candidate against a list of test vectors and hand the raw
/// harness document to the evaluator.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local subprocess or Docker container)
/// - Engine does NOT decide pass/fail (evaluator's job)
/// - Engine never panics or errors out: every failure becomes a report
///
/// **Isolation Guarantees (both backends):**
/// - Fresh interpreter per run; nothing survives between runs
/// - Restricted builtins and import allow-list inside the harness
/// - Hard wall-clock timeout, process/container killed on expiry
/// - Staging artifacts (temp dir or container) removed on every path
/// - Unique artifact names per run so concurrent calls need no lock

use crate::evaluator::{self, HarnessOutput};
use async_trait::async_trait;
use autosolve_common::config::{SandboxConfig, SandboxMode};
use autosolve_common::types::{ExecutionReport, TestCase};
use base64::{engine::general_purpose, Engine as _};
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// The harness script shared by both backends
pub const HARNESS_SOURCE: &str = include_str!("../harness/runner.py");

/// Safety limits to prevent pathological inputs from reaching the runtime
const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB
/// Per-variable cap for the Docker backend; the kernel rejects any single
/// env string over 128KiB at exec time
const MAX_DOCKER_ENV_BYTES: usize = 100 * 1024;

const SOLUTION_FILE: &str = "solution.py";
const TESTS_FILE: &str = "test_cases.json";
const HARNESS_FILE: &str = "runner.py";

/// Setup-level failure classes, reported through `exception_type`
#[derive(Debug, thiserror::Error)]
pub enum SandboxFailure {
    #[error("Execution environment unavailable: {0}")]
    EnvironmentUnavailable(String),
    #[error("Harness output was not a valid report: {0}")]
    HarnessError(String),
    #[error("Execution exceeded the {0}ms wall-clock limit")]
    Timeout(u64),
    #[error("{0}")]
    InvalidInput(String),
}

impl SandboxFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxFailure::EnvironmentUnavailable(_) => "EnvironmentUnavailable",
            SandboxFailure::HarnessError(_) => evaluator::HARNESS_ERROR,
            SandboxFailure::Timeout(_) => "Timeout",
            SandboxFailure::InvalidInput(_) => "ValueError",
        }
    }

    pub fn into_report(self, output: impl Into<String>) -> ExecutionReport {
        ExecutionReport::failure(self.kind(), self.to_string(), output)
    }
}

/// Anything that can run candidate code against test vectors
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(&self, code: &str, test_cases: &[TestCase]) -> ExecutionReport;
}

/// Build the backend selected by configuration
pub fn build_sandbox(config: &SandboxConfig) -> anyhow::Result<Arc<dyn Sandbox>> {
    match config.mode {
        SandboxMode::Process => Ok(Arc::new(ProcessEngine::new(config.clone()))),
        SandboxMode::Docker => Ok(Arc::new(DockerEngine::new(config.clone())?)),
    }
}

/// Shared input validation and serialization of the test vectors
fn stage_inputs(code: &str, test_cases: &[TestCase]) -> Result<String, SandboxFailure> {
    if code.len() > MAX_SOURCE_CODE_BYTES {
        return Err(SandboxFailure::InvalidInput(format!(
            "Source code exceeds maximum size of {} bytes",
            MAX_SOURCE_CODE_BYTES
        )));
    }
    let tests_json = serde_json::to_string(test_cases)
        .map_err(|e| SandboxFailure::InvalidInput(format!("Unserializable test cases: {}", e)))?;
    if tests_json.len() > MAX_TEST_INPUT_BYTES {
        return Err(SandboxFailure::InvalidInput(format!(
            "Test input exceeds maximum size of {} bytes",
            MAX_TEST_INPUT_BYTES
        )));
    }
    Ok(tests_json)
}

/// Base64 env vars carrying the candidate and tests into the container
fn docker_env(code: &str, tests_json: &str) -> Result<Vec<String>, SandboxFailure> {
    let source_b64 = general_purpose::STANDARD.encode(code);
    let tests_b64 = general_purpose::STANDARD.encode(tests_json);
    if source_b64.len().max(tests_b64.len()) > MAX_DOCKER_ENV_BYTES {
        return Err(SandboxFailure::InvalidInput(format!(
            "Encoded source or tests exceed the Docker backend limit of {} bytes",
            MAX_DOCKER_ENV_BYTES
        )));
    }
    Ok(vec![
        format!("AUTOSOLVE_SOURCE_B64={}", source_b64),
        format!("AUTOSOLVE_TESTS_B64={}", tests_b64),
    ])
}

/// Parse harness stdout and let the evaluator judge it
fn judge(stdout: &str, stderr: &str, test_cases: &[TestCase]) -> ExecutionReport {
    match HarnessOutput::parse(stdout) {
        Ok(harness) => evaluator::evaluate(test_cases, harness),
        Err(e) => {
            let detail = match stderr.trim() {
                "" => e.to_string(),
                err => format!("{} (stderr: {})", e, err.lines().last().unwrap_or(err)),
            };
            SandboxFailure::HarnessError(detail).into_report(stdout.trim())
        }
    }
}

/// Local-process backend
///
/// Runs the harness under the configured interpreter with a cleared
/// environment, closed stdin and `kill_on_drop`, so a timed-out child is
/// SIGKILLed as soon as its handle is dropped.
pub struct ProcessEngine {
    config: SandboxConfig,
}

impl ProcessEngine {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    async fn run(&self, code: &str, test_cases: &[TestCase]) -> Result<ExecutionReport, SandboxFailure> {
        let tests_json = stage_inputs(code, test_cases)?;

        // Removed on drop, on every return path below
        let staging = tempfile::Builder::new()
            .prefix(&format!("autosolve-run-{}-", uuid::Uuid::new_v4()))
            .tempdir()
            .map_err(|e| SandboxFailure::EnvironmentUnavailable(format!("temp dir: {}", e)))?;

        for (name, contents) in [
            (SOLUTION_FILE, code),
            (TESTS_FILE, tests_json.as_str()),
            (HARNESS_FILE, HARNESS_SOURCE),
        ] {
            tokio::fs::write(staging.path().join(name), contents)
                .await
                .map_err(|e| SandboxFailure::EnvironmentUnavailable(format!("staging {}: {}", name, e)))?;
        }

        let path_env = std::env::var("PATH")
            .unwrap_or_else(|_| "/usr/bin:/usr/local/bin:/bin".to_string());

        let child = Command::new(&self.config.python_cmd)
            .arg("-I")
            .arg(HARNESS_FILE)
            .arg(SOLUTION_FILE)
            .arg(TESTS_FILE)
            .current_dir(staging.path())
            .env_clear()
            .env("PATH", &path_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandboxFailure::EnvironmentUnavailable(format!(
                    "failed to start '{}': {}",
                    self.config.python_cmd, e
                ))
            })?;

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(SandboxFailure::EnvironmentUnavailable(format!(
                    "failed to collect interpreter output: {}",
                    e
                )))
            }
            Err(_) => return Err(SandboxFailure::Timeout(self.config.timeout_ms)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            debug!(exit_code = ?output.status.code(), "Harness exited non-zero");
        }
        Ok(judge(&stdout, &stderr, test_cases))
    }
}

#[async_trait]
impl Sandbox for ProcessEngine {
    #[instrument(skip_all, fields(backend = "process", tests = test_cases.len()))]
    async fn execute(&self, code: &str, test_cases: &[TestCase]) -> ExecutionReport {
        let start = Instant::now();
        let report = self
            .run(code, test_cases)
            .await
            .unwrap_or_else(|failure| {
                warn!(kind = failure.kind(), error = %failure, "Sandbox run failed before evaluation");
                failure.into_report("")
            });
        debug!(
            success = report.success,
            execution_ms = start.elapsed().as_millis() as u64,
            "Process sandbox run finished"
        );
        report
    }
}

/// Container cleanup guard - guarantees container removal on drop
/// This ensures containers are cleaned up even if execution panics or is cancelled
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Cannot await in Drop; hand removal to the runtime
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container_id = %container_id, error = %e, "Failed to cleanup container");
            }
        });
    }
}

/// Docker-based backend
///
/// **Docker Execution Rules:**
/// 1. Pulls the configured Python image if not present
/// 2. Creates a container with network disabled and CPU/memory limits
/// 3. Injects source and tests as base64 env vars, harness via `python -c`
/// 4. Collects stdout/stderr; the timeout covers pull, create, start and wait
/// 5. Removes the container through `ContainerGuard`, force-killing it if
///    the run was cut short
pub struct DockerEngine {
    docker: Docker,
    config: SandboxConfig,
}

impl DockerEngine {
    pub fn new(config: SandboxConfig) -> anyhow::Result<Self> {
        use anyhow::Context;
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self::with_client(docker, config))
    }

    pub fn with_client(docker: Docker, config: SandboxConfig) -> Self {
        Self { docker, config }
    }

    /// Ensure Docker image is available (pull if needed)
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxFailure> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image, "Image cache hit");
            return Ok(());
        }

        warn!(image, "Image cache miss (pulling now)");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| {
                SandboxFailure::EnvironmentUnavailable(format!("failed to pull image '{}': {}", image, e))
            })?;
        }

        info!(image, "Image pulled successfully");
        Ok(())
    }

    async fn run(&self, code: &str, test_cases: &[TestCase]) -> Result<ExecutionReport, SandboxFailure> {
        let tests_json = stage_inputs(code, test_cases)?;
        let env = docker_env(code, &tests_json)?;

        // Dropping the in-flight future drops the guard, which force-removes
        // (and so kills) the container
        let timeout = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(timeout, self.run_container(env)).await {
            Ok(result) => {
                let (stdout, mut stderr, exit_code) = result?;
                if exit_code == Some(137) {
                    stderr.push_str("\n[Container killed: likely OOM or exceeded memory limit]");
                }
                debug!(?exit_code, "Container finished");
                Ok(judge(&stdout, &stderr, test_cases))
            }
            Err(_) => Err(SandboxFailure::Timeout(self.config.timeout_ms)),
        }
    }

    /// Pull, create, start and drain one container
    async fn run_container(
        &self,
        env: Vec<String>,
    ) -> Result<(String, String, Option<i64>), SandboxFailure> {
        let image = self.config.image.clone();
        let container_name = format!("autosolve-{}", uuid::Uuid::new_v4());

        self.ensure_image(&image).await?;

        let config = Config {
            image: Some(image.clone()),
            cmd: Some(vec![
                "python".to_string(),
                "-I".to_string(),
                "-c".to_string(),
                HARNESS_SOURCE.to_string(),
            ]),
            env: Some(env),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(i64::from(self.config.memory_limit_mb) * 1024 * 1024),
                nano_cpus: Some((self.config.cpu_limit * 1_000_000_000.0) as i64),
                readonly_rootfs: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let container = self
            .docker
            .create_container(Some(create_options), config)
            .await
            .map_err(|e| SandboxFailure::EnvironmentUnavailable(format!("container create: {}", e)))?;

        let container_id = container.id.clone();
        let _guard = ContainerGuard {
            docker: self.docker.clone(),
            container_id: container_id.clone(),
        };

        self.docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxFailure::EnvironmentUnavailable(format!("container start: {}", e)))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        let logs_options = Some(LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        });

        let mut logs_stream = self.docker.logs(&container_id, logs_options);
        while let Some(output) = logs_stream.next().await {
            match output {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Err(e) => {
                    warn!(error = %e, "Error reading container logs");
                    break;
                }
                _ => {}
            }
        }

        let wait_options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut wait_stream = self.docker.wait_container(&container_id, Some(wait_options));
        let exit_code = match wait_stream.next().await {
            Some(Ok(response)) => Some(response.status_code),
            _ => None,
        };

        Ok((stdout, stderr, exit_code))
    }
}

#[async_trait]
impl Sandbox for DockerEngine {
    #[instrument(skip_all, fields(backend = "docker", tests = test_cases.len()))]
    async fn execute(&self, code: &str, test_cases: &[TestCase]) -> ExecutionReport {
        let start = Instant::now();
        let report = self
            .run(code, test_cases)
            .await
            .unwrap_or_else(|failure| {
                warn!(kind = failure.kind(), error = %failure, "Sandbox run failed before evaluation");
                failure.into_report("")
            });
        debug!(
            success = report.success,
            execution_ms = start.elapsed().as_millis() as u64,
            "Docker sandbox run finished"
        );
        report
    }
}
