// Application configuration shared by the API, the CLI and the engine
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/autosolve.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Local `python3` subprocess with the restricted harness
    Process,
    /// Throwaway Docker container per run
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub mode: SandboxMode,
    pub python_cmd: String,
    pub image: String,
    /// Wall-clock limit for one whole run (all test cases)
    pub timeout_ms: u64,
    pub memory_limit_mb: u32,
    pub cpu_limit: f32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::Process,
            python_cmd: "python3".to_string(),
            image: "python:3.12-slim".to_string(),
            timeout_ms: 10_000,
            memory_limit_mb: 256,
            cpu_limit: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google `generateContent` envelope
    Gemini,
    /// `/chat/completions` envelope
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_base: String,
    pub model: String,
    /// Never read from or written to the config file
    #[serde(skip)]
    pub api_key: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: String::new(),
            temperature: 0.7,
            max_output_tokens: 8192,
            max_retries: 5,
            base_delay_ms: 1000,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub default_max_attempts: u32,
    /// Pause between a failed attempt and the next repair prompt
    pub repair_delay_ms: u64,
    pub max_detailed_failures: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 5,
            repair_delay_ms: 2000,
            max_detailed_failures: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache_dir: PathBuf,
    pub bind_addr: String,
    pub sandbox: SandboxConfig,
    pub llm: LlmConfig,
    pub solver: SolverConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("solved_challenges"),
            bind_addr: "0.0.0.0:5000".to_string(),
            sandbox: SandboxConfig::default(),
            llm: LlmConfig::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Load from `AUTOSOLVE_CONFIG` or the default path, then apply env overrides
    ///
    /// A missing default file is fine (built-in defaults apply); a missing
    /// file explicitly named by `AUTOSOLVE_CONFIG` is an error.
    pub fn load_default() -> Result<Self> {
        let mut config = match std::env::var("AUTOSOLVE_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment-style overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("AUTOSOLVE_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("AUTOSOLVE_BIND") {
            self.bind_addr = addr;
        }
        if let Some(mode) = lookup("SANDBOX_MODE") {
            self.sandbox.mode = match mode.to_lowercase().as_str() {
                "process" => SandboxMode::Process,
                "docker" => SandboxMode::Docker,
                other => bail!("Invalid SANDBOX_MODE '{}': expected process or docker", other),
            };
        }
        if let Some(ms) = lookup("SANDBOX_TIMEOUT_MS") {
            self.sandbox.timeout_ms = ms
                .parse()
                .with_context(|| format!("Invalid SANDBOX_TIMEOUT_MS '{}'", ms))?;
        }
        if let Some(cmd) = lookup("PYTHON_CMD") {
            self.sandbox.python_cmd = cmd;
        }
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.llm.provider = match provider.to_lowercase().as_str() {
                "gemini" => LlmProvider::Gemini,
                "openai" => LlmProvider::OpenAi,
                other => bail!("Invalid LLM_PROVIDER '{}': expected gemini or openai", other),
            };
        }
        if let Some(base) = lookup("LLM_API_BASE") {
            self.llm.api_base = base;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = lookup("GEMINI_API_KEY").or_else(|| lookup("LLM_API_KEY")) {
            self.llm.api_key = key;
        }
        Ok(())
    }
}
