mod handlers;
mod metrics;
mod registry;
mod routes;

use anyhow::{bail, Context, Result};
use autosolve_common::config::AppConfig;
use autosolve_common::SolutionCache;
use autosolve_engine::{build_sandbox, HttpGateway, ModelGateway, Solver, SolverSettings};
use axum::Router;
use registry::ChallengeRegistry;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub solver: Solver,
    /// One provider call per parse try; the parser runs its own retries
    pub parser_gateway: Arc<dyn ModelGateway>,
    pub registry: ChallengeRegistry,
    pub default_max_attempts: NonZeroU32,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("AutoSolve API booting...");

    let config = AppConfig::load_default()?;
    if config.llm.api_key.is_empty() {
        bail!("No model API key configured; set GEMINI_API_KEY or LLM_API_KEY");
    }

    let cache = SolutionCache::open(&config.cache_dir)
        .with_context(|| format!("Failed to open solution cache at {}", config.cache_dir.display()))?;
    info!(cache_dir = %config.cache_dir.display(), "Solution cache ready");

    let sandbox = build_sandbox(&config.sandbox).context("Failed to initialize sandbox")?;
    let gateway = Arc::new(HttpGateway::new(config.llm.clone())?);
    let parser_gateway: Arc<dyn ModelGateway> =
        Arc::new(HttpGateway::single_attempt(config.llm.clone())?);

    let solver = Solver::new(gateway, sandbox, cache, SolverSettings::from(&config.solver));
    let default_max_attempts = NonZeroU32::new(config.solver.default_max_attempts)
        .context("solver.default_max_attempts must be at least 1")?;

    let state = Arc::new(AppState {
        solver,
        parser_gateway,
        registry: ChallengeRegistry::new(),
        default_max_attempts,
    });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);
    info!("Ready to accept challenges");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
