mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autosolve")]
#[command(about = "AutoSolve CLI - Solve, run and inspect coding challenges locally", long_about = None)]
struct Cli {
    /// Config file (defaults to $AUTOSOLVE_CONFIG or config/autosolve.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full generate/execute/repair loop for a challenge file
    Solve {
        /// Challenge JSON: {"description": ..., "test_cases": [...]}
        #[arg(short, long)]
        file: PathBuf,

        /// Attempt budget (defaults to solver.default_max_attempts)
        #[arg(short, long)]
        max_attempts: Option<u32>,
    },

    /// Execute a solution file against a challenge's test cases
    Run {
        /// Challenge JSON
        #[arg(short, long)]
        file: PathBuf,

        /// Python source defining `solve`
        #[arg(long)]
        code: PathBuf,
    },

    /// Print the fingerprint of a challenge file
    Fingerprint {
        /// Challenge JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List cached solutions
    List,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Solve { file, max_attempts } => {
            commands::solve(&config, &file, max_attempts).await?;
        }
        Commands::Run { file, code } => {
            commands::run(&config, &file, &code).await?;
        }
        Commands::Fingerprint { file } => {
            commands::fingerprint(&file)?;
        }
        Commands::List => {
            commands::list(&config)?;
        }
    }

    Ok(())
}
