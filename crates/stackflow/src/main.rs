mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackflow")]
#[command(about = "Synthesize multi-region deployment plans from deploy.kdl", long_about = None)]
struct Cli {
    /// Directory to search for deploy.kdl (defaults to the current directory)
    #[arg(short = 'C', long = "project-dir", env = "STACKFLOW_PROJECT_DIR", global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the deployment plan and write it to disk
    Synth {
        /// Write plan.json into this directory instead of .stackflow/
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check the description and environment without writing anything
    Validate,
    /// Print the rendered user-data script of the backend instance
    Script,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries plans and scripts, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Synth { out } => commands::synth::handle(&dir, out.as_deref()).await,
        Commands::Validate => commands::validate::handle(&dir),
        Commands::Script => commands::script::handle(&dir),
        Commands::Version => unreachable!("Version is handled before loading"),
    }
}
