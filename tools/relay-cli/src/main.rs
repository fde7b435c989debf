//! FrameRelay CLI - Headless host and mapping inspector
//!
//! # Commands
//!
//! - `framerelay run` - Render a test pattern and publish it every tick
//! - `framerelay inspect` - Summarize the contents of a published mapping
//!
//! # Usage
//!
//! ```bash
//! # Publish 1280x720 frames at 60 fps until Ctrl+C
//! framerelay run --resolution 1280x720
//!
//! # Only publish while process 4242 is alive
//! framerelay run --target-pid 4242 --label arena
//!
//! # In another terminal, look at what is being published
//! framerelay inspect --resolution 1280x720
//! ```
//!
//! Set `RUST_LOG=debug` for per-resource logging.

mod inspect;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// FrameRelay CLI - Headless host and mapping inspector
#[derive(Parser)]
#[command(name = "framerelay")]
#[command(about = "Publish rendered frames into a named shared mapping")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a test pattern and publish it every tick
    Run(run::RunArgs),

    /// Summarize the contents of a published mapping
    Inspect(inspect::InspectArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run::execute(args),
        Commands::Inspect(args) => inspect::execute(args),
    }
}
