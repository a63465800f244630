//! SimpleOBS CLI: run a demo stream and inspect the component set.
//!
//! Usage:
//!   simpleobs run [OPTIONS]       Stream a color card and a tone
//!   simpleobs components          List registered component types
//!   simpleobs config [--write]    Show or write the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "simpleobs",
    about = "Minimal live audio/video compositing and streaming engine",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the standard location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the demo scene
    Run {
        /// How long to stream, in seconds (0 = until Ctrl+C)
        #[arg(short, long, default_value = "5")]
        duration: f64,

        /// Canvas width
        #[arg(long)]
        width: Option<u32>,

        /// Canvas height
        #[arg(long)]
        height: Option<u32>,

        /// Target FPS
        #[arg(long)]
        fps: Option<u32>,

        /// Write raw packets to this file instead of discarding them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List built-in component types
    Components,

    /// Print the effective configuration as JSON
    Config {
        /// Write the default configuration to the standard location
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => simpleobs_common::config::AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?,
        None => simpleobs_common::config::AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    simpleobs_common::logging::init_logging(&config.logging)?;

    match cli.command {
        Commands::Run {
            duration,
            width,
            height,
            fps,
            output,
        } => {
            if let Some(width) = width {
                config.video.width = width;
            }
            if let Some(height) = height {
                config.video.height = height;
            }
            if let Some(fps) = fps {
                config.video.fps = fps;
            }
            commands::run::run(config, duration, output).await
        }
        Commands::Components => commands::components::run(&config),
        Commands::Config { write } => commands::config::run(&config, write),
    }
}
