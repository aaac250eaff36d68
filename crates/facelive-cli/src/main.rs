use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod analyze;
mod replay;

#[derive(Parser)]
#[command(name = "facelive", version, about = "Face liveliness analysis from face-mesh landmarks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one face: a JSON array of normalised [x, y, z] landmarks
    Analyze {
        /// Landmark file
        file: PathBuf,
        /// Frame width in pixels
        #[arg(long, default_value_t = 640)]
        width: u32,
        /// Frame height in pixels
        #[arg(long, default_value_t = 480)]
        height: u32,
    },
    /// Replay a recorded session (JSON lines) through the frame analysis loop
    Replay {
        /// Recording file, one frame per line
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze {
            file,
            width,
            height,
        } => analyze::run(&file, width, height),
        Command::Replay { file } => replay::run(&file).await,
    }
}
