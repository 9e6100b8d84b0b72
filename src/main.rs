mod core;
mod decoder;
mod renderer;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::renderer::DisplayMode;

/// Plays a video in the terminal at a fixed frame rate.
///
/// A worker thread decodes and scales frames; the main thread paints one
/// frame per tick. Quit with q, Esc or Ctrl-C.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the input video
    video: String,
    /// Playback frame rate in frames per second
    frame_rate: f64,
    /// Cell rendering style
    #[arg(short, long, value_enum, default_value_t = DisplayMode::Rgb)]
    mode: DisplayMode,
}

fn main() -> Result<()> {
    // stdout belongs to the renderer; logs go to stderr, quiet by default.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    crate::core::player::play(&cli.video, cli.frame_rate, cli.mode)
}
