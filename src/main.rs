// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use mosaic::constants::capture;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "mosaic")]
#[command(about = "GPU pixelation for camera feeds and still images")]
#[command(version)]
struct Cli {
    /// Config file to use instead of the user config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pixelate an image file
    Pixelate {
        /// Image to pixelate
        input: PathBuf,

        /// Output file path (default: INPUT_mosaic.png next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Block edge length in pixels
        #[arg(short, long)]
        block_size: Option<i64>,

        /// Size blocks to split the image into about this many tiles
        #[arg(
            short,
            long,
            conflicts_with = "block_size",
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        tiles: Option<u32>,
    },

    /// Run the live pipeline on a synthetic camera
    Live {
        /// Stream this image as the camera instead of the test pattern
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Test pattern width
        #[arg(long, default_value_t = capture::TEST_PATTERN_WIDTH)]
        width: u32,

        /// Test pattern height
        #[arg(long, default_value_t = capture::TEST_PATTERN_HEIGHT)]
        height: u32,

        /// Capture frame rate
        #[arg(long, default_value_t = capture::DEFAULT_CAPTURE_FPS)]
        fps: u32,

        /// Block edge length in pixels
        #[arg(short, long)]
        block_size: Option<i64>,

        /// Size blocks to split the frame into about this many tiles
        #[arg(
            short,
            long,
            conflicts_with = "block_size",
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        tiles: Option<u32>,

        /// Cap on GPU dispatches per second (0 = uncapped)
        #[arg(long)]
        max_fps: Option<u32>,

        /// Do not render to the terminal, only count frames
        #[arg(long)]
        headless: bool,

        /// Stop after this many presented frames (headless only)
        #[arg(short = 'n', long)]
        frames: Option<u64>,
    },

    /// Show the GPU adapter and configuration
    Info,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=mosaic=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pixelate {
            input,
            output,
            block_size,
            tiles,
        } => cli::pixelate_image(input, output, block_size, tiles, cli.config),
        Commands::Live {
            image,
            width,
            height,
            fps,
            block_size,
            tiles,
            max_fps,
            headless,
            frames,
        } => cli::run_live(
            cli::LiveSource {
                image,
                width,
                height,
                fps,
            },
            cli::LiveOptions {
                headless,
                frames,
                block_size,
                tiles,
                max_fps,
                config: cli.config,
            },
        ),
        Commands::Info => cli::show_info(cli.config),
    }
}
