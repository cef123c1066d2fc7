// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Pixelating a still image file
//! - Running the live pipeline on a synthetic camera (terminal or headless)
//! - Showing the selected GPU adapter

use mosaic::backends::camera::{FrameSource, LoopController, start_capture};
use mosaic::backends::virtual_camera::{StillImageSource, TestPatternSource};
use mosaic::config::Config;
use mosaic::constants::{app_info, capture, file_formats};
use mosaic::gpu::GpuContext;
use mosaic::pipelines::{
    BlockSize, BlockSizeParameter, ComputeDispatcher, HeadlessSurface, LivePipeline,
    PresentationSurface, StillPipeline,
};
use mosaic::shaders::KernelLibrary;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Frame source selection for the live command
pub struct LiveSource {
    /// Stream this image instead of the test pattern
    pub image: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Options for the live command
pub struct LiveOptions {
    pub headless: bool,
    /// Stop after this many presented frames (headless only)
    pub frames: Option<u64>,
    pub block_size: Option<i64>,
    /// Size blocks to split the frame into about this many tiles
    pub tiles: Option<u32>,
    pub max_fps: Option<u32>,
    pub config: Option<PathBuf>,
}

/// Load the config named on the command line, or the user config
fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Config::load_from(path)?),
        None => Ok(Config::load()),
    }
}

/// File `load_config` reads for the same argument
fn config_path(path: Option<&Path>) -> Option<PathBuf> {
    path.map(Path::to_path_buf).or_else(Config::default_path)
}

/// Block size from the command line, falling back to the config
fn initial_block_size(
    requested: Option<i64>,
    config: &Config,
) -> Result<BlockSize, Box<dyn std::error::Error>> {
    match requested {
        Some(value) => Ok(BlockSize::new(value)?),
        None => Ok(config.block_size()),
    }
}

/// A tile count wins over the block size, since it depends on the frame
fn block_size_for(
    requested: Option<i64>,
    tiles: Option<u32>,
    (width, height): (u32, u32),
    config: &Config,
) -> Result<BlockSize, Box<dyn std::error::Error>> {
    match tiles {
        Some(tiles) => Ok(BlockSize::for_tile_count(width, height, tiles)),
        None => initial_block_size(requested, config),
    }
}

/// `photo.png` becomes `photo_mosaic.png` next to the input
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{}_mosaic.png", stem))
}

/// Pixelate a still image and write the result
pub fn pixelate_image(
    input: PathBuf,
    output: Option<PathBuf>,
    block_size: Option<i64>,
    tiles: Option<u32>,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config.as_deref())?;
    // Fail on a bad block size before touching the GPU
    initial_block_size(block_size, &config)?;

    if let Some(ext) = input.extension().and_then(|e| e.to_str())
        && !file_formats::is_image_extension(ext)
    {
        return Err(format!("Unsupported image format: .{}", ext).into());
    }

    let output_path = output.unwrap_or_else(|| default_output_path(&input));
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    // Create async runtime for the GPU setup and readback
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let ctx = GpuContext::new("mosaic-still", config.power_preference).await?;
        let dispatcher = Arc::new(ComputeDispatcher::new(ctx));
        let library = KernelLibrary::default();

        let mut pipeline = StillPipeline::new(dispatcher, &library).await?;
        let (width, height) = pipeline.load_image(&input)?;
        let block = block_size_for(block_size, tiles, (width, height), &config)?;
        println!("Input: {} ({}x{})", input.display(), width, height);
        match tiles {
            Some(tiles) => println!(
                "Block size: {} ({} tiles requested, {} per row)",
                block,
                tiles,
                BlockSize::tiles_per_row(width, height, tiles)
            ),
            None => println!("Block size: {}", block),
        }

        let start = Instant::now();
        let image = pipeline.process(block).await?;
        image.save(&output_path)?;

        println!(
            "Saved: {} ({:.1} ms)",
            output_path.display(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Run the live pipeline on a synthetic camera
pub fn run_live(source: LiveSource, options: LiveOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(options.config.as_deref())?;
    if let Some(max_fps) = options.max_fps {
        config.max_fps = (max_fps > 0).then_some(max_fps);
    }
    let frame_source: Box<dyn FrameSource> = match &source.image {
        Some(path) => Box::new(StillImageSource::open(path, config.colorimetry)?),
        None => Box::new(TestPatternSource::new(
            source.width,
            source.height,
            config.colorimetry,
        )),
    };
    let source_name = frame_source.name().to_string();
    let parameter = BlockSizeParameter::new(block_size_for(
        options.block_size,
        options.tiles,
        frame_source.dimensions(),
        &config,
    )?);

    let rt = tokio::runtime::Runtime::new()?;
    let mut pipeline = rt.block_on(async {
        let ctx = GpuContext::new("mosaic-live", config.power_preference).await?;
        let dispatcher = Arc::new(ComputeDispatcher::new(ctx));
        let library = KernelLibrary::default();
        LivePipeline::start(dispatcher, &library, parameter, &config).await
    })?;

    let mut capture = start_capture(frame_source, Arc::clone(pipeline.mailbox()), source.fps);

    let result = if options.headless {
        run_headless(&pipeline, &capture, options.frames)
    } else {
        mosaic::terminal::run(&pipeline, &source_name)
    };

    capture.stop();
    pipeline.stop()?;

    let stats = pipeline.stats();
    println!(
        "Frames: received {}, presented {}, dropped {}, skipped {}",
        stats.received, stats.presented, stats.dropped, stats.skipped
    );
    result
}

fn run_headless(
    pipeline: &LivePipeline,
    capture: &LoopController,
    frames: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    match frames {
        Some(n) => println!("Processing {} frames... (Press Ctrl+C to stop)", n),
        None => println!("Processing until Ctrl+C..."),
    }

    let mut surface = HeadlessSurface::new();
    let start = Instant::now();
    let mut last_report = Instant::now();

    while !stop_flag.load(Ordering::SeqCst) {
        if let Some(limit) = frames
            && surface.presented() >= limit
        {
            break;
        }
        if !pipeline.is_running() {
            return Err("Live pipeline stopped".into());
        }
        if !capture.is_running() {
            return Err("Capture source stopped".into());
        }

        if let Some(frame) = pipeline.recv_presented_timeout(Duration::from_millis(100)) {
            surface.present(&frame)?;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let stats = pipeline.stats();
            print!(
                "\rPresented: {} | dropped: {} | block: {}   ",
                surface.presented(),
                stats.dropped,
                pipeline.parameter().get()
            );
            std::io::stdout().flush()?;
            last_report = Instant::now();
        }
    }

    println!();
    let elapsed = start.elapsed().as_secs_f64();
    if elapsed > 0.0 {
        println!(
            "Presented {} frames in {:.1}s ({:.1} fps)",
            surface.presented(),
            elapsed,
            surface.presented() as f64 / elapsed
        );
    }
    if let Some(latency) = surface.mean_latency() {
        println!("Mean latency: {:.2} ms", latency.as_secs_f64() * 1000.0);
    }
    if let Some((width, height)) = surface.last_dimensions() {
        println!("Output: {}x{}", width, height);
    }

    Ok(())
}

/// Print the GPU adapter the pipelines would use
pub fn show_info(config: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path(config.as_deref());
    let config = load_config(config.as_deref())?;

    println!("mosaic {}", app_info::version());
    println!();

    let rt = tokio::runtime::Runtime::new()?;
    let ctx = rt.block_on(GpuContext::new("mosaic-info", config.power_preference))?;
    let info = ctx.info();

    println!("GPU adapter:");
    println!("  Name:    {}", info.adapter_name);
    println!("  Backend: {:?}", info.backend);
    println!("  Type:    {:?}", info.device_type);
    if !info.driver.is_empty() {
        println!("  Driver:  {}", info.driver);
    }
    println!();

    println!("Kernels:");
    let library = KernelLibrary::default();
    let mut names: Vec<&str> = library.names().collect();
    names.sort_unstable();
    for name in names {
        println!("  {}", name);
    }
    println!();

    println!("Configuration:");
    if let Some(path) = path {
        println!("  File:       {}", path.display());
    }
    println!("  Block size: {}", config.block_size());
    match config.max_fps {
        Some(fps) => println!("  Max FPS:    {}", fps),
        None => println!("  Max FPS:    uncapped"),
    }
    println!(
        "  Test pattern: {}x{} @ {}fps",
        capture::TEST_PATTERN_WIDTH,
        capture::TEST_PATTERN_HEIGHT,
        capture::DEFAULT_CAPTURE_FPS
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/photo.jpg")),
            PathBuf::from("/tmp/photo_mosaic.png")
        );
        assert_eq!(
            default_output_path(Path::new("cat.png")),
            PathBuf::from("cat_mosaic.png")
        );
    }

    #[test]
    fn test_block_size_override() {
        let config = Config::default();
        assert_eq!(initial_block_size(None, &config).unwrap().get(), 60);
        assert_eq!(initial_block_size(Some(8), &config).unwrap().get(), 8);
        assert!(initial_block_size(Some(0), &config).is_err());
    }

    #[test]
    fn test_tiles_override_block_size() {
        let config = Config::default();
        let block = block_size_for(Some(8), Some(300), (640, 480), &config).unwrap();
        assert_eq!(block.get(), 32);
        let block = block_size_for(Some(8), None, (640, 480), &config).unwrap();
        assert_eq!(block.get(), 8);
    }

    #[test]
    fn test_info_reports_loaded_config() {
        let explicit = Path::new("/tmp/mosaic-test/other.json");
        assert_eq!(config_path(Some(explicit)), Some(explicit.to_path_buf()));
        assert_eq!(config_path(None), Config::default_path());
    }
}
