// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end tests for the live and still pipelines
//!
//! Every test needs a GPU adapter and returns early when none is available.

use image::{Rgba, RgbaImage};
use mosaic::backends::camera::{CameraFrame, Colorimetry, FrameSource};
use mosaic::backends::virtual_camera::TestPatternSource;
use mosaic::config::{Config, GpuPowerPreference};
use mosaic::errors::PipelineError;
use mosaic::gpu::GpuContext;
use mosaic::pipelines::{
    BlockSize, BlockSizeParameter, ComputeDispatcher, FrameState, HeadlessSurface, LivePipeline,
    PresentationSurface, StillPipeline,
};
use mosaic::shaders::kernels::NV12_TO_RGBA_SHADER;
use mosaic::shaders::{GpuTexture, KernelLibrary, PixelationStage, pixelate_cpu};
use std::sync::Arc;
use std::time::Duration;

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

async fn dispatcher() -> Option<Arc<ComputeDispatcher>> {
    match GpuContext::new("pipeline_test", GpuPowerPreference::default()).await {
        Ok(ctx) => Some(Arc::new(ComputeDispatcher::new(ctx))),
        Err(e) => {
            println!("Skipping test (no GPU): {}", e);
            None
        }
    }
}

fn uncapped_config() -> Config {
    Config {
        max_fps: None,
        ..Config::default()
    }
}

/// 256x256 image where every pixel has its own gray level
fn gray_ramp() -> RgbaImage {
    RgbaImage::from_fn(256, 256, |x, y| {
        let v = ((x * 7 + y * 13) % 256) as u8;
        Rgba([v, v, v, 255])
    })
}

fn assert_uniform_blocks(output: &RgbaImage, input: &RgbaImage, n: u32) {
    for by in 0..output.height().div_ceil(n) {
        for bx in 0..output.width().div_ceil(n) {
            let expected = input.get_pixel(bx * n, by * n);
            for y in by * n..((by + 1) * n).min(output.height()) {
                for x in bx * n..((bx + 1) * n).min(output.width()) {
                    assert_eq!(
                        output.get_pixel(x, y),
                        expected,
                        "pixel ({}, {}) in block ({}, {})",
                        x,
                        y,
                        bx,
                        by
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn test_still_image_sixteen_blocks() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let mut pipeline = StillPipeline::new(dispatcher, &KernelLibrary::default())
        .await
        .unwrap();

    let input = gray_ramp();
    pipeline.set_image(&input);
    let output = pipeline.process(BlockSize::new(64).unwrap()).await.unwrap();

    assert_eq!(output.dimensions(), (256, 256));
    assert_uniform_blocks(&output, &input, 64);

    // 4x4 blocks, each a single color
    let mut colors = std::collections::HashSet::new();
    for by in 0..4 {
        for bx in 0..4 {
            colors.insert(output.get_pixel(bx * 64, by * 64).0);
        }
    }
    assert!(colors.len() > 1, "Blocks should take their own top-left color");
}

#[tokio::test]
async fn test_still_matches_cpu_reference() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let mut pipeline = StillPipeline::new(dispatcher, &KernelLibrary::default())
        .await
        .unwrap();

    // Odd size so the last row and column of blocks are partial
    let input = TestPatternSource::new(101, 77, Colorimetry::default()).render(3);
    pipeline.set_image(&input);

    for n in [1, 7, 16, 200] {
        let block = BlockSize::new(n).unwrap();
        let gpu = pipeline.process(block).await.unwrap();
        assert_eq!(gpu, pixelate_cpu(&input, block), "block size {}", n);
    }
}

#[tokio::test]
async fn test_still_concurrent_callers_keep_their_block_size() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let mut pipeline = StillPipeline::new(dispatcher, &KernelLibrary::default())
        .await
        .unwrap();
    let input = gray_ramp();
    pipeline.set_image(&input);
    let pipeline = Arc::new(pipeline);

    let workers: Vec<_> = [4, 9, 16, 33]
        .into_iter()
        .map(|n| {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                let block = BlockSize::new(n).unwrap();
                (0..5)
                    .map(|_| pollster::block_on(pipeline.process(block)).unwrap())
                    .map(|output| (block, output))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for worker in workers {
        for (block, output) in worker.join().unwrap() {
            assert_eq!(output, pixelate_cpu(&input, block), "block size {}", block);
        }
    }
}

#[tokio::test]
async fn test_still_without_image() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let pipeline = StillPipeline::new(dispatcher, &KernelLibrary::default())
        .await
        .unwrap();

    assert!(matches!(
        pipeline.process(BlockSize::default()).await,
        Err(PipelineError::TexturesNotReady(_))
    ));
}

#[tokio::test]
async fn test_rejected_block_size_keeps_previous() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let mut pipeline = StillPipeline::new(dispatcher, &KernelLibrary::default())
        .await
        .unwrap();
    let input = gray_ramp();
    pipeline.set_image(&input);

    let parameter = BlockSizeParameter::new(BlockSize::new(32).unwrap());
    let before = pipeline.reprocess(&parameter).await.unwrap();

    assert!(matches!(
        parameter.set(0),
        Err(PipelineError::InvalidBlockSize(0))
    ));
    assert!(parameter.set(-4).is_err());
    assert_eq!(parameter.get().get(), 32);

    let after = pipeline.reprocess(&parameter).await.unwrap();
    assert_eq!(before, after);
    assert_uniform_blocks(&after, &input, 32);
}

#[tokio::test]
async fn test_missing_kernel_is_fatal() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    // Library that only knows the color conversion kernel
    let library = KernelLibrary::with_kernels([("nv12_to_rgba", NV12_TO_RGBA_SHADER)]);

    let err = match StillPipeline::new(dispatcher, &library).await {
        Ok(_) => panic!("pipeline built without its kernel"),
        Err(e) => e,
    };
    assert!(matches!(err, PipelineError::KernelNotFound(ref name) if name == "pixelate"));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_pixelate_dimension_mismatch() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let ctx = Arc::clone(dispatcher.context());
    let stage = PixelationStage::new(Arc::clone(&ctx), &KernelLibrary::default())
        .await
        .unwrap();

    let input = GpuTexture::rgba_storage(ctx.device(), "mismatch_in", 64, 64);
    let output = GpuTexture::rgba_storage(ctx.device(), "mismatch_out", 32, 64);
    let mut encoder = dispatcher.create_encoder("mismatch");

    let err = stage
        .encode(
            &dispatcher,
            &mut encoder,
            &input,
            &output,
            BlockSize::default(),
        )
        .unwrap_err();
    assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_live_frames_in_order() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let parameter = BlockSizeParameter::new(BlockSize::new(16).unwrap());
    let mut pipeline = LivePipeline::start(
        dispatcher,
        &KernelLibrary::default(),
        parameter,
        &uncapped_config(),
    )
    .await
    .unwrap();

    let mut source = TestPatternSource::new(96, 64, Colorimetry::default());
    let mut surface = HeadlessSurface::new();

    pipeline.mailbox().push(source.next_frame(1).unwrap());
    let first = pipeline
        .recv_presented_timeout(FRAME_TIMEOUT)
        .expect("first frame");
    surface.present(&first).unwrap();

    pipeline.mailbox().push(source.next_frame(2).unwrap());
    let second = pipeline
        .recv_presented_timeout(FRAME_TIMEOUT)
        .expect("second frame");
    surface.present(&second).unwrap();

    assert_eq!(first.frame_sequence, 1);
    assert_eq!(second.frame_sequence, 2);
    assert!(second.submission > first.submission);
    assert_eq!(surface.presented(), 2);

    for frame in [&first, &second] {
        assert_eq!((frame.width(), frame.height()), (96, 64));
        let image = frame.read_rgba().await.unwrap();
        assert_eq!(image.dimensions(), (96, 64));
        assert!(image.pixels().any(|p| p.0 != [0, 0, 0, 0]));
    }

    drop(first);
    drop(second);
    pipeline.stop().unwrap();
    // Both submissions finished and both frames were taken
    assert_eq!(pipeline.state(), FrameState::Idle);
    let stats = pipeline.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.completed, 2);
}

#[tokio::test]
async fn test_live_gray_frame() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let mut pipeline = LivePipeline::start(
        dispatcher,
        &KernelLibrary::default(),
        BlockSizeParameter::default(),
        &uncapped_config(),
    )
    .await
    .unwrap();

    // Limited range luma 126 with neutral chroma is mid gray
    let (width, height) = (80, 45);
    let mut data = vec![126u8; (width * height) as usize];
    data.resize(CameraFrame::nv12_len(width, height), 128);
    pipeline
        .mailbox()
        .push(CameraFrame::nv12(width, height, data, Colorimetry::default(), 0, 1));

    let frame = pipeline
        .recv_presented_timeout(FRAME_TIMEOUT)
        .expect("frame");
    let image = frame.read_rgba().await.unwrap();
    for px in image.pixels() {
        for c in &px.0[..3] {
            assert!((*c as i32 - 128).abs() <= 2, "got {:?}", px);
        }
        assert_eq!(px.0[3], 255);
    }

    drop(frame);
    pipeline.stop().unwrap();
}

#[tokio::test]
async fn test_live_block_size_change_applies_to_next_frame() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let parameter = BlockSizeParameter::new(BlockSize::new(8).unwrap());
    let mut pipeline = LivePipeline::start(
        dispatcher,
        &KernelLibrary::default(),
        parameter.clone(),
        &uncapped_config(),
    )
    .await
    .unwrap();
    let mut source = TestPatternSource::new(64, 64, Colorimetry::default());

    pipeline.mailbox().push(source.next_frame(1).unwrap());
    let first = pipeline.recv_presented_timeout(FRAME_TIMEOUT).expect("first");
    assert_eq!(first.block_size.get(), 8);

    assert!(parameter.set(0).is_err());
    parameter.set(24).unwrap();

    pipeline.mailbox().push(source.next_frame(2).unwrap());
    let second = pipeline.recv_presented_timeout(FRAME_TIMEOUT).expect("second");
    assert_eq!(second.block_size.get(), 24);

    drop(first);
    drop(second);
    pipeline.stop().unwrap();
}

#[tokio::test]
async fn test_live_damaged_frame_is_skipped() {
    let Some(dispatcher) = dispatcher().await else {
        return;
    };
    let mut pipeline = LivePipeline::start(
        dispatcher,
        &KernelLibrary::default(),
        BlockSizeParameter::default(),
        &uncapped_config(),
    )
    .await
    .unwrap();
    let mut source = TestPatternSource::new(32, 32, Colorimetry::default());

    let mut damaged = source.next_frame(1).unwrap();
    damaged.chroma = None;
    pipeline.mailbox().push(damaged);
    assert!(
        pipeline
            .recv_presented_timeout(Duration::from_millis(300))
            .is_none()
    );
    assert!(pipeline.is_running(), "Recoverable errors keep the worker alive");

    pipeline.mailbox().push(source.next_frame(2).unwrap());
    let frame = pipeline.recv_presented_timeout(FRAME_TIMEOUT).expect("frame");
    assert_eq!(frame.frame_sequence, 2);

    drop(frame);
    pipeline.stop().unwrap();
    assert_eq!(pipeline.stats().skipped, 1);
}
