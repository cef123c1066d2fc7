// SPDX-License-Identifier: GPL-3.0-only

//! Presentation of finished frames

use crate::errors::{PipelineError, PipelineResult};
use crate::gpu::GpuContext;
use crate::pipelines::parameter::BlockSize;
use crate::shaders::{GpuTexture, read_texture_rgba};
use image::RgbaImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// A finished output texture handed to the presentation side
///
/// Holding a `PresentedFrame` keeps its output slot out of rotation; drop it
/// once the frame has been shown.
#[derive(Clone)]
pub struct PresentedFrame {
    pub texture: Arc<GpuTexture>,
    pub ctx: Arc<GpuContext>,
    /// Capture sequence number of the source frame
    pub frame_sequence: u64,
    /// Dispatcher sequence number of the submission that produced it
    pub submission: u64,
    pub block_size: BlockSize,
    pub captured_at: Instant,
    pub completed_at: Instant,
}

impl PresentedFrame {
    pub fn width(&self) -> u32 {
        self.texture.width
    }

    pub fn height(&self) -> u32 {
        self.texture.height
    }

    /// Capture to GPU completion
    pub fn latency(&self) -> Duration {
        self.completed_at.saturating_duration_since(self.captured_at)
    }

    /// Copy the frame to CPU memory
    ///
    /// Not used by the core live path; surfaces that cannot sample the
    /// texture directly (and snapshots) go through here.
    pub async fn read_rgba(&self) -> PipelineResult<RgbaImage> {
        let data = read_texture_rgba(&self.ctx, &self.texture).await?;
        RgbaImage::from_raw(self.width(), self.height(), data)
            .ok_or_else(|| PipelineError::Readback("short readback buffer".to_string()))
    }
}

impl std::fmt::Debug for PresentedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentedFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("frame_sequence", &self.frame_sequence)
            .field("submission", &self.submission)
            .field("block_size", &self.block_size)
            .finish()
    }
}

/// Something that shows finished frames
pub trait PresentationSurface {
    fn present(&mut self, frame: &PresentedFrame) -> PipelineResult<()>;
}

/// Surface that only records what it was given
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    presented: u64,
    last_sequence: Option<u64>,
    last_submission: Option<u64>,
    last_dimensions: Option<(u32, u32)>,
    total_latency: Duration,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn last_submission(&self) -> Option<u64> {
        self.last_submission
    }

    pub fn last_dimensions(&self) -> Option<(u32, u32)> {
        self.last_dimensions
    }

    /// Mean capture to completion latency over all presented frames
    pub fn mean_latency(&self) -> Option<Duration> {
        (self.presented > 0).then(|| self.total_latency / self.presented as u32)
    }
}

impl PresentationSurface for HeadlessSurface {
    fn present(&mut self, frame: &PresentedFrame) -> PipelineResult<()> {
        if let Some(previous) = self.last_submission
            && frame.submission <= previous
        {
            return Err(PipelineError::Presentation(format!(
                "submission {} presented after {}",
                frame.submission, previous
            )));
        }
        self.presented += 1;
        self.last_sequence = Some(frame.frame_sequence);
        self.last_submission = Some(frame.submission);
        self.last_dimensions = Some((frame.width(), frame.height()));
        self.total_latency += frame.latency();
        trace!(sequence = frame.frame_sequence, "Headless present");
        Ok(())
    }
}
