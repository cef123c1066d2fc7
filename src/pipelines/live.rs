// SPDX-License-Identifier: GPL-3.0-only

//! Live camera path
//!
//! ```text
//! mailbox ─▶ TextureCache ─▶ nv12_to_rgba ─▶ pixelate ─▶ output ring ─▶ surface
//! ```
//!
//! A single GPU worker thread owns every texture and stage. It takes the
//! newest frame from the mailbox, encodes both kernels into one command
//! buffer and submits without waiting. When the GPU finishes, the completion
//! callback hands a [`PresentedFrame`] to the presentation side over a
//! bounded channel. Frames that cannot be processed are dropped and counted;
//! only fatal errors stop the worker.

use super::dispatcher::ComputeDispatcher;
use super::parameter::BlockSizeParameter;
use super::surface::{PresentationSurface, PresentedFrame};
use crate::backends::camera::{CameraFrame, FrameMailbox, FramePacer, LoopAction, LoopController};
use crate::config::Config;
use crate::constants::{IN_FLIGHT_POLL, OUTPUT_RING_SIZE, WORKER_WAIT};
use crate::errors::PipelineResult;
use crate::gpu::GpuContext;
use crate::shaders::{
    ColorConversionStage, KernelLibrary, OutputRing, PixelationStage, TextureCache,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Where the pipeline's frames are in their life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Nothing in flight and nothing waiting to be shown
    Idle,
    /// At least one submission the GPU has not finished
    Processing,
    /// Finished frames waiting for the presentation side
    Ready,
}

impl FrameState {
    /// State from the submission counters and the presentation queue depth
    fn derive(submitted: u64, completed: u64, queued: u64) -> Self {
        if completed < submitted {
            Self::Processing
        } else if queued > 0 {
            Self::Ready
        } else {
            Self::Idle
        }
    }
}

#[derive(Debug, Default)]
struct PipelineCounters {
    received: AtomicU64,
    skipped: AtomicU64,
    processed: AtomicU64,
    completed: AtomicU64,
    presented: AtomicU64,
    /// Frames sent to the presentation channel
    queued: AtomicU64,
    /// Frames taken off the presentation channel, shown or skipped
    taken: AtomicU64,
}

impl PipelineCounters {
    fn waiting(&self) -> u64 {
        let queued = self.queued.load(Ordering::SeqCst);
        queued.saturating_sub(self.taken.load(Ordering::SeqCst))
    }
}

/// Frame counters of a live pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames the worker took from the mailbox
    pub received: u64,
    /// Frames replaced in the mailbox before the worker got to them
    pub dropped: u64,
    /// Frames abandoned because of a recoverable error
    pub skipped: u64,
    /// Frames submitted to the GPU
    pub processed: u64,
    /// Submissions the GPU has finished
    pub completed: u64,
    /// Frames handed to the presentation side
    pub presented: u64,
}

/// Everything the GPU worker thread owns
struct GpuWorker {
    dispatcher: Arc<ComputeDispatcher>,
    cache: TextureCache,
    convert: ColorConversionStage,
    pixelate: PixelationStage,
    ring: OutputRing,
    mailbox: Arc<FrameMailbox>,
    parameter: BlockSizeParameter,
    sender: SyncSender<PresentedFrame>,
    counters: Arc<PipelineCounters>,
    pacer: FramePacer,
}

impl GpuWorker {
    fn step(&mut self) -> LoopAction {
        self.dispatcher.poll();

        let remaining = self.pacer.remaining();
        if !remaining.is_zero() {
            thread::sleep(remaining.min(WORKER_WAIT));
            return LoopAction::Continue;
        }

        let wait = if self.dispatcher.completed() < self.dispatcher.submitted() {
            IN_FLIGHT_POLL
        } else {
            WORKER_WAIT
        };
        let Some(frame) = self.mailbox.wait_latest(wait) else {
            return if self.mailbox.is_closed() {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            };
        };

        self.pacer.mark();
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        match self.process(&frame) {
            Ok(()) => LoopAction::Continue,
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Live pipeline stopped");
                LoopAction::Stop
            }
            Err(e) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(sequence = frame.sequence, error = %e, "Dropped frame");
                LoopAction::Continue
            }
        }
    }

    fn process(&mut self, frame: &CameraFrame) -> PipelineResult<()> {
        // One load per dispatch; later changes apply to the next frame
        let block = self.parameter.get();

        let mut encoder = self.dispatcher.create_encoder("live_frame_encoder");
        let planes = self.cache.import_frame(frame)?;
        let rgba = self
            .convert
            .encode(&self.dispatcher, &mut encoder, Some(planes), frame.colorimetry)?;
        let output = self.ring.acquire(frame.width, frame.height)?;
        self.pixelate
            .encode(&self.dispatcher, &mut encoder, rgba, &output, block)?;

        let ctx = Arc::clone(self.dispatcher.context());
        let sender = self.sender.clone();
        let counters = Arc::clone(&self.counters);
        let frame_sequence = frame.sequence;
        let captured_at = frame.captured_at;

        self.dispatcher.submit_async(encoder, move |submission| {
            counters.completed.fetch_add(1, Ordering::Relaxed);
            let presented = PresentedFrame {
                texture: output,
                ctx,
                frame_sequence,
                submission,
                block_size: block,
                captured_at,
                completed_at: Instant::now(),
            };
            // Counted before the send so `taken` never runs ahead of `queued`
            counters.queued.fetch_add(1, Ordering::SeqCst);
            match sender.try_send(presented) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!(frame_sequence, "Presentation queue full, frame not shown");
                    counters.queued.fetch_sub(1, Ordering::SeqCst);
                }
                Err(TrySendError::Disconnected(_)) => {
                    counters.queued.fetch_sub(1, Ordering::SeqCst);
                }
            }
        });

        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        trace!(sequence = frame.sequence, block_size = block.get(), "Frame submitted");
        Ok(())
    }
}

/// Running live pipeline
///
/// Dropping it closes the mailbox and joins the GPU worker.
pub struct LivePipeline {
    ctx: Arc<GpuContext>,
    dispatcher: Arc<ComputeDispatcher>,
    mailbox: Arc<FrameMailbox>,
    parameter: BlockSizeParameter,
    presented: Receiver<PresentedFrame>,
    counters: Arc<PipelineCounters>,
    worker: LoopController,
}

impl LivePipeline {
    /// Compile both kernels and start the GPU worker
    ///
    /// Kernel and pipeline errors are returned here, before any thread is
    /// started.
    pub async fn start(
        dispatcher: Arc<ComputeDispatcher>,
        library: &KernelLibrary,
        parameter: BlockSizeParameter,
        config: &Config,
    ) -> PipelineResult<Self> {
        let ctx = Arc::clone(dispatcher.context());
        let convert = ColorConversionStage::new(Arc::clone(&ctx), library).await?;
        let pixelate = PixelationStage::new(Arc::clone(&ctx), library).await?;

        let mailbox = Arc::new(FrameMailbox::new());
        let counters = Arc::new(PipelineCounters::default());
        // One ring slot stays free for the frame being encoded
        let (sender, presented) = mpsc::sync_channel(OUTPUT_RING_SIZE - 1);

        let worker_state = GpuWorker {
            dispatcher: Arc::clone(&dispatcher),
            cache: TextureCache::new(Arc::clone(&ctx), config.texture_cache_capacity),
            convert,
            pixelate,
            ring: OutputRing::new(Arc::clone(&ctx), OUTPUT_RING_SIZE),
            mailbox: Arc::clone(&mailbox),
            parameter: parameter.clone(),
            sender,
            counters: Arc::clone(&counters),
            pacer: FramePacer::new(config.frame_interval()),
        };

        info!(
            block_size = parameter.get().get(),
            max_fps = ?config.max_fps,
            "Starting live pipeline"
        );

        let worker = LoopController::start_with_init(
            "mosaic-gpu-worker",
            move || Ok(worker_state),
            |worker: &mut GpuWorker| worker.step(),
        );

        Ok(Self {
            ctx,
            dispatcher,
            mailbox,
            parameter,
            presented,
            counters,
            worker,
        })
    }

    /// Where capture sources push frames
    pub fn mailbox(&self) -> &Arc<FrameMailbox> {
        &self.mailbox
    }

    pub fn parameter(&self) -> &BlockSizeParameter {
        &self.parameter
    }

    /// Processing while any submission is unfinished, Ready while finished
    /// frames wait to be taken
    pub fn state(&self) -> FrameState {
        // Completed before queue depth: a completed submission has already
        // queued its frame, so a frame finishing between the loads never
        // reads as Idle
        let completed = self.dispatcher.completed();
        let queued = self.counters.waiting();
        let submitted = self.dispatcher.submitted();
        FrameState::derive(submitted, completed, queued)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn take_presented(&self, frame: PresentedFrame) -> PresentedFrame {
        // Skip anything older that is still queued
        let mut latest = frame;
        let mut taken = 1;
        while let Ok(newer) = self.presented.try_recv() {
            latest = newer;
            taken += 1;
        }
        self.counters.taken.fetch_add(taken, Ordering::SeqCst);
        self.counters.presented.fetch_add(1, Ordering::Relaxed);
        latest
    }

    /// Newest finished frame, if any, without waiting
    pub fn try_latest_presented(&self) -> Option<PresentedFrame> {
        // Completion callbacks only run when the device is polled
        self.ctx.poll();
        let frame = self.presented.try_recv().ok()?;
        Some(self.take_presented(frame))
    }

    /// Wait up to `timeout` for a finished frame
    pub fn recv_presented_timeout(&self, timeout: Duration) -> Option<PresentedFrame> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ctx.poll();
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            match self.presented.recv_timeout((deadline - now).min(WORKER_WAIT)) {
                Ok(frame) => return Some(self.take_presented(frame)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Show the newest finished frame on `surface`
    ///
    /// Returns whether a frame was presented.
    pub fn present_latest(&self, surface: &mut dyn PresentationSurface) -> PipelineResult<bool> {
        match self.try_latest_presented() {
            Some(frame) => {
                surface.present(&frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.mailbox.stats().dropped,
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            presented: self.counters.presented.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting frames, join the worker and let in-flight work finish
    pub fn stop(&mut self) -> PipelineResult<()> {
        self.mailbox.close();
        self.worker.stop();
        if let Err(e) = self.ctx.wait_idle() {
            warn!(error = %e, "GPU did not drain on shutdown");
            return Err(e);
        }
        let stats = self.stats();
        info!(?stats, "Live pipeline stopped");
        Ok(())
    }
}

impl Drop for LivePipeline {
    fn drop(&mut self) {
        self.mailbox.close();
    }
}
