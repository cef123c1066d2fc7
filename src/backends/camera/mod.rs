// SPDX-License-Identifier: GPL-3.0-only

//! Camera frame capture
//!
//! A [`FrameSource`] produces NV12 frames; [`start_capture`] drives it on its
//! own thread and pushes every frame into a [`FrameMailbox`]. The capture
//! thread never waits on the consumer.
//!
//! ```text
//! ┌─────────────┐  push   ┌──────────────┐  wait_latest  ┌────────────┐
//! │ FrameSource │ ──────▶ │ FrameMailbox │ ────────────▶ │ GPU worker │
//! └─────────────┘         └──────────────┘               └────────────┘
//! ```

pub mod frame_loop;
pub mod mailbox;
pub mod types;

pub use frame_loop::{FramePacer, LoopAction, LoopController};
pub use mailbox::{FrameMailbox, MailboxStats};
pub use types::*;

use crate::errors::PipelineResult;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Producer of camera frames
pub trait FrameSource: Send + 'static {
    /// Human readable name for logs and the status bar
    fn name(&self) -> &str;

    /// Size of the frames this source produces
    fn dimensions(&self) -> (u32, u32);

    /// Produce the frame with the given sequence number
    fn next_frame(&mut self, sequence: u64) -> PipelineResult<CameraFrame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn next_frame(&mut self, sequence: u64) -> PipelineResult<CameraFrame> {
        (**self).next_frame(sequence)
    }
}

/// Run `source` at `fps` frames per second, pushing into `mailbox`
///
/// The loop ends when the mailbox is closed, the controller is stopped, or
/// the source reports a fatal error.
pub fn start_capture<S: FrameSource>(
    mut source: S,
    mailbox: Arc<FrameMailbox>,
    fps: u32,
) -> LoopController {
    let (width, height) = source.dimensions();
    info!(source = source.name(), width, height, fps, "Starting capture");

    let mut pacer = FramePacer::from_fps(fps);
    let mut sequence = 0u64;

    LoopController::start("mosaic-capture", move || {
        pacer.wait();
        if mailbox.is_closed() {
            return LoopAction::Stop;
        }

        sequence += 1;
        match source.next_frame(sequence) {
            Ok(frame) => {
                if let Some(replaced) = mailbox.push(frame) {
                    debug!(replaced, sequence, "Consumer behind, replaced frame");
                }
                LoopAction::Continue
            }
            Err(e) if e.is_fatal() => {
                warn!(source = source.name(), error = %e, "Capture source failed");
                LoopAction::Stop
            }
            Err(e) => {
                debug!(sequence, error = %e, "Skipping capture frame");
                LoopAction::Continue
            }
        }
    })
}
