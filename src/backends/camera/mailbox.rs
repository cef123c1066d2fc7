// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot latest-frame mailbox between capture and the GPU worker
//!
//! The capture side never waits: `push` replaces whatever frame is still
//! sitting in the slot, and the replaced frame is dropped and counted. The GPU
//! worker always consumes the newest frame, so a slow consumer falls behind by
//! at most one frame instead of building a queue.

use super::types::CameraFrame;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

#[derive(Default)]
pub struct FrameMailbox {
    slot: Mutex<Option<CameraFrame>>,
    ready: Condvar,
    delivered: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

/// Counters for frames that went through the mailbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    /// Frames pushed by the capture side
    pub delivered: u64,
    /// Frames replaced before the consumer took them
    pub dropped: u64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<CameraFrame>> {
        // A panicking producer cannot leave the Option half-written
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a frame, returning the sequence number of the frame it replaced
    pub fn push(&self, frame: CameraFrame) -> Option<u64> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.delivered.fetch_add(1, Ordering::Relaxed);
        let replaced = self.lock().replace(frame).map(|old| old.sequence);
        if let Some(sequence) = replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(sequence, "Dropped unconsumed frame");
        }
        self.ready.notify_one();
        replaced
    }

    /// Take the current frame without waiting
    pub fn take(&self) -> Option<CameraFrame> {
        self.lock().take()
    }

    /// Wait up to `timeout` for a frame, then take the newest one
    pub fn wait_latest(&self, timeout: Duration) -> Option<CameraFrame> {
        let guard = self.lock();
        let (mut guard, _) = self
            .ready
            .wait_timeout_while(guard, timeout, |slot| {
                slot.is_none() && !self.closed.load(Ordering::Acquire)
            })
            .unwrap_or_else(|e| e.into_inner());
        guard.take()
    }

    /// Refuse further frames and wake any waiting consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::Colorimetry;
    use std::sync::Arc;
    use std::thread;

    fn frame(sequence: u64) -> CameraFrame {
        let data = vec![0u8; CameraFrame::nv12_len(2, 2)];
        CameraFrame::nv12(2, 2, data, Colorimetry::default(), 0, sequence)
    }

    #[test]
    fn test_newest_frame_wins() {
        let mailbox = FrameMailbox::new();
        assert_eq!(mailbox.push(frame(1)), None);
        assert_eq!(mailbox.push(frame(2)), Some(1));
        assert_eq!(mailbox.push(frame(3)), Some(2));

        assert_eq!(mailbox.take().map(|f| f.sequence), Some(3));
        assert!(mailbox.take().is_none());
        assert_eq!(
            mailbox.stats(),
            MailboxStats {
                delivered: 3,
                dropped: 2
            }
        );
    }

    #[test]
    fn test_wait_times_out_when_empty() {
        let mailbox = FrameMailbox::new();
        assert!(mailbox.wait_latest(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn test_wait_wakes_on_push() {
        let mailbox = Arc::new(FrameMailbox::new());
        let producer = Arc::clone(&mailbox);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            producer.push(frame(42));
        });

        let received = mailbox.wait_latest(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(received.map(|f| f.sequence), Some(42));
    }

    #[test]
    fn test_closed_mailbox_rejects_frames() {
        let mailbox = FrameMailbox::new();
        mailbox.close();
        mailbox.push(frame(1));
        assert!(mailbox.take().is_none());
        assert!(mailbox.wait_latest(Duration::from_secs(5)).is_none());
    }
}
