// SPDX-License-Identifier: GPL-3.0-only

//! Block-size parameter shared between the UI and the GPU worker
//!
//! The UI writes, the worker reads once per dispatch. A single atomic word
//! is all the synchronization needed: the next dispatch after a `set` sees
//! the new value, and a dispatch already encoded keeps the value it read.

use crate::constants::DEFAULT_BLOCK_SIZE;
use crate::errors::{PipelineError, PipelineResult};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// Side length in pixels of one pixelation block; always at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockSize(NonZeroU32);

impl BlockSize {
    /// Validate a raw value coming from a control, config or command line
    pub fn new(value: i64) -> PipelineResult<Self> {
        u32::try_from(value)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(PipelineError::InvalidBlockSize(value))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Limit to `[1, min(width, height)]` so one block never exceeds the frame
    pub fn clamp_to_extent(self, width: u32, height: u32) -> Self {
        let limit = width.min(height).max(1);
        Self(NonZeroU32::new(self.get().min(limit)).unwrap_or(NonZeroU32::MIN))
    }

    /// Square block that splits a `width` x `height` frame into about `tiles`
    /// tiles
    ///
    /// The ideal side is `sqrt(width * height / tiles)`. That side is rounded
    /// to a whole number of tiles per row (rounding the count up) and the
    /// block is the frame width divided by that count.
    pub fn for_tile_count(width: u32, height: u32, tiles: u32) -> Self {
        let per_row = Self::tiles_per_row(width, height, tiles);
        let side = width / per_row;
        Self(NonZeroU32::new(side).unwrap_or(NonZeroU32::MIN))
    }

    /// Tiles in one row of the grid chosen by [`Self::for_tile_count`]
    pub fn tiles_per_row(width: u32, height: u32, tiles: u32) -> u32 {
        if width == 0 || height == 0 {
            return 1;
        }
        let area = f64::from(width) * f64::from(height) / f64::from(tiles.max(1));
        let ideal_side = area.sqrt().max(1.0);
        ((f64::from(width) / ideal_side).ceil() as u32).clamp(1, width)
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self(NonZeroU32::new(DEFAULT_BLOCK_SIZE).unwrap_or(NonZeroU32::MIN))
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px", self.get())
    }
}

/// Thread-safe block size handle; clones share the same value
#[derive(Debug, Clone)]
pub struct BlockSizeParameter {
    value: Arc<AtomicU32>,
}

impl BlockSizeParameter {
    pub fn new(initial: BlockSize) -> Self {
        Self {
            value: Arc::new(AtomicU32::new(initial.get())),
        }
    }

    /// Commit a new value from an untrusted source
    ///
    /// Zero and negative values are rejected and the previous value stays.
    pub fn set(&self, value: i64) -> PipelineResult<BlockSize> {
        match BlockSize::new(value) {
            Ok(block) => {
                self.set_block(block);
                Ok(block)
            }
            Err(e) => {
                warn!(value, current = self.get().get(), "Rejected block size");
                Err(e)
            }
        }
    }

    pub fn set_block(&self, block: BlockSize) {
        let previous = self.value.swap(block.get(), Ordering::Release);
        if previous != block.get() {
            debug!(previous, block_size = block.get(), "Block size updated");
        }
    }

    /// Value the next dispatch will use
    pub fn get(&self) -> BlockSize {
        // Only `set_block` stores, and it only stores non-zero values
        BlockSize(NonZeroU32::new(self.value.load(Ordering::Acquire)).unwrap_or(NonZeroU32::MIN))
    }

    /// Step the block size by `delta`, stopping at 1
    pub fn adjust(&self, delta: i64) -> BlockSize {
        let next = (i64::from(self.get().get()) + delta).clamp(1, i64::from(u32::MAX));
        let block = BlockSize::new(next).unwrap_or_default();
        self.set_block(block);
        block
    }
}

impl Default for BlockSizeParameter {
    fn default() -> Self {
        Self::new(BlockSize::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_rejects_non_positive() {
        assert_eq!(BlockSize::new(0), Err(PipelineError::InvalidBlockSize(0)));
        assert_eq!(BlockSize::new(-4), Err(PipelineError::InvalidBlockSize(-4)));
        assert_eq!(BlockSize::new(1).unwrap().get(), 1);
        assert!(BlockSize::new(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_rejected_value_keeps_previous() {
        let param = BlockSizeParameter::new(BlockSize::new(24).unwrap());
        assert!(param.set(0).is_err());
        assert!(param.set(-10).is_err());
        assert_eq!(param.get().get(), 24);

        param.set(8).unwrap();
        assert_eq!(param.get().get(), 8);
    }

    #[test]
    fn test_block_for_tile_count() {
        // 640x480 / 300 tiles: 32px side, 20 per row
        assert_eq!(BlockSize::tiles_per_row(640, 480, 300), 20);
        assert_eq!(BlockSize::for_tile_count(640, 480, 300).get(), 32);

        // Side of 40.8px rounds to 3 tiles per row of 33px
        assert_eq!(BlockSize::tiles_per_row(100, 50, 3), 3);
        assert_eq!(BlockSize::for_tile_count(100, 50, 3).get(), 33);

        // One tile still needs a whole row count
        assert_eq!(BlockSize::for_tile_count(640, 480, 1).get(), 320);
    }

    #[test]
    fn test_tile_count_edge_cases() {
        // More tiles than pixels bottoms out at single-pixel blocks
        assert_eq!(BlockSize::for_tile_count(10, 10, 1000).get(), 1);
        assert_eq!(BlockSize::for_tile_count(0, 480, 300).get(), 1);
        assert_eq!(
            BlockSize::for_tile_count(640, 480, 0),
            BlockSize::for_tile_count(640, 480, 1)
        );
    }

    #[test]
    fn test_clamp_to_extent() {
        let block = BlockSize::new(500).unwrap();
        assert_eq!(block.clamp_to_extent(640, 480).get(), 480);
        assert_eq!(block.clamp_to_extent(0, 0).get(), 1);
        assert_eq!(BlockSize::new(4).unwrap().clamp_to_extent(640, 480).get(), 4);
    }

    #[test]
    fn test_adjust_stops_at_one() {
        let param = BlockSizeParameter::new(BlockSize::new(3).unwrap());
        assert_eq!(param.adjust(-10).get(), 1);
        assert_eq!(param.adjust(4).get(), 5);
    }

    #[test]
    fn test_clones_share_value() {
        let param = BlockSizeParameter::default();
        assert_eq!(param.get().get(), DEFAULT_BLOCK_SIZE);

        let writer = param.clone();
        thread::spawn(move || writer.set(12).unwrap())
            .join()
            .unwrap();
        assert_eq!(param.get().get(), 12);
    }
}
