// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Default pixelation block size in pixels
pub const DEFAULT_BLOCK_SIZE: u32 = 60;

/// Compute workgroup edge length; kernels are declared `@workgroup_size(16, 16, 1)`
pub const WORKGROUP_SIZE: u32 = 16;

/// Number of output textures the live pixelation stage rotates through
pub const OUTPUT_RING_SIZE: usize = 3;

/// Number of capture buffers whose plane textures are kept alive
pub const TEXTURE_CACHE_CAPACITY: usize = 3;

/// Number of backing buffers the synthetic capture sources cycle through
pub const CAPTURE_POOL_SIZE: u64 = 3;

/// Default frame-rate cap for the GPU worker
pub const DEFAULT_MAX_FPS: u32 = 30;

/// Longest time the GPU worker waits on the mailbox before checking for stop
pub const WORKER_WAIT: Duration = Duration::from_millis(20);

/// Mailbox wait while a submission is still in flight, so completions are
/// polled promptly
pub const IN_FLIGHT_POLL: Duration = Duration::from_millis(2);

/// Row alignment required for texture-to-buffer copies
pub const COPY_ROW_ALIGNMENT: u32 = 256;

/// Synthetic capture defaults
pub mod capture {
    /// Test pattern width
    pub const TEST_PATTERN_WIDTH: u32 = 640;
    /// Test pattern height
    pub const TEST_PATTERN_HEIGHT: u32 = 480;
    /// Frame rate of the synthetic sources
    pub const DEFAULT_CAPTURE_FPS: u32 = 30;
}

/// Kernel names as registered in the kernel library
pub mod kernels {
    /// Luma/chroma to RGBA conversion
    pub const NV12_TO_RGBA: &str = "nv12_to_rgba";
    /// Block pixelation
    pub const PIXELATE: &str = "pixelate";
}

/// Supported still image file extensions
pub mod file_formats {
    /// Image extensions the static path accepts
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff"];

    /// Check if an extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extensions() {
        assert!(file_formats::is_image_extension("png"));
        assert!(file_formats::is_image_extension("JPG"));
        assert!(!file_formats::is_image_extension("mp4"));
    }

    #[test]
    fn test_ring_covers_in_flight_frames() {
        // One frame encoding, one queued for presentation, one on screen
        assert!(OUTPUT_RING_SIZE >= 3);
    }
}
