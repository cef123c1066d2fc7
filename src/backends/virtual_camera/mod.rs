// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture sources
//!
//! Stand-ins for a physical camera that produce NV12 frames the same way a
//! capture device would, including recycled buffer ids.

mod file_source;
mod test_pattern;

pub use file_source::StillImageSource;
pub use test_pattern::TestPatternSource;
