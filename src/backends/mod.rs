// SPDX-License-Identifier: GPL-3.0-only

//! Frame producers for the live pipeline
//!
//! - [`camera`]: frame types, the latest-frame mailbox and the capture loop
//! - [`virtual_camera`]: synthetic sources (test pattern, still image)

pub mod camera;
pub mod virtual_camera;
