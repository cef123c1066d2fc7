// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the pixelation pipeline
//!
//! Errors fall into two classes. Fatal errors come from setup (no adapter, a
//! kernel missing from the library, pipeline compilation, an undecodable
//! image) and terminate the session. Everything else is recoverable: the
//! affected frame is dropped and the pipeline waits for the next one.

use std::fmt;
use std::path::PathBuf;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Main pipeline error type
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No compatible GPU adapter was found
    NoAdapter(String),
    /// The adapter refused to create a device
    DeviceRequest(String),
    /// A kernel name is not present in the kernel library
    KernelNotFound(String),
    /// Shader compilation or compute pipeline creation failed
    PipelineCreation { kernel: String, reason: String },
    /// A static image could not be read or decoded
    ImageDecode { path: PathBuf, reason: String },
    /// Configuration file could not be read or parsed
    Config(String),
    /// A frame arrived without one of its planes
    MissingPlane { plane: &'static str, sequence: u64 },
    /// A plane descriptor does not fit the frame data
    InvalidPlane { plane: &'static str, reason: String },
    /// A dispatch was requested before its input textures exist
    TexturesNotReady(&'static str),
    /// Textures handed between stages disagree on size
    DimensionMismatch {
        stage: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Block size must be a positive integer
    InvalidBlockSize(i64),
    /// Copying a texture back to CPU memory failed
    Readback(String),
    /// The presentation side went away or rejected a frame
    Presentation(String),
    /// Filesystem error
    Io(String),
}

impl PipelineError {
    /// Whether this error ends the session rather than dropping one frame
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::NoAdapter(_)
                | PipelineError::DeviceRequest(_)
                | PipelineError::KernelNotFound(_)
                | PipelineError::PipelineCreation { .. }
                | PipelineError::ImageDecode { .. }
                | PipelineError::Config(_)
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NoAdapter(msg) => write!(f, "No compatible GPU adapter: {}", msg),
            PipelineError::DeviceRequest(msg) => write!(f, "Failed to create GPU device: {}", msg),
            PipelineError::KernelNotFound(name) => {
                write!(f, "Kernel '{}' not found in kernel library", name)
            }
            PipelineError::PipelineCreation { kernel, reason } => {
                write!(f, "Failed to create pipeline for '{}': {}", kernel, reason)
            }
            PipelineError::ImageDecode { path, reason } => {
                write!(f, "Failed to load image '{}': {}", path.display(), reason)
            }
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::MissingPlane { plane, sequence } => {
                write!(f, "Frame {} is missing its {} plane", sequence, plane)
            }
            PipelineError::InvalidPlane { plane, reason } => {
                write!(f, "Invalid {} plane: {}", plane, reason)
            }
            PipelineError::TexturesNotReady(stage) => {
                write!(f, "Input textures not ready for {}", stage)
            }
            PipelineError::DimensionMismatch {
                stage,
                expected,
                actual,
            } => write!(
                f,
                "{}: expected {}x{} texture, got {}x{}",
                stage, expected.0, expected.1, actual.0, actual.1
            ),
            PipelineError::InvalidBlockSize(value) => {
                write!(f, "Block size must be positive, got {}", value)
            }
            PipelineError::Readback(msg) => write!(f, "Readback failed: {}", msg),
            PipelineError::Presentation(msg) => write!(f, "Presentation failed: {}", msg),
            PipelineError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PipelineError::NoAdapter("none".into()).is_fatal());
        assert!(PipelineError::KernelNotFound("pixelate".into()).is_fatal());
        assert!(
            PipelineError::ImageDecode {
                path: PathBuf::from("missing.png"),
                reason: "not found".into()
            }
            .is_fatal()
        );

        assert!(
            !PipelineError::MissingPlane {
                plane: "chroma",
                sequence: 3
            }
            .is_fatal()
        );
        assert!(!PipelineError::TexturesNotReady("pixelate").is_fatal());
        assert!(!PipelineError::InvalidBlockSize(0).is_fatal());
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = PipelineError::DimensionMismatch {
            stage: "pixelate",
            expected: (64, 64),
            actual: (32, 64),
        };
        assert_eq!(err.to_string(), "pixelate: expected 64x64 texture, got 32x64");
    }
}
