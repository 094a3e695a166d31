//! Frame and geometry primitives for the perception pipeline
//!
//! Provides the types every other crate exchanges:
//! - `VideoFrame`: decoded RGB frame handed in by a frame source
//! - `BoundingBox`: pixel-space box with IoU and size-ratio helpers

pub mod bbox;
pub mod frame;

pub use bbox::BoundingBox;
pub use frame::VideoFrame;

use thiserror::Error;

/// Frame error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame has zero size ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("Frame data length mismatch: expected {expected} bytes, got {actual}")]
    DataLength { expected: usize, actual: usize },
}
