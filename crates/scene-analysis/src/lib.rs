//! Scene Analysis
//!
//! Frame-level signals that do not depend on any object detector:
//! - Ambient light level (0-1000)
//! - Motion between consecutive frames, with a hold-off window
//! - Calibrated distance lookup from box-to-frame size ratio

pub mod analyzer;
pub mod distance;

pub use analyzer::{AnalyzerConfig, FrameAnalyzer};
pub use distance::{DistanceEstimator, DistanceFamily};
