//! Detection Fusion
//!
//! Per-frame orchestration of the perception pipeline:
//! - Ambient light and motion analysis
//! - Priority chain over detector backends with a fallback tier
//! - Suppression, temporal smoothing and face merging
//! - Closest-object distance and an annotated output frame

pub mod config;
pub mod engine;
pub mod overlay;
pub mod result;

pub use config::{EngineConfig, OverlayConfig};
pub use engine::{EngineBuilder, FusionEngine};
pub use result::{DetectionResult, SensorSummary};

use thiserror::Error;

/// Engine initialization errors
#[derive(Error, Debug)]
pub enum InitError {
    #[error("Invalid configuration: {0}")]
    Config(String),
}
