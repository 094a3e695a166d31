//! Candidate Detectors
//!
//! Independent object detector backends that each turn one frame into raw
//! (box, class, confidence) candidates:
//! - Precision and improved convolutional networks (ONNX via tract)
//! - Haar cascade vehicle detector
//! - HOG + linear SVM pedestrian detector
//! - Generic SSD network and face network
//! - Synthetic generator for running without any model artifacts
//!
//! A backend whose artifact is missing stays uninitialized and reports no
//! candidates instead of failing.

pub mod backend;
pub mod backends;
pub mod candidate;
pub mod config;
pub mod onnx;
pub mod profile;

pub use backend::{BackendKind, BoxedDetector, CandidateDetector};
pub use backends::{
    CascadeModel, CascadeVehicleDetector, FaceDetector, GenericNetworkDetector, HogPersonDetector,
    HogSvm, ImprovedDetector, PrecisionDetector, SyntheticDetector,
};
pub use candidate::{Candidate, Category, ObjectClass};
pub use config::DetectorsConfig;
pub use profile::{ClassRule, Rejection, SuppressionProfile};

use thiserror::Error;
use vision_frame::FrameError;

/// Detector error types
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),
}
