//! Detector configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Model artifact locations and backend options.
///
/// A `None` path leaves the matching backend uninitialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorsConfig {
    /// YOLO-style ONNX model for the precision chain
    pub precision_yolo_model: Option<PathBuf>,

    /// SSD-style ONNX model used when the YOLO model finds nothing
    pub precision_ssd_model: Option<PathBuf>,

    /// YOLO-style ONNX model for the improved backend
    pub improved_model: Option<PathBuf>,

    /// OpenCV Haar cascade XML for vehicles
    pub vehicle_cascade: Option<PathBuf>,

    /// Linear SVM weights (JSON) for the HOG pedestrian detector
    pub hog_svm: Option<PathBuf>,

    /// SSD-style generic ONNX model
    pub generic_model: Option<PathBuf>,

    /// SSD-style face ONNX model
    pub face_model: Option<PathBuf>,

    /// Square input side of YOLO-style networks
    pub yolo_input_size: u32,

    /// Square input side of SSD-style networks
    pub ssd_input_size: u32,

    /// Square input side of the face network
    pub face_input_size: u32,

    /// Run the synthetic generator when no real backend is available
    pub enable_synthetic: bool,

    /// Fixed seed for the synthetic generator
    pub synthetic_seed: Option<u64>,
}

impl Default for DetectorsConfig {
    fn default() -> Self {
        Self {
            precision_yolo_model: None,
            precision_ssd_model: None,
            improved_model: None,
            vehicle_cascade: None,
            hog_svm: None,
            generic_model: None,
            face_model: None,
            yolo_input_size: 416,
            ssd_input_size: 300,
            face_input_size: 300,
            enable_synthetic: true,
            synthetic_seed: None,
        }
    }
}

impl DetectorsConfig {
    /// Resolve every configured path against `root`
    pub fn with_model_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        for path in [
            &mut self.precision_yolo_model,
            &mut self.precision_ssd_model,
            &mut self.improved_model,
            &mut self.vehicle_cascade,
            &mut self.hog_svm,
            &mut self.generic_model,
            &mut self.face_model,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self
    }
}
