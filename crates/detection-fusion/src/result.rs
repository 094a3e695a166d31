//! Per-frame engine output

use box_tracking::{Detection, TrackedBox};
use detectors::BackendKind;
use serde::{Deserialize, Serialize};
use vision_frame::VideoFrame;

/// Everything the engine reports for one frame
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Persons plus faces (faces inside a body excluded when dedup is on)
    pub human_count: usize,
    pub vehicle_count: usize,
    pub face_count: usize,

    /// Ambient light, 0-1000
    pub light_level: u16,
    pub motion_detected: bool,

    /// Closest estimated object distance (meters)
    pub closest_distance_m: f32,

    /// Copy of the input with boxes and the summary panel drawn
    pub annotated_frame: VideoFrame,

    pub persons: Vec<TrackedBox>,
    pub vehicles: Vec<TrackedBox>,
    pub faces: Vec<Detection>,

    /// Backend that produced the body boxes
    pub source: Option<BackendKind>,

    /// Body boxes are generated, not detected
    pub synthetic: bool,

    pub frame_sequence: u32,
}

impl DetectionResult {
    /// Result with nothing detected
    pub fn neutral(frame: &VideoFrame, light_level: u16, closest_distance_m: f32) -> Self {
        Self {
            human_count: 0,
            vehicle_count: 0,
            face_count: 0,
            light_level,
            motion_detected: false,
            closest_distance_m,
            annotated_frame: frame.clone(),
            persons: Vec::new(),
            vehicles: Vec::new(),
            faces: Vec::new(),
            source: None,
            synthetic: false,
            frame_sequence: frame.sequence,
        }
    }

    pub fn resolution(&self) -> String {
        self.annotated_frame.resolution()
    }
}

/// Flat snapshot for dashboards and polling clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSummary {
    pub light_level: u16,
    pub motion_detected: bool,
    pub distance: f32,
    /// "WxH"
    pub resolution: String,
    pub framerate: u32,
    pub quality: u8,
    pub humans_count: usize,
    pub vehicles_count: usize,
}
