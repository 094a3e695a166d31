//! Engine configuration

use std::path::PathBuf;

use box_tracking::TrackerConfig;
use detectors::{BackendKind, DetectorsConfig};
use scene_analysis::AnalyzerConfig;
use serde::{Deserialize, Serialize};

use crate::InitError;

/// Annotated frame options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Draw boxes and the summary panel
    pub enabled: bool,

    /// TTF/OTF font for text labels. Unset falls back to a common system
    /// font; with no font at all only shapes are drawn.
    pub font_path: Option<PathBuf>,

    /// Label text height (px)
    pub font_size: f32,

    /// Box border thickness (px)
    pub line_thickness: u32,

    /// Opacity of the dark summary panel
    pub panel_alpha: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            font_path: None,
            font_size: 16.0,
            line_thickness: 2,
            panel_alpha: 0.7,
        }
    }
}

/// Fusion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analyzer: AnalyzerConfig,
    pub tracker: TrackerConfig,
    pub detectors: DetectorsConfig,
    pub overlay: OverlayConfig,

    /// Backends tried in order; the first with output wins
    pub chain: Vec<BackendKind>,

    /// Distance reported when nothing closer is detected (meters)
    pub distance_sentinel_m: f32,

    /// Reported stream framerate
    pub framerate: u32,

    /// Reported stream quality (0-100)
    pub quality: u8,

    /// When set, faces at least this much inside a person box are not added
    /// to the human count
    pub face_body_dedup: Option<f32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            tracker: TrackerConfig::default(),
            detectors: DetectorsConfig::default(),
            overlay: OverlayConfig::default(),
            chain: vec![BackendKind::Precision, BackendKind::Improved, BackendKind::CascadeVehicle],
            distance_sentinel_m: 10.0,
            framerate: 25,
            quality: 85,
            face_body_dedup: None,
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), InitError> {
        let err = |msg: String| Err(InitError::Config(msg));

        if let Some(kind) = self.chain.iter().find(|k| {
            !matches!(
                k,
                BackendKind::Precision | BackendKind::Improved | BackendKind::CascadeVehicle
            )
        }) {
            return err(format!("{:?} cannot be part of the priority chain", kind));
        }
        if !(0.0..=1.0).contains(&self.tracker.match_iou) {
            return err(format!("tracker.match_iou {} not in [0, 1]", self.tracker.match_iou));
        }
        if self.tracker.carry_forward_secs < 0.0 || self.tracker.scene_cut_secs < 0.0 {
            return err("tracker windows must not be negative".to_string());
        }
        if self.analyzer.motion_hold_secs < 0.0 {
            return err("analyzer.motion_hold_secs must not be negative".to_string());
        }
        if !(self.distance_sentinel_m > 0.0) {
            return err(format!(
                "distance_sentinel_m {} must be positive",
                self.distance_sentinel_m
            ));
        }
        if self.framerate == 0 {
            return err("framerate must be positive".to_string());
        }
        if self.quality > 100 {
            return err(format!("quality {} above 100", self.quality));
        }
        if let Some(threshold) = self.face_body_dedup {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return err(format!("face_body_dedup {} not in (0, 1]", threshold));
            }
        }
        if !(0.0..=1.0).contains(&self.overlay.panel_alpha) {
            return err(format!("overlay.panel_alpha {} not in [0, 1]", self.overlay.panel_alpha));
        }
        Ok(())
    }
}
