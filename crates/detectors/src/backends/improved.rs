//! Single YOLO network with relaxed thresholds

use vision_frame::VideoFrame;

use super::load_network;
use crate::backend::{BackendKind, CandidateDetector};
use crate::candidate::Candidate;
use crate::config::DetectorsConfig;
use crate::onnx::{decode_yolo, InputScaling, OnnxNetwork};
use crate::profile::SuppressionProfile;
use crate::DetectorError;

pub struct ImprovedDetector {
    network: Option<OnnxNetwork>,
    profile: SuppressionProfile,
}

impl ImprovedDetector {
    pub fn new(config: &DetectorsConfig) -> Self {
        Self {
            network: load_network(
                "improved YOLO",
                config.improved_model.as_deref(),
                config.yolo_input_size,
                InputScaling::UnitRange,
            ),
            profile: SuppressionProfile::improved(),
        }
    }
}

impl CandidateDetector for ImprovedDetector {
    fn name(&self) -> &str {
        "improved"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Improved
    }

    fn is_initialized(&self) -> bool {
        self.network.is_some()
    }

    fn profile(&self) -> &SuppressionProfile {
        &self.profile
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Candidate>, DetectorError> {
        let Some(network) = &self.network else {
            return Ok(Vec::new());
        };
        let outputs = network.run(frame)?;
        Ok(decode_yolo(&outputs, frame.width, frame.height, self.profile.score_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_returns_nothing() {
        let mut detector = ImprovedDetector::new(&DetectorsConfig::default());
        assert!(!detector.is_initialized());
        assert!(detector.detect(&VideoFrame::solid(32, 32, [9, 9, 9])).unwrap().is_empty());
        assert_eq!(detector.profile().min_side_px, 20);
    }
}
