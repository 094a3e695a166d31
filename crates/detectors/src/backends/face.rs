//! Face network (SSD-style output)

use vision_frame::VideoFrame;

use super::load_network;
use crate::backend::{BackendKind, CandidateDetector};
use crate::candidate::Candidate;
use crate::config::DetectorsConfig;
use crate::onnx::{decode_ssd_faces, InputScaling, OnnxNetwork};
use crate::profile::SuppressionProfile;
use crate::DetectorError;

/// Per-channel mean (RGB) the face network was trained with
const FACE_MEAN: [f32; 3] = [123.0, 177.0, 104.0];

pub struct FaceDetector {
    network: Option<OnnxNetwork>,
    profile: SuppressionProfile,
}

impl FaceDetector {
    pub fn new(config: &DetectorsConfig) -> Self {
        Self {
            network: load_network(
                "face",
                config.face_model.as_deref(),
                config.face_input_size,
                InputScaling::MeanSubtract(FACE_MEAN),
            ),
            profile: SuppressionProfile::face(),
        }
    }
}

impl CandidateDetector for FaceDetector {
    fn name(&self) -> &str {
        "face"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Face
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
        Ok(decode_ssd_faces(&outputs, frame.width, frame.height, self.profile.score_threshold))
    }
}
