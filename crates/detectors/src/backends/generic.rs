//! Generic SSD network over all COCO classes

use vision_frame::VideoFrame;

use super::{load_network, SSD_SCALING};
use crate::backend::{BackendKind, CandidateDetector};
use crate::candidate::Candidate;
use crate::config::DetectorsConfig;
use crate::onnx::{decode_ssd, OnnxNetwork};
use crate::profile::SuppressionProfile;
use crate::DetectorError;

pub struct GenericNetworkDetector {
    network: Option<OnnxNetwork>,
    profile: SuppressionProfile,
}

impl GenericNetworkDetector {
    pub fn new(config: &DetectorsConfig) -> Self {
        Self {
            network: load_network(
                "generic SSD",
                config.generic_model.as_deref(),
                config.ssd_input_size,
                SSD_SCALING,
            ),
            profile: SuppressionProfile::generic_network(),
        }
    }
}

impl CandidateDetector for GenericNetworkDetector {
    fn name(&self) -> &str {
        "generic"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::GenericNetwork
    }

    fn is_initialized(&self) -> bool {
        self.network.is_some()
    }

    fn profile(&self) -> &SuppressionProfile {
        &self.profile
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Candidate>, DetectorError> {
        match &self.network {
            Some(network) => {
                let outputs = network.run(frame)?;
                Ok(decode_ssd(&outputs, frame.width, frame.height, self.profile.score_threshold))
            }
            None => Ok(Vec::new()),
        }
    }
}
