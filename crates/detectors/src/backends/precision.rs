//! Precision chain: YOLO network first, SSD network as fallback

use tracing::{debug, warn};
use vision_frame::VideoFrame;

use super::{load_network, SSD_SCALING};
use crate::backend::{BackendKind, CandidateDetector};
use crate::candidate::Candidate;
use crate::config::DetectorsConfig;
use crate::onnx::{decode_ssd, decode_yolo, InputScaling, RowNetwork};
use crate::profile::SuppressionProfile;
use crate::DetectorError;

type Network = Box<dyn RowNetwork>;

pub struct PrecisionDetector {
    yolo: Option<Network>,
    ssd: Option<Network>,
    profile: SuppressionProfile,
}

impl PrecisionDetector {
    pub fn new(config: &DetectorsConfig) -> Self {
        let yolo = load_network(
            "precision YOLO",
            config.precision_yolo_model.as_deref(),
            config.yolo_input_size,
            InputScaling::UnitRange,
        );
        let ssd = load_network(
            "precision SSD",
            config.precision_ssd_model.as_deref(),
            config.ssd_input_size,
            SSD_SCALING,
        );
        Self::from_networks(
            yolo.map(|n| Box::new(n) as Network),
            ssd.map(|n| Box::new(n) as Network),
        )
    }

    pub fn from_networks(yolo: Option<Network>, ssd: Option<Network>) -> Self {
        Self {
            yolo,
            ssd,
            profile: SuppressionProfile::precision(),
        }
    }

    /// Candidates of the primary network that pass validation
    fn accepted(&self, candidates: Vec<Candidate>, frame: &VideoFrame) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|c| self.profile.check(c, frame.width, frame.height).is_ok())
            .collect()
    }
}

impl CandidateDetector for PrecisionDetector {
    fn name(&self) -> &str {
        "precision"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Precision
    }

    fn is_initialized(&self) -> bool {
        self.yolo.is_some() || self.ssd.is_some()
    }

    fn profile(&self) -> &SuppressionProfile {
        &self.profile
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Candidate>, DetectorError> {
        let threshold = self.profile.score_threshold;

        if let Some(yolo) = &self.yolo {
            match yolo.run(frame) {
                Ok(outputs) => {
                    let decoded = decode_yolo(&outputs, frame.width, frame.height, threshold);
                    let found = self.accepted(decoded, frame);
                    if !found.is_empty() {
                        return Ok(found);
                    }
                    debug!("Precision YOLO found nothing, trying SSD");
                }
                // a failed primary counts as an empty one when SSD can stand in
                Err(e) if self.ssd.is_some() => warn!("Precision YOLO failed, trying SSD: {}", e),
                Err(e) => return Err(e),
            }
        }

        if let Some(ssd) = &self.ssd {
            let outputs = ssd.run(frame)?;
            let found = decode_ssd(&outputs, frame.width, frame.height, threshold)
                .into_iter()
                .filter(|c| c.class.category().is_some())
                .collect();
            return Ok(self.accepted(found, frame));
        }

        Ok(Vec::new())
    }
}
