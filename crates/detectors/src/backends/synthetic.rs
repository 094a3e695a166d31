//! Synthetic detections for running without model artifacts

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vision_frame::{BoundingBox, VideoFrame};

use crate::backend::{BackendKind, CandidateDetector};
use crate::candidate::{Candidate, ObjectClass};
use crate::profile::SuppressionProfile;
use crate::DetectorError;

const VEHICLE_CLASSES: [ObjectClass; 3] =
    [ObjectClass::Car, ObjectClass::Truck, ObjectClass::Motorcycle];

/// Random persons (1-3) and vehicles (0-2) roughly centred in the frame
pub struct SyntheticDetector {
    rng: StdRng,
    profile: SuppressionProfile,
}

impl SyntheticDetector {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            profile: SuppressionProfile::synthetic(),
        }
    }

    fn random_box(
        &mut self,
        fw: u32,
        fh: u32,
        width_frac: (f32, f32),
        height_frac: (f32, f32),
    ) -> Option<BoundingBox> {
        let w = fw as f32 * self.rng.gen_range(width_frac.0..width_frac.1);
        let h = fh as f32 * self.rng.gen_range(height_frac.0..height_frac.1);
        let cx = fw as f32 * (0.5 + self.rng.gen_range(-0.25..0.25));
        let cy = fh as f32 * (0.5 + self.rng.gen_range(-0.2..0.2));
        BoundingBox::from_xywh_clipped(cx - w / 2.0, cy - h / 2.0, w, h, fw, fh)
    }
}

impl CandidateDetector for SyntheticDetector {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn profile(&self) -> &SuppressionProfile {
        &self.profile
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Candidate>, DetectorError> {
        frame.validate()?;
        let (fw, fh) = (frame.width, frame.height);
        let mut candidates = Vec::new();

        let persons = self.rng.gen_range(1..=3);
        for _ in 0..persons {
            if let Some(bbox) = self.random_box(fw, fh, (0.08, 0.15), (0.25, 0.45)) {
                let confidence = self.rng.gen_range(0.7..=1.0);
                candidates.push(Candidate::new(bbox, ObjectClass::Person, confidence));
            }
        }

        let vehicles = self.rng.gen_range(0..=2);
        for _ in 0..vehicles {
            if let Some(bbox) = self.random_box(fw, fh, (0.15, 0.3), (0.1, 0.2)) {
                let class = VEHICLE_CLASSES[self.rng.gen_range(0..VEHICLE_CLASSES.len())];
                let confidence = self.rng.gen_range(0.7..=1.0);
                candidates.push(Candidate::new(bbox, class, confidence));
            }
        }

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_confidence_ranges() {
        let mut detector = SyntheticDetector::new(Some(7));
        let frame = VideoFrame::solid(640, 480, [0, 0, 0]);
        for _ in 0..50 {
            let found = detector.detect(&frame).unwrap();
            let persons = found.iter().filter(|c| c.class.is_person()).count();
            let vehicles = found.iter().filter(|c| c.class.is_vehicle()).count();
            assert!((1..=3).contains(&persons));
            assert!(vehicles <= 2);
            assert!(found.iter().all(|c| (0.7..=1.0).contains(&c.confidence)));
            assert!(found.iter().all(|c| c.bbox.right() <= 640 && c.bbox.bottom() <= 480));
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let frame = VideoFrame::solid(320, 240, [0, 0, 0]);
        let a = SyntheticDetector::new(Some(42)).detect(&frame).unwrap();
        let b = SyntheticDetector::new(Some(42)).detect(&frame).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_always_initialized_and_flagged() {
        let detector = SyntheticDetector::new(None);
        assert!(detector.is_initialized());
        assert!(detector.kind().is_synthetic());
    }
}
