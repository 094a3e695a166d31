//! Per-backend suppression and validation thresholds

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::candidate::{Candidate, Category, ObjectClass};

/// Why a candidate failed validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("size ratio {ratio:.4} outside [{min}, {max}]")]
    SizeRatio { ratio: f32, min: f32, max: f32 },

    #[error("side {side}px below minimum {min}px")]
    TooSmall { side: u32, min: u32 },

    #[error("box spans more than {fraction} of the frame")]
    TooLarge { fraction: f32 },

    #[error("aspect ratio {aspect:.2} outside class limits")]
    Aspect { aspect: f32 },

    #[error("confidence {confidence:.2} below class floor {min}")]
    Confidence { confidence: f32, min: f32 },
}

/// Aspect and confidence limits for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassRule {
    /// Minimum width/height
    pub min_aspect: Option<f32>,
    /// Maximum width/height
    pub max_aspect: Option<f32>,
    pub min_confidence: f32,
}

impl Default for ClassRule {
    fn default() -> Self {
        Self {
            min_aspect: None,
            max_aspect: None,
            min_confidence: 0.0,
        }
    }
}

impl ClassRule {
    fn check(&self, candidate: &Candidate) -> Result<(), Rejection> {
        let aspect = candidate.bbox.aspect_ratio();
        let too_narrow = self.min_aspect.is_some_and(|min| aspect < min);
        let too_wide = self.max_aspect.is_some_and(|max| aspect > max);
        if too_narrow || too_wide {
            return Err(Rejection::Aspect { aspect });
        }
        if candidate.confidence < self.min_confidence {
            return Err(Rejection::Confidence {
                confidence: candidate.confidence,
                min: self.min_confidence,
            });
        }
        Ok(())
    }
}

/// Thresholds a backend's own output is filtered with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionProfile {
    /// Candidates below this confidence are dropped before NMS
    pub score_threshold: f32,

    /// Boxes overlapping a stronger box by more than this IoU are dropped
    pub nms_iou: f32,

    /// Accepted box area / frame area range (inclusive)
    pub min_size_ratio: f32,
    pub max_size_ratio: f32,

    /// Minimum box width and height in pixels
    pub min_side_px: u32,

    /// Maximum box width (height) as a fraction of frame width (height)
    pub max_side_fraction: f32,

    pub person: ClassRule,
    pub vehicle: ClassRule,
    pub face: ClassRule,

    /// Confidence floor for classes outside the counted categories
    pub other_min_confidence: f32,
}

impl Default for SuppressionProfile {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_iou: 0.35,
            min_size_ratio: 0.0,
            max_size_ratio: 1.0,
            min_side_px: 0,
            max_side_fraction: 1.0,
            person: ClassRule::default(),
            vehicle: ClassRule::default(),
            face: ClassRule::default(),
            other_min_confidence: 0.0,
        }
    }
}

impl SuppressionProfile {
    /// YOLO/SSD precision chain
    pub fn precision() -> Self {
        Self {
            score_threshold: 0.70,
            nms_iou: 0.30,
            min_size_ratio: 0.005,
            max_size_ratio: 0.80,
            person: ClassRule {
                max_aspect: Some(1.2),
                min_confidence: 0.65,
                ..Default::default()
            },
            vehicle: ClassRule {
                min_aspect: Some(0.7),
                min_confidence: 0.60,
                ..Default::default()
            },
            other_min_confidence: 0.55,
            ..Default::default()
        }
    }

    /// Single YOLO network with relaxed thresholds
    pub fn improved() -> Self {
        Self {
            score_threshold: 0.55,
            nms_iou: 0.35,
            min_side_px: 20,
            max_side_fraction: 0.95,
            ..Default::default()
        }
    }

    /// Haar cascade vehicle detector
    pub fn cascade_vehicle() -> Self {
        Self {
            score_threshold: 0.0,
            nms_iou: 0.30,
            min_size_ratio: 0.01,
            max_size_ratio: 0.6,
            vehicle: ClassRule {
                min_aspect: Some(0.5),
                max_aspect: Some(2.5),
                min_confidence: 0.0,
            },
            ..Default::default()
        }
    }

    /// HOG pedestrian detector
    pub fn hog_person() -> Self {
        Self {
            score_threshold: 0.0,
            nms_iou: 0.35,
            ..Default::default()
        }
    }

    /// Generic SSD network
    pub fn generic_network() -> Self {
        Self {
            score_threshold: 0.5,
            nms_iou: 0.35,
            ..Default::default()
        }
    }

    /// Face network
    pub fn face() -> Self {
        Self {
            score_threshold: 0.6,
            nms_iou: 0.30,
            ..Default::default()
        }
    }

    /// Synthetic generator; nothing is suppressed
    pub fn synthetic() -> Self {
        Self {
            score_threshold: 0.0,
            nms_iou: 1.0,
            ..Default::default()
        }
    }

    /// Geometry and class checks for one candidate in a `frame_w` x `frame_h` frame
    pub fn check(
        &self,
        candidate: &Candidate,
        frame_w: u32,
        frame_h: u32,
    ) -> Result<(), Rejection> {
        let bbox = &candidate.bbox;

        let ratio = bbox.area_ratio(frame_w, frame_h);
        if ratio < self.min_size_ratio || ratio > self.max_size_ratio {
            return Err(Rejection::SizeRatio {
                ratio,
                min: self.min_size_ratio,
                max: self.max_size_ratio,
            });
        }

        let side = bbox.width.min(bbox.height);
        if side < self.min_side_px {
            return Err(Rejection::TooSmall {
                side,
                min: self.min_side_px,
            });
        }

        if bbox.width as f32 > frame_w as f32 * self.max_side_fraction
            || bbox.height as f32 > frame_h as f32 * self.max_side_fraction
        {
            return Err(Rejection::TooLarge {
                fraction: self.max_side_fraction,
            });
        }

        match (candidate.class, candidate.class.category()) {
            (_, Some(Category::Person)) => self.person.check(candidate),
            (_, Some(Category::Vehicle)) => self.vehicle.check(candidate),
            (ObjectClass::Face, None) => self.face.check(candidate),
            _ if candidate.confidence < self.other_min_confidence => Err(Rejection::Confidence {
                confidence: candidate.confidence,
                min: self.other_min_confidence,
            }),
            _ => Ok(()),
        }
    }

    /// Threshold sanity, used when validating engine configuration
    pub fn validate(&self) -> Result<(), String> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.score_threshold) {
            return Err(format!("score_threshold {} not in [0, 1]", self.score_threshold));
        }
        if !unit.contains(&self.nms_iou) {
            return Err(format!("nms_iou {} not in [0, 1]", self.nms_iou));
        }
        if self.min_size_ratio < 0.0 || self.min_size_ratio > self.max_size_ratio {
            return Err(format!(
                "size ratio range [{}, {}] is inverted or negative",
                self.min_size_ratio, self.max_size_ratio
            ));
        }
        if self.max_side_fraction <= 0.0 {
            return Err("max_side_fraction must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vision_frame::BoundingBox;

    fn candidate(w: u32, h: u32, class: ObjectClass, confidence: f32) -> Candidate {
        Candidate::new(BoundingBox::new(0, 0, w, h), class, confidence)
    }

    #[test]
    fn test_size_ratio_boundary() {
        let profile = SuppressionProfile::precision();
        // 0.005 of a 100x100 frame is 50px²
        assert!(profile.check(&candidate(10, 5, ObjectClass::Car, 0.9), 100, 100).is_ok());
        assert!(matches!(
            profile.check(&candidate(7, 7, ObjectClass::Car, 0.9), 100, 100),
            Err(Rejection::SizeRatio { .. })
        ));
    }

    #[test]
    fn test_max_size_ratio_is_inclusive() {
        let profile = SuppressionProfile::precision();
        // 0.80 of a 100x100 frame is 8000px²
        for (w, h, class) in [
            (80, 100, ObjectClass::Person),
            (100, 80, ObjectClass::Car),
            (80, 100, ObjectClass::Face),
        ] {
            assert!(profile.check(&candidate(w, h, class, 0.9), 100, 100).is_ok(), "{:?}", class);
        }
        for (w, h, class) in [
            (81, 100, ObjectClass::Person),
            (100, 81, ObjectClass::Car),
            (81, 100, ObjectClass::Face),
        ] {
            assert!(matches!(
                profile.check(&candidate(w, h, class, 0.9), 100, 100),
                Err(Rejection::SizeRatio { .. })
            ));
        }
    }

    #[test]
    fn test_precision_class_rules() {
        let profile = SuppressionProfile::precision();
        // tall person passes, wide person fails the aspect limit
        assert!(profile.check(&candidate(40, 100, ObjectClass::Person, 0.9), 640, 480).is_ok());
        assert!(matches!(
            profile.check(&candidate(130, 100, ObjectClass::Person, 0.9), 640, 480),
            Err(Rejection::Aspect { .. })
        ));
        assert!(matches!(
            profile.check(&candidate(100, 60, ObjectClass::Truck, 0.58), 640, 480),
            Err(Rejection::Confidence { .. })
        ));
        assert!(matches!(
            profile.check(&candidate(100, 60, ObjectClass::Other(15), 0.5), 640, 480),
            Err(Rejection::Confidence { .. })
        ));
    }

    #[test]
    fn test_improved_pixel_limits() {
        let profile = SuppressionProfile::improved();
        assert!(matches!(
            profile.check(&candidate(19, 50, ObjectClass::Person, 0.9), 640, 480),
            Err(Rejection::TooSmall { side: 19, min: 20 })
        ));
        assert!(matches!(
            profile.check(&candidate(620, 100, ObjectClass::Car, 0.9), 640, 480),
            Err(Rejection::TooLarge { .. })
        ));
        assert!(profile.check(&candidate(20, 20, ObjectClass::Person, 0.9), 640, 480).is_ok());
    }

    #[test]
    fn test_cascade_aspect_window() {
        let profile = SuppressionProfile::cascade_vehicle();
        assert!(profile.check(&candidate(120, 80, ObjectClass::Vehicle, 0.8), 640, 480).is_ok());
        assert!(profile.check(&candidate(300, 80, ObjectClass::Vehicle, 0.8), 640, 480).is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let profile = SuppressionProfile {
            min_size_ratio: 0.5,
            max_size_ratio: 0.1,
            ..Default::default()
        };
        assert!(profile.validate().is_err());
        assert!(SuppressionProfile::precision().validate().is_ok());
    }
}
