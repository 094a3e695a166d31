//! Candidate validation and non-maximum suppression

use std::cmp::Ordering;

use detectors::{Candidate, Category, ObjectClass, SuppressionProfile};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vision_frame::BoundingBox;

/// Candidate that survived suppression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class: ObjectClass,
    pub confidence: f32,
}

impl From<Candidate> for Detection {
    fn from(c: Candidate) -> Self {
        Self {
            bbox: c.bbox,
            class: c.class,
            confidence: c.confidence,
        }
    }
}

/// Survivors split by category
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suppressed {
    pub persons: Vec<Detection>,
    pub vehicles: Vec<Detection>,
    pub faces: Vec<Detection>,
}

impl Suppressed {
    /// No person or vehicle survived
    pub fn has_bodies(&self) -> bool {
        !self.persons.is_empty() || !self.vehicles.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Person,
    Vehicle,
    Face,
}

fn bucket(class: ObjectClass) -> Option<Bucket> {
    match class.category() {
        Some(Category::Person) => Some(Bucket::Person),
        Some(Category::Vehicle) => Some(Bucket::Vehicle),
        None if class == ObjectClass::Face => Some(Bucket::Face),
        None => None,
    }
}

/// Stateless validation + NMS
pub struct SuppressionStage;

impl SuppressionStage {
    /// Validate, suppress and split one backend's candidates
    pub fn apply(
        profile: &SuppressionProfile,
        candidates: Vec<Candidate>,
        frame_w: u32,
        frame_h: u32,
    ) -> Suppressed {
        let mut persons = Vec::new();
        let mut vehicles = Vec::new();
        let mut faces = Vec::new();

        for candidate in candidates {
            if let Err(reason) = profile.check(&candidate, frame_w, frame_h) {
                debug!("Rejected {} candidate: {}", candidate.class.label(), reason);
                continue;
            }
            match bucket(candidate.class) {
                Some(Bucket::Person) => persons.push(candidate),
                Some(Bucket::Vehicle) => vehicles.push(candidate),
                Some(Bucket::Face) => faces.push(candidate),
                None => {}
            }
        }

        Suppressed {
            persons: Self::nms(persons, profile.score_threshold, profile.nms_iou),
            vehicles: Self::nms(vehicles, profile.score_threshold, profile.nms_iou),
            faces: Self::nms(faces, profile.score_threshold, profile.nms_iou),
        }
    }

    /// Greedy NMS: strongest first, a box survives if its IoU with every kept
    /// box is at most `iou_cutoff`. Equal confidences keep input order.
    pub fn nms(
        candidates: Vec<Candidate>,
        score_threshold: f32,
        iou_cutoff: f32,
    ) -> Vec<Detection> {
        let mut ranked: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.confidence >= score_threshold)
            .collect();
        ranked.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));

        let mut kept: Vec<Detection> = Vec::with_capacity(ranked.len());
        for candidate in ranked {
            if kept.iter().all(|k| k.bbox.iou(&candidate.bbox) <= iou_cutoff) {
                kept.push(candidate.into());
            }
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cand(x: u32, y: u32, w: u32, h: u32, class: ObjectClass, confidence: f32) -> Candidate {
        Candidate::new(BoundingBox::new(x, y, w, h), class, confidence)
    }

    #[test]
    fn test_overlapping_boxes_keep_strongest() {
        let candidates = vec![
            cand(100, 100, 50, 100, ObjectClass::Person, 0.8),
            cand(102, 101, 50, 100, ObjectClass::Person, 0.9),
            cand(400, 100, 50, 100, ObjectClass::Person, 0.75),
        ];
        let out = SuppressionStage::apply(&SuppressionProfile::precision(), candidates, 640, 480);
        assert_eq!(out.persons.len(), 2);
        assert_eq!(out.persons[0].confidence, 0.9);
        assert_eq!(out.persons[1].bbox.x, 400);
    }

    #[test]
    fn test_nms_is_per_category() {
        // same box reported as person and car
        let candidates = vec![
            cand(100, 100, 80, 90, ObjectClass::Person, 0.9),
            cand(100, 100, 80, 90, ObjectClass::Car, 0.9),
        ];
        let out = SuppressionStage::apply(&SuppressionProfile::improved(), candidates, 640, 480);
        assert_eq!(out.persons.len(), 1);
        assert_eq!(out.vehicles.len(), 1);
    }

    #[test]
    fn test_score_threshold_and_other_classes() {
        let candidates = vec![
            cand(10, 10, 100, 100, ObjectClass::Car, 0.5),
            cand(200, 10, 100, 100, ObjectClass::Other(16), 0.99),
        ];
        let out = SuppressionStage::apply(&SuppressionProfile::improved(), candidates, 640, 480);
        assert!(!out.has_bodies());
        assert!(out.faces.is_empty());
    }

    #[test]
    fn test_min_size_ratio_boundary() {
        let profile = SuppressionProfile {
            min_size_ratio: 0.01,
            ..SuppressionProfile::generic_network()
        };
        // 100x100 frame: 10x10 is exactly 1%, 9x10 is below
        let at_min = vec![cand(0, 0, 10, 10, ObjectClass::Car, 0.9)];
        let at_min = SuppressionStage::apply(&profile, at_min, 100, 100);
        assert_eq!(at_min.vehicles.len(), 1);
        let below = vec![cand(0, 0, 9, 10, ObjectClass::Car, 0.9)];
        let below = SuppressionStage::apply(&profile, below, 100, 100);
        assert!(below.vehicles.is_empty());
    }

    #[test]
    fn test_max_size_ratio_boundary() {
        let profile = SuppressionProfile::precision();
        // 100x100 frame: 80% of the area is kept, 81% is dropped
        let at_max = vec![
            cand(0, 0, 80, 100, ObjectClass::Person, 0.9),
            cand(0, 0, 100, 80, ObjectClass::Car, 0.9),
            cand(0, 0, 80, 100, ObjectClass::Face, 0.9),
        ];
        let out = SuppressionStage::apply(&profile, at_max, 100, 100);
        assert_eq!((out.persons.len(), out.vehicles.len(), out.faces.len()), (1, 1, 1));

        let above = vec![
            cand(0, 0, 81, 100, ObjectClass::Person, 0.9),
            cand(0, 0, 100, 81, ObjectClass::Car, 0.9),
            cand(0, 0, 81, 100, ObjectClass::Face, 0.9),
        ];
        let out = SuppressionStage::apply(&profile, above, 100, 100);
        assert!(!out.has_bodies());
        assert!(out.faces.is_empty());
    }

    #[test]
    fn test_faces_split_out() {
        let candidates = vec![cand(10, 10, 30, 30, ObjectClass::Face, 0.8)];
        let out = SuppressionStage::apply(&SuppressionProfile::face(), candidates, 320, 240);
        assert_eq!(out.faces.len(), 1);
        assert!(!out.has_bodies());
    }

    #[test]
    fn test_equal_confidence_keeps_input_order() {
        let kept = SuppressionStage::nms(
            vec![
                cand(0, 0, 50, 50, ObjectClass::Car, 0.7),
                cand(1, 1, 50, 50, ObjectClass::Car, 0.7),
            ],
            0.0,
            0.3,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bbox.x, 0);
    }

    proptest! {
        #[test]
        fn prop_kept_boxes_do_not_overlap_beyond_cutoff(
            boxes in proptest::collection::vec(
                (0u32..400, 0u32..300, 10u32..120, 10u32..120, 0.0f32..1.0),
                0..25,
            ),
            cutoff in 0.1f32..0.9,
        ) {
            let candidates: Vec<Candidate> = boxes
                .iter()
                .map(|&(x, y, w, h, c)| cand(x, y, w, h, ObjectClass::Car, c))
                .collect();
            let total = candidates.len();
            let kept = SuppressionStage::nms(candidates, 0.0, cutoff);
            prop_assert!(kept.len() <= total);
            for (i, a) in kept.iter().enumerate() {
                for b in kept.iter().skip(i + 1) {
                    prop_assert!(a.bbox.iou(&b.bbox) <= cutoff);
                }
            }
        }
    }
}
