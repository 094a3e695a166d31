//! Frame-to-frame box smoothing per category

use std::time::{Duration, Instant};

use detectors::{Category, ObjectClass};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vision_frame::BoundingBox;

use crate::suppression::Detection;

/// Box emitted by the tracker for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedBox {
    pub bbox: BoundingBox,
    pub category: Category,
    /// Class of the most recent detection matched to this box
    pub class: ObjectClass,
    pub confidence: f32,
}

impl TrackedBox {
    pub fn from_detection(detection: &Detection, category: Category) -> Self {
        Self {
            bbox: detection.bbox,
            category,
            class: detection.class,
            confidence: detection.confidence,
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a new box to match a previous one
    pub match_iou: f32,

    /// A box that was not re-detected is carried for at most this long (seconds)
    pub carry_forward_secs: f32,

    /// Gap after which history is ignored (seconds)
    pub scene_cut_secs: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_iou: 0.3,
            carry_forward_secs: 0.5,
            scene_cut_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    tracked: TrackedBox,
    /// Last time a detection fed this box
    seen: Instant,
}

#[derive(Debug, Default)]
struct CategoryState {
    tracks: Vec<Track>,
    last_update: Option<Instant>,
}

/// `(7 * new + 3 * prev) / 10` per component, truncated
fn blend(new: &BoundingBox, prev: &BoundingBox) -> BoundingBox {
    let mix = |n: u32, p: u32| ((7 * n as u64 + 3 * p as u64) / 10) as u32;
    BoundingBox::new(
        mix(new.x, prev.x),
        mix(new.y, prev.y),
        mix(new.width, prev.width),
        mix(new.height, prev.height),
    )
}

/// Matches each frame's boxes against the previous frame, per category
pub struct TemporalTracker {
    config: TrackerConfig,
    persons: CategoryState,
    vehicles: CategoryState,
}

impl TemporalTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            persons: CategoryState::default(),
            vehicles: CategoryState::default(),
        }
    }

    /// Smooth `boxes` against the category's previous output at time `now`
    pub fn update(
        &mut self,
        category: Category,
        boxes: Vec<TrackedBox>,
        now: Instant,
    ) -> Vec<TrackedBox> {
        let match_iou = self.config.match_iou;
        let carry = Duration::from_secs_f32(self.config.carry_forward_secs.max(0.0));
        let scene_cut = Duration::from_secs_f32(self.config.scene_cut_secs.max(0.0));
        let state = match category {
            Category::Person => &mut self.persons,
            Category::Vehicle => &mut self.vehicles,
        };

        let gap = state.last_update.map(|t| now.saturating_duration_since(t));
        let history_usable = !state.tracks.is_empty() && gap.is_some_and(|g| g <= scene_cut);

        let tracks = if history_usable {
            let previous = &state.tracks;
            let mut matched = vec![false; previous.len()];
            let mut tracks = Vec::with_capacity(boxes.len() + previous.len());

            for new in boxes {
                let mut best: Option<(usize, f32)> = None;
                for (i, prev) in previous.iter().enumerate() {
                    if matched[i] {
                        continue;
                    }
                    let iou = new.bbox.iou(&prev.tracked.bbox);
                    if iou >= match_iou && best.map_or(true, |(_, b)| iou > b) {
                        best = Some((i, iou));
                    }
                }

                let tracked = match best {
                    Some((i, _)) => {
                        matched[i] = true;
                        TrackedBox {
                            bbox: blend(&new.bbox, &previous[i].tracked.bbox),
                            ..new
                        }
                    }
                    None => new,
                };
                tracks.push(Track { tracked, seen: now });
            }

            let carried: Vec<Track> = previous
                .iter()
                .zip(&matched)
                .filter(|(t, m)| !**m && now.saturating_duration_since(t.seen) < carry)
                .map(|(t, _)| t.clone())
                .collect();
            if !carried.is_empty() {
                debug!("Carrying {} unmatched {:?} boxes", carried.len(), category);
            }
            tracks.extend(carried);
            tracks
        } else {
            boxes.into_iter().map(|tracked| Track { tracked, seen: now }).collect()
        };

        state.tracks = tracks;
        state.last_update = Some(now);
        state.tracks.iter().map(|t| t.tracked.clone()).collect()
    }

    /// Drop all history
    pub fn reset(&mut self) {
        self.persons = CategoryState::default();
        self.vehicles = CategoryState::default();
    }
}

impl Default for TemporalTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tb(x: u32, y: u32, w: u32, h: u32) -> TrackedBox {
        TrackedBox {
            bbox: BoundingBox::new(x, y, w, h),
            category: Category::Vehicle,
            class: ObjectClass::Car,
            confidence: 0.9,
        }
    }

    fn ms(t: Instant, millis: u64) -> Instant {
        t + Duration::from_millis(millis)
    }

    #[test]
    fn test_identity_without_history() {
        let mut tracker = TemporalTracker::default();
        let boxes = vec![tb(1, 2, 30, 40), tb(200, 100, 50, 50)];
        let out = tracker.update(Category::Vehicle, boxes.clone(), Instant::now());
        assert_eq!(out, boxes);
    }

    #[test]
    fn test_blend_reference_pair() {
        let mut tracker = TemporalTracker::default();
        let t0 = Instant::now();
        tracker.update(Category::Vehicle, vec![tb(100, 100, 50, 50)], t0);
        let out = tracker.update(Category::Vehicle, vec![tb(110, 105, 52, 50)], ms(t0, 40));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox.to_array(), [107, 103, 51, 50]);
    }

    #[test]
    fn test_scene_cut_skips_matching() {
        let mut tracker = TemporalTracker::default();
        let t0 = Instant::now();
        tracker.update(Category::Vehicle, vec![tb(100, 100, 50, 50)], t0);
        let out = tracker.update(Category::Vehicle, vec![tb(110, 105, 52, 50)], ms(t0, 1100));
        assert_eq!(out, vec![tb(110, 105, 52, 50)]);
    }

    #[test]
    fn test_unmatched_box_carried_briefly() {
        let mut tracker = TemporalTracker::default();
        let t0 = Instant::now();
        tracker.update(Category::Vehicle, vec![tb(100, 100, 50, 50)], t0);

        let out = tracker.update(Category::Vehicle, vec![], ms(t0, 100));
        assert_eq!(out, vec![tb(100, 100, 50, 50)]);

        // no detection fed it for 0.5s
        let out = tracker.update(Category::Vehicle, vec![], ms(t0, 500));
        assert!(out.is_empty());
    }

    #[test]
    fn test_stale_box_dropped_at_high_frame_rate() {
        let mut tracker = TemporalTracker::default();
        let t0 = Instant::now();
        tracker.update(Category::Vehicle, vec![tb(100, 100, 50, 50)], t0);
        let mut out = Vec::new();
        for frame in 1..=20 {
            out = tracker.update(Category::Vehicle, vec![], ms(t0, frame * 40));
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_categories_are_independent() {
        let mut tracker = TemporalTracker::default();
        let t0 = Instant::now();
        tracker.update(Category::Vehicle, vec![tb(100, 100, 50, 50)], t0);
        let persons = tracker.update(Category::Person, vec![], ms(t0, 40));
        assert!(persons.is_empty());
        // the vehicle history is untouched by the person update
        let vehicles = tracker.update(Category::Vehicle, vec![], ms(t0, 80));
        assert_eq!(vehicles, vec![tb(100, 100, 50, 50)]);
    }

    #[test]
    fn test_each_previous_box_matches_once() {
        let mut tracker = TemporalTracker::default();
        let t0 = Instant::now();
        tracker.update(Category::Vehicle, vec![tb(100, 100, 50, 50)], t0);
        let out = tracker.update(
            Category::Vehicle,
            vec![tb(100, 100, 50, 50), tb(102, 100, 50, 50)],
            ms(t0, 40),
        );
        // second box finds the previous one taken and passes through
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], tb(102, 100, 50, 50));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut tracker = TemporalTracker::default();
        let t0 = Instant::now();
        tracker.update(Category::Vehicle, vec![tb(100, 100, 50, 50)], t0);
        tracker.reset();
        let out = tracker.update(Category::Vehicle, vec![tb(110, 105, 52, 50)], ms(t0, 40));
        assert_eq!(out, vec![tb(110, 105, 52, 50)]);
    }

    proptest! {
        #[test]
        fn prop_no_history_is_identity(
            boxes in proptest::collection::vec((0u32..600, 0u32..400, 1u32..100, 1u32..100), 0..10),
        ) {
            let boxes: Vec<TrackedBox> = boxes.iter().map(|&(x, y, w, h)| tb(x, y, w, h)).collect();
            let mut tracker = TemporalTracker::default();
            prop_assert_eq!(tracker.update(Category::Person, boxes.clone(), Instant::now()), boxes);
        }

        #[test]
        fn prop_blend_stays_between_inputs(a in 0u32..2000, b in 0u32..2000) {
            let out = blend(&BoundingBox::new(a, a, a, a), &BoundingBox::new(b, b, b, b));
            prop_assert!(out.x >= a.min(b) && out.x <= a.max(b));
        }
    }
}
