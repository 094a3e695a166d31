//! Haar cascade vehicle detector (Viola-Jones)

use std::path::Path;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use tracing::{debug, info, warn};
use vision_frame::{BoundingBox, VideoFrame};

use super::group_rectangles;
use crate::backend::{BackendKind, CandidateDetector};
use crate::candidate::{Candidate, ObjectClass};
use crate::config::DetectorsConfig;
use crate::profile::SuppressionProfile;
use crate::DetectorError;

type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

/// Weighted rectangle in base-window coordinates.
///
/// For tilted features `(x, y)` is the top corner of a rectangle rotated by
/// 45 degrees; `width` runs down-right and `height` down-left.
#[derive(Debug, Clone, PartialEq)]
pub struct HaarRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<HaarRect>,
    pub tilted: bool,
}

/// Child of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Index into the tree's nodes
    Node(usize),
    /// Index into the tree's leaf values
    Leaf(usize),
}

/// Split on one feature: `left` when the normalised value is below `threshold`
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub feature: usize,
    pub threshold: f32,
    pub left: Branch,
    pub right: Branch,
}

/// Boosted weak classifier; a stump is a single node with two leaves
#[derive(Debug, Clone, PartialEq)]
pub struct WeakTree {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f32>,
}

impl WeakTree {
    fn eval(&self, mut feature_value: impl FnMut(usize) -> f32) -> f32 {
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            let branch = if feature_value(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            match branch {
                Branch::Node(next) => index = next,
                Branch::Leaf(leaf) => return self.leaves[leaf],
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarStage {
    /// Sum of tree outputs needed to pass the stage
    pub threshold: f32,
    pub trees: Vec<WeakTree>,
}

/// Boosted Haar cascade, loaded from an OpenCV cascade XML file
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeModel {
    pub window_width: u32,
    pub window_height: u32,
    pub features: Vec<HaarFeature>,
    pub stages: Vec<HaarStage>,
}

impl CascadeModel {
    pub fn from_path(path: &Path) -> Result<Self, DetectorError> {
        let load_err = |e: String| DetectorError::ModelLoad(format!("{}: {}", path.display(), e));
        let text = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        Self::from_xml(&text).map_err(|e| match e {
            DetectorError::ModelLoad(msg) => load_err(msg),
            other => other,
        })
    }

    pub fn has_tilted(&self) -> bool {
        self.features.iter().any(|f| f.tilted)
    }

    /// Structural checks; a model that passes can be evaluated without
    /// out-of-range indexing or endless tree walks
    pub fn validate(&self) -> Result<(), DetectorError> {
        let fail = |msg: String| Err(DetectorError::ModelLoad(msg));
        let (w, h) = (self.window_width, self.window_height);
        if w == 0 || h == 0 {
            return fail("cascade window has zero size".to_string());
        }
        if self.stages.is_empty() {
            return fail("cascade has no stages".to_string());
        }

        for (i, feature) in self.features.iter().enumerate() {
            if feature.rects.is_empty() {
                return fail(format!("feature {} has no rectangles", i));
            }
            let inside = feature.rects.iter().all(|r| {
                r.width > 0
                    && r.height > 0
                    && if feature.tilted {
                        r.x >= r.height && r.x + r.width <= w && r.y + r.width + r.height <= h
                    } else {
                        r.x + r.width <= w && r.y + r.height <= h
                    }
            });
            if !inside {
                return fail(format!("feature {} has a rectangle outside the window", i));
            }
        }

        for (s, stage) in self.stages.iter().enumerate() {
            for tree in &stage.trees {
                if tree.nodes.is_empty() {
                    return fail(format!("stage {} has an empty tree", s));
                }
                for (n, node) in tree.nodes.iter().enumerate() {
                    if node.feature >= self.features.len() {
                        return fail(format!(
                            "stage {} references missing feature {}",
                            s, node.feature
                        ));
                    }
                    for branch in [node.left, node.right] {
                        let ok = match branch {
                            Branch::Node(next) => next > n && next < tree.nodes.len(),
                            Branch::Leaf(leaf) => leaf < tree.leaves.len(),
                        };
                        if !ok {
                            return fail(format!("stage {} has a tree branch out of range", s));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Sum of pixels in `[x, x+w) x [y, y+h)` from a zero-padded integral image
fn rect_sum(ii: &Integral, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let a = ii.get_pixel(x, y)[0];
    let b = ii.get_pixel(x + w, y)[0];
    let c = ii.get_pixel(x, y + h)[0];
    let d = ii.get_pixel(x + w, y + h)[0];
    (d + a).saturating_sub(b + c)
}

/// Rotated summed-area table.
///
/// `at(X, Y)` is the sum of pixels `(x, y)` with `y < Y` and
/// `|x - X + 1| <= Y - y - 1`, for `0 <= X <= width`, `0 <= Y <= height`.
struct TiltedIntegral {
    pad: i64,
    stride: i64,
    data: Vec<i64>,
}

impl TiltedIntegral {
    fn new(gray: &GrayImage) -> Self {
        let (w, h) = (gray.width() as i64, gray.height() as i64);
        // columns outside the image are kept so the recurrence never clips
        let pad = h + 2;
        let stride = w + 1 + 2 * pad;
        let mut data = vec![0i64; (stride * (h + 1)) as usize];

        let pixel = |x: i64, y: i64| -> i64 {
            if x < 0 || y < 0 || x >= w || y >= h {
                0
            } else {
                gray.get_pixel(x as u32, y as u32)[0] as i64
            }
        };
        let get = |data: &[i64], col: i64, row: i64| -> i64 {
            if row < 0 {
                0
            } else {
                data[(row * stride + col) as usize]
            }
        };

        for row in 1..=h {
            for col in 1..stride - 1 {
                let x = col - pad;
                let value = get(&data, col - 1, row - 1) + get(&data, col + 1, row - 1)
                    - get(&data, col, row - 2)
                    + pixel(x - 1, row - 1)
                    + pixel(x - 1, row - 2);
                data[(row * stride + col) as usize] = value;
            }
        }

        Self { pad, stride, data }
    }

    fn at(&self, x: i64, y: i64) -> i64 {
        self.data[(y * self.stride + x + self.pad) as usize]
    }

    /// Sum over a 45-degree rectangle with top corner `(x, y)`
    fn rect_sum(&self, x: i64, y: i64, w: i64, h: i64) -> i64 {
        self.at(x, y) - self.at(x - h, y + h) - self.at(x + w, y + w)
            + self.at(x + w - h, y + w + h)
    }
}

struct Integrals {
    sum: Integral,
    squared: Integral,
    tilted: Option<TiltedIntegral>,
}

impl Integrals {
    fn new(gray: &GrayImage, with_tilted: bool) -> Self {
        Self {
            sum: integral_image::<_, u64>(gray),
            squared: integral_squared_image::<_, u64>(gray),
            tilted: with_tilted.then(|| TiltedIntegral::new(gray)),
        }
    }
}

/// One detection window at one scale
struct Window<'a> {
    integrals: &'a Integrals,
    x: u32,
    y: u32,
    scale: f32,
    /// Window area times its intensity standard deviation
    norm: f64,
}

impl Window<'_> {
    fn feature_value(&self, feature: &HaarFeature) -> f32 {
        let scaled = |v: u32| (v as f32 * self.scale) as u32;
        let mut value = 0.0f64;
        for r in &feature.rects {
            let (rx, ry, rw, rh) = (scaled(r.x), scaled(r.y), scaled(r.width), scaled(r.height));
            let sum = if feature.tilted {
                match &self.integrals.tilted {
                    Some(tilted) => tilted.rect_sum(
                        (self.x + rx) as i64,
                        (self.y + ry) as i64,
                        rw as i64,
                        rh as i64,
                    ) as f64,
                    None => 0.0,
                }
            } else {
                rect_sum(&self.integrals.sum, self.x + rx, self.y + ry, rw, rh) as f64
            };
            value += r.weight as f64 * sum;
        }
        (value / self.norm) as f32
    }
}

/// Multi-scale search parameters
#[derive(Debug, Clone, Copy)]
struct SearchParams {
    scale_factor: f32,
    min_neighbors: usize,
    min_window: u32,
}

const SEARCH: SearchParams = SearchParams {
    scale_factor: 1.1,
    min_neighbors: 3,
    min_window: 60,
};

pub struct CascadeVehicleDetector {
    model: Option<CascadeModel>,
    profile: SuppressionProfile,
}

impl CascadeVehicleDetector {
    pub fn new(config: &DetectorsConfig) -> Self {
        let model = match &config.vehicle_cascade {
            Some(path) => {
                info!("Loading vehicle cascade from {}", path.display());
                match CascadeModel::from_path(path) {
                    Ok(model) => Some(model),
                    Err(e) => {
                        warn!("Failed to load vehicle cascade: {}", e);
                        None
                    }
                }
            }
            None => {
                warn!("No vehicle cascade configured. Backend stays unavailable.");
                None
            }
        };
        Self::from_model(model)
    }

    pub fn from_model(model: Option<CascadeModel>) -> Self {
        Self {
            model,
            profile: SuppressionProfile::cascade_vehicle(),
        }
    }

    fn window_passes(
        model: &CascadeModel,
        integrals: &Integrals,
        x: u32,
        y: u32,
        scale: f32,
    ) -> bool {
        let win_w = (model.window_width as f32 * scale) as u32;
        let win_h = (model.window_height as f32 * scale) as u32;
        let area = (win_w as u64 * win_h as u64) as f64;
        let mean = rect_sum(&integrals.sum, x, y, win_w, win_h) as f64 / area;
        let variance = rect_sum(&integrals.squared, x, y, win_w, win_h) as f64 / area - mean * mean;
        let std = variance.max(0.0).sqrt().max(1.0);

        let window = Window {
            integrals,
            x,
            y,
            scale,
            norm: area * std,
        };
        model.stages.iter().all(|stage| {
            let total: f32 = stage
                .trees
                .iter()
                .map(|tree| tree.eval(|f| window.feature_value(&model.features[f])))
                .sum();
            total >= stage.threshold
        })
    }
}

impl CandidateDetector for CascadeVehicleDetector {
    fn name(&self) -> &str {
        "cascade-vehicle"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::CascadeVehicle
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    fn profile(&self) -> &SuppressionProfile {
        &self.profile
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Candidate>, DetectorError> {
        let Some(model) = &self.model else {
            return Ok(Vec::new());
        };
        frame.validate()?;
        let gray = frame
            .to_gray_image()
            .ok_or_else(|| {
                DetectorError::Inference("frame buffer does not match dimensions".to_string())
            })?;
        let integrals = Integrals::new(&gray, model.has_tilted());

        let (fw, fh) = (frame.width, frame.height);
        let base = model.window_width.min(model.window_height) as f32;
        let mut scale = (SEARCH.min_window as f32 / base).max(1.0);
        let mut hits = Vec::new();

        loop {
            let win_w = (model.window_width as f32 * scale) as u32;
            let win_h = (model.window_height as f32 * scale) as u32;
            if win_w > fw || win_h > fh {
                break;
            }
            let step = ((scale * 2.0).round() as usize).max(2);
            for y in (0..=fh - win_h).step_by(step) {
                for x in (0..=fw - win_w).step_by(step) {
                    if Self::window_passes(model, &integrals, x, y, scale) {
                        hits.push((BoundingBox::new(x, y, win_w, win_h), 0.0));
                    }
                }
            }
            scale *= SEARCH.scale_factor;
        }

        let grouped = group_rectangles(&hits, SEARCH.min_neighbors);
        debug!("Cascade: {} raw hits, {} groups", hits.len(), grouped.len());

        Ok(grouped
            .into_iter()
            .map(|(bbox, count, _)| {
                let confidence = count as f32 / (count + SEARCH.min_neighbors) as f32;
                Candidate::new(bbox, ObjectClass::Vehicle, confidence)
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn stump(feature: usize, threshold: f32, left: f32, right: f32) -> WeakTree {
        WeakTree {
            nodes: vec![TreeNode {
                feature,
                threshold,
                left: Branch::Leaf(0),
                right: Branch::Leaf(1),
            }],
            leaves: vec![left, right],
        }
    }

    fn rect(x: u32, y: u32, width: u32, height: u32, weight: f32) -> HaarRect {
        HaarRect {
            x,
            y,
            width,
            height,
            weight,
        }
    }

    /// One stump firing on a bright top half over a dark bottom half
    fn edge_cascade() -> CascadeModel {
        CascadeModel {
            window_width: 24,
            window_height: 24,
            features: vec![HaarFeature {
                rects: vec![rect(0, 0, 24, 12, 1.0), rect(0, 12, 24, 12, -1.0)],
                tilted: false,
            }],
            stages: vec![HaarStage {
                threshold: 0.0,
                trees: vec![stump(0, 0.5, -1.0, 1.0)],
            }],
        }
    }

    pub(crate) fn edge_frame() -> VideoFrame {
        let mut frame = VideoFrame::solid(200, 200, [0, 0, 0]);
        frame.fill_rect(&BoundingBox::new(40, 40, 120, 60), [255, 255, 255]);
        frame
    }

    /// Pixel value unique per position
    fn patterned(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([(1 + x + 10 * y) as u8]))
    }

    #[test]
    fn test_uniform_frame_has_no_hits() {
        let mut detector = CascadeVehicleDetector::from_model(Some(edge_cascade()));
        let frame = VideoFrame::solid(200, 200, [90, 90, 90]);
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_edge_pattern_is_detected_as_vehicle() {
        let mut detector = CascadeVehicleDetector::from_model(Some(edge_cascade()));
        let found = detector.detect(&edge_frame()).unwrap();
        assert!(!found.is_empty());
        assert!(found.iter().all(|c| c.class == ObjectClass::Vehicle));
        assert!(found.iter().all(|c| c.confidence > 0.5 && c.bbox.width >= 60));
    }

    #[test]
    fn test_deeper_tree_walks_to_right_leaf() {
        // root sends high values to node 1, which splits again
        let tree = WeakTree {
            nodes: vec![
                TreeNode {
                    feature: 0,
                    threshold: 0.0,
                    left: Branch::Leaf(0),
                    right: Branch::Node(1),
                },
                TreeNode {
                    feature: 1,
                    threshold: 5.0,
                    left: Branch::Leaf(1),
                    right: Branch::Leaf(2),
                },
            ],
            leaves: vec![-1.0, 0.25, 0.75],
        };
        assert_eq!(tree.eval(|_| -1.0), -1.0);
        assert_eq!(tree.eval(|f| if f == 0 { 1.0 } else { 2.0 }), 0.25);
        assert_eq!(tree.eval(|_| 9.0), 0.75);
    }

    #[test]
    fn test_rejects_rect_outside_window() {
        let mut model = edge_cascade();
        model.features[0].rects[0].width = 30;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_rejects_tilted_rect_past_left_edge() {
        let mut model = edge_cascade();
        model.features.push(HaarFeature {
            rects: vec![rect(2, 0, 4, 4, 1.0)],
            tilted: true,
        });
        assert!(model.validate().is_err());
        model.features[1].rects[0].x = 4;
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_tree_references() {
        let mut model = edge_cascade();
        model.stages[0].trees[0].nodes[0].feature = 3;
        assert!(model.validate().is_err());

        let mut model = edge_cascade();
        model.stages[0].trees[0].nodes[0].left = Branch::Node(0);
        assert!(model.validate().is_err());

        let mut model = edge_cascade();
        model.stages[0].trees[0].nodes[0].right = Branch::Leaf(2);
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_tilted_integral_matches_definition() {
        let gray = patterned(7, 5);
        let tilted = TiltedIntegral::new(&gray);
        for big_y in 0..=5i64 {
            for big_x in 0..=7i64 {
                let mut expected = 0i64;
                for y in 0..big_y {
                    for x in 0..7i64 {
                        if (x - big_x + 1).abs() <= big_y - y - 1 {
                            expected += gray.get_pixel(x as u32, y as u32)[0] as i64;
                        }
                    }
                }
                assert_eq!(tilted.at(big_x, big_y), expected, "at ({}, {})", big_x, big_y);
            }
        }
    }

    #[test]
    fn test_unit_tilted_rect_covers_two_pixels() {
        let gray = patterned(8, 6);
        let tilted = TiltedIntegral::new(&gray);
        let expected = gray.get_pixel(2, 1)[0] as i64 + gray.get_pixel(2, 2)[0] as i64;
        assert_eq!(tilted.rect_sum(3, 1, 1, 1), expected);
    }

    #[test]
    fn test_missing_artifact_leaves_backend_unavailable() {
        let config = DetectorsConfig {
            vehicle_cascade: Some("/nonexistent/cars.xml".into()),
            ..Default::default()
        };
        let detector = CascadeVehicleDetector::new(&config);
        assert!(!detector.is_initialized());
    }
}
