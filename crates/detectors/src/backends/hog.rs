//! HOG + linear SVM pedestrian detector

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vision_frame::{BoundingBox, VideoFrame};

use super::group_rectangles;
use crate::backend::{BackendKind, CandidateDetector};
use crate::candidate::{Candidate, ObjectClass};
use crate::config::DetectorsConfig;
use crate::profile::SuppressionProfile;
use crate::DetectorError;

const CELL: u32 = 8;
const BINS: usize = 9;
const WINDOW_W: u32 = 64;
const WINDOW_H: u32 = 128;
/// 2x2 cells per block
const BLOCK_LEN: usize = 4 * BINS;
const L2HYS_CLIP: f32 = 0.2;

const MAX_WIDTH: u32 = 640;
const MAX_HEIGHT: u32 = 480;
const PYRAMID_SCALE: f32 = 1.05;
const MAX_LEVELS: usize = 64;
const GROUP_THRESHOLD: usize = 2;
const HIT_THRESHOLD: f32 = 0.0;

/// Cell histograms and normalised blocks of one image.
///
/// Blocks are 2x2 cells at a one-cell stride. Window descriptors list blocks
/// column-major and cells inside a block column-major.
pub struct HogDescriptor {
    cells_x: usize,
    cells_y: usize,
    blocks: Vec<[f32; BLOCK_LEN]>,
}

impl HogDescriptor {
    /// Descriptor length of one 64x128 window
    pub const WINDOW_LEN: usize = Self::WINDOW_BLOCKS_X * Self::WINDOW_BLOCKS_Y * BLOCK_LEN;
    const WINDOW_BLOCKS_X: usize = (WINDOW_W / CELL) as usize - 1;
    const WINDOW_BLOCKS_Y: usize = (WINDOW_H / CELL) as usize - 1;

    pub fn compute(image: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        let cells_x = (w / CELL) as usize;
        let cells_y = (h / CELL) as usize;
        let mut cells = vec![[0.0f32; BINS]; cells_x * cells_y];

        let px = |x: i64, y: i64| -> f32 {
            let x = x.clamp(0, w as i64 - 1) as u32;
            let y = y.clamp(0, h as i64 - 1) as u32;
            image.get_pixel(x, y)[0] as f32
        };

        let bin_width = 180.0 / BINS as f32;
        for cy in 0..cells_y {
            for cx in 0..cells_x {
                let hist = &mut cells[cy * cells_x + cx];
                for dy in 0..CELL as usize {
                    for dx in 0..CELL as usize {
                        let x = (cx * CELL as usize + dx) as i64;
                        let y = (cy * CELL as usize + dy) as i64;
                        let gx = px(x + 1, y) - px(x - 1, y);
                        let gy = px(x, y + 1) - px(x, y - 1);
                        let magnitude = (gx * gx + gy * gy).sqrt();
                        if magnitude == 0.0 {
                            continue;
                        }
                        let mut angle = gy.atan2(gx).to_degrees();
                        if angle < 0.0 {
                            angle += 180.0;
                        }
                        if angle >= 180.0 {
                            angle -= 180.0;
                        }
                        // linear vote between the two nearest bin centres
                        let pos = angle / bin_width - 0.5;
                        let lower = pos.floor();
                        let frac = pos - lower;
                        let b0 = (lower as i64).rem_euclid(BINS as i64) as usize;
                        let b1 = (b0 + 1) % BINS;
                        hist[b0] += magnitude * (1.0 - frac);
                        hist[b1] += magnitude * frac;
                    }
                }
            }
        }

        let blocks_x = cells_x.saturating_sub(1);
        let blocks_y = cells_y.saturating_sub(1);
        let mut blocks = Vec::with_capacity(blocks_x * blocks_y);
        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let mut block = [0.0f32; BLOCK_LEN];
                let order = [(0, 0), (0, 1), (1, 0), (1, 1)];
                for (i, (ox, oy)) in order.iter().enumerate() {
                    let cell = &cells[(by + oy) * cells_x + bx + ox];
                    block[i * BINS..(i + 1) * BINS].copy_from_slice(cell);
                }
                l2_hys(&mut block);
                blocks.push(block);
            }
        }

        Self { cells_x, cells_y, blocks }
    }

    /// Number of window positions (in cells) along each axis
    pub fn window_positions(&self) -> (usize, usize) {
        let win_cx = (WINDOW_W / CELL) as usize;
        let win_cy = (WINDOW_H / CELL) as usize;
        (
            (self.cells_x + 1).saturating_sub(win_cx),
            (self.cells_y + 1).saturating_sub(win_cy),
        )
    }

    /// Descriptor of the window whose top-left cell is (`cx`, `cy`)
    pub fn window(&self, cx: usize, cy: usize) -> Vec<f32> {
        let mut descriptor = Vec::with_capacity(Self::WINDOW_LEN);
        self.for_each_window_block(cx, cy, |block| descriptor.extend_from_slice(block));
        descriptor
    }

    fn for_each_window_block(&self, cx: usize, cy: usize, mut f: impl FnMut(&[f32; BLOCK_LEN])) {
        let blocks_x = self.cells_x.saturating_sub(1);
        for bx in 0..Self::WINDOW_BLOCKS_X {
            for by in 0..Self::WINDOW_BLOCKS_Y {
                f(&self.blocks[(cy + by) * blocks_x + cx + bx]);
            }
        }
    }

    /// SVM score of the window at (`cx`, `cy`)
    pub fn score(&self, svm: &HogSvm, cx: usize, cy: usize) -> f32 {
        let mut sum = svm.bias;
        let mut offset = 0;
        self.for_each_window_block(cx, cy, |block| {
            sum += block
                .iter()
                .zip(&svm.weights[offset..offset + BLOCK_LEN])
                .map(|(d, w)| d * w)
                .sum::<f32>();
            offset += BLOCK_LEN;
        });
        sum
    }
}

fn l2_hys(block: &mut [f32; BLOCK_LEN]) {
    let eps = 1e-3f32;
    let norm = (block.iter().map(|v| v * v).sum::<f32>() + eps * eps).sqrt();
    for v in block.iter_mut() {
        *v = (*v / norm).min(L2HYS_CLIP);
    }
    let norm = (block.iter().map(|v| v * v).sum::<f32>() + eps * eps).sqrt();
    for v in block.iter_mut() {
        *v /= norm;
    }
}

/// Linear SVM over window descriptors, loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HogSvm {
    pub weights: Vec<f32>,
    /// Absent when the bias is stored as the last weight
    #[serde(default)]
    pub bias: f32,
}

impl HogSvm {
    pub fn from_path(path: &Path) -> Result<Self, DetectorError> {
        #[derive(Deserialize)]
        struct Raw {
            weights: Vec<f32>,
            bias: Option<f32>,
        }

        let file = File::open(path)
            .map_err(|e| DetectorError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        let raw: Raw = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| DetectorError::ModelLoad(format!("{}: {}", path.display(), e)))?;

        let mut weights = raw.weights;
        let bias = match raw.bias {
            Some(bias) => bias,
            None if weights.len() == HogDescriptor::WINDOW_LEN + 1 => weights.pop().unwrap_or(0.0),
            None => 0.0,
        };
        Self::new(weights, bias)
    }

    pub fn new(weights: Vec<f32>, bias: f32) -> Result<Self, DetectorError> {
        if weights.len() != HogDescriptor::WINDOW_LEN {
            return Err(DetectorError::ModelLoad(format!(
                "SVM has {} weights, expected {}",
                weights.len(),
                HogDescriptor::WINDOW_LEN
            )));
        }
        Ok(Self { weights, bias })
    }
}

pub struct HogPersonDetector {
    svm: Option<HogSvm>,
    profile: SuppressionProfile,
}

impl HogPersonDetector {
    pub fn new(config: &DetectorsConfig) -> Self {
        let svm = match &config.hog_svm {
            Some(path) => {
                info!("Loading HOG SVM weights from {}", path.display());
                match HogSvm::from_path(path) {
                    Ok(svm) => Some(svm),
                    Err(e) => {
                        warn!("Failed to load HOG SVM weights: {}", e);
                        None
                    }
                }
            }
            None => {
                warn!("No HOG SVM weights configured. Backend stays unavailable.");
                None
            }
        };
        Self::from_svm(svm)
    }

    pub fn from_svm(svm: Option<HogSvm>) -> Self {
        Self {
            svm,
            profile: SuppressionProfile::hog_person(),
        }
    }
}

impl CandidateDetector for HogPersonDetector {
    fn name(&self) -> &str {
        "hog-person"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::HogPerson
    }

    fn is_initialized(&self) -> bool {
        self.svm.is_some()
    }

    fn profile(&self) -> &SuppressionProfile {
        &self.profile
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<Candidate>, DetectorError> {
        let Some(svm) = &self.svm else {
            return Ok(Vec::new());
        };
        frame.validate()?;
        let gray = frame
            .to_gray_image()
            .ok_or_else(|| {
                DetectorError::Inference("frame buffer does not match dimensions".to_string())
            })?;

        // work on at most 640x480, boxes are mapped back afterwards
        let (fw, fh) = gray.dimensions();
        let downscale = (MAX_WIDTH as f32 / fw as f32).min(MAX_HEIGHT as f32 / fh as f32).min(1.0);
        let base = if downscale < 1.0 {
            let w = ((fw as f32 * downscale) as u32).max(1);
            let h = ((fh as f32 * downscale) as u32).max(1);
            imageops::resize(&gray, w, h, FilterType::Triangle)
        } else {
            gray
        };

        let mut hits = Vec::new();
        let mut scale = 1.0f32;
        for _ in 0..MAX_LEVELS {
            let w = (base.width() as f32 / scale) as u32;
            let h = (base.height() as f32 / scale) as u32;
            if w < WINDOW_W || h < WINDOW_H {
                break;
            }
            let level = if scale == 1.0 {
                base.clone()
            } else {
                imageops::resize(&base, w, h, FilterType::Triangle)
            };
            let hog = HogDescriptor::compute(&level);
            let (nx, ny) = hog.window_positions();
            let to_frame = scale / downscale;
            for cy in 0..ny {
                for cx in 0..nx {
                    let score = hog.score(svm, cx, cy);
                    if score <= HIT_THRESHOLD {
                        continue;
                    }
                    let bbox = BoundingBox::from_xywh_clipped(
                        (cx as u32 * CELL) as f32 * to_frame,
                        (cy as u32 * CELL) as f32 * to_frame,
                        WINDOW_W as f32 * to_frame,
                        WINDOW_H as f32 * to_frame,
                        fw,
                        fh,
                    );
                    if let Some(bbox) = bbox {
                        hits.push((bbox, score));
                    }
                }
            }
            scale *= PYRAMID_SCALE;
        }

        let grouped = group_rectangles(&hits, GROUP_THRESHOLD);
        debug!("HOG: {} raw hits, {} groups", hits.len(), grouped.len());

        Ok(grouped
            .into_iter()
            .map(|(bbox, _, best)| Candidate::new(bbox, ObjectClass::Person, best))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_window_descriptor_length() {
        assert_eq!(HogDescriptor::WINDOW_LEN, 3780);
        let hog = HogDescriptor::compute(&GrayImage::new(64, 128));
        assert_eq!(hog.window_positions(), (1, 1));
        assert_eq!(hog.window(0, 0).len(), 3780);
    }

    #[test]
    fn test_flat_image_has_zero_descriptor() {
        let hog = HogDescriptor::compute(&GrayImage::from_pixel(64, 128, Luma([77])));
        assert!(hog.window(0, 0).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_vertical_edge_votes_horizontal_gradient_bins() {
        let img = GrayImage::from_fn(16, 16, |x, _| if x < 8 { Luma([0]) } else { Luma([255]) });
        let hog = HogDescriptor::compute(&img);
        let block = &hog.blocks[0];
        // gradient points along +x, angle 0 splits between the first and last bin
        let first_and_last: f32 = block
            .iter()
            .enumerate()
            .filter(|(i, _)| i % BINS == 0 || i % BINS == BINS - 1)
            .map(|(_, v)| v)
            .sum();
        let total: f32 = block.iter().sum();
        assert!(total > 0.0);
        assert!((first_and_last - total).abs() < 1e-4);
    }

    #[test]
    fn test_svm_weight_count_checked() {
        assert!(HogSvm::new(vec![0.0; 10], 0.0).is_err());
        assert!(HogSvm::new(vec![0.0; HogDescriptor::WINDOW_LEN], 0.0).is_ok());
    }

    #[test]
    fn test_positive_bias_fires_everywhere() {
        let svm = HogSvm::new(vec![0.0; HogDescriptor::WINDOW_LEN], 1.0).unwrap();
        let mut detector = HogPersonDetector::from_svm(Some(svm));
        let found = detector.detect(&VideoFrame::solid(128, 256, [50, 50, 50])).unwrap();
        assert!(!found.is_empty());
        assert!(found.iter().all(|c| c.class == ObjectClass::Person && c.confidence == 1.0));
    }

    #[test]
    fn test_negative_bias_finds_nothing() {
        let svm = HogSvm::new(vec![0.0; HogDescriptor::WINDOW_LEN], -1.0).unwrap();
        let mut detector = HogPersonDetector::from_svm(Some(svm));
        assert!(detector.detect(&VideoFrame::solid(128, 256, [50, 50, 50])).unwrap().is_empty());
    }

    #[test]
    fn test_bias_as_trailing_weight() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut weights = vec![0.0f32; HogDescriptor::WINDOW_LEN];
        weights.push(0.25);
        serde_json::to_writer(&mut file, &serde_json::json!({ "weights": weights })).unwrap();
        let svm = HogSvm::from_path(file.path()).unwrap();
        assert_eq!(svm.bias, 0.25);
        assert_eq!(svm.weights.len(), HogDescriptor::WINDOW_LEN);
    }
}
