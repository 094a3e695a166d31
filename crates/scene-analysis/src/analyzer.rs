//! Brightness and motion analysis

use std::time::{Duration, Instant};

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vision_frame::VideoFrame;

/// Upper bound of the reported light level
pub const MAX_LIGHT_LEVEL: u16 = 1000;

/// Frame analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Per-pixel difference needed to count as changed (0-255)
    pub motion_threshold: u8,

    /// Minimum changed region area (px²) at the reference resolution
    pub min_motion_area: u32,

    /// Resolution the minimum area is calibrated for
    pub reference_width: u32,
    pub reference_height: u32,

    /// How long motion stays reported after the last qualifying frame (seconds)
    pub motion_hold_secs: f32,

    /// Gaussian sigma applied before differencing
    pub blur_sigma: f32,

    /// Dilation radius applied to the thresholded difference
    pub dilate_radius: u8,

    /// Light level reported before the first valid frame
    pub initial_light_level: u16,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 25,
            min_motion_area: 500,
            reference_width: 640,
            reference_height: 480,
            motion_hold_secs: 2.0,
            // sigma OpenCV derives for a 21x21 kernel
            blur_sigma: 3.5,
            // two 3x3 dilation passes
            dilate_radius: 2,
            initial_light_level: 500,
        }
    }
}

/// Blurred grayscale of the last frame seen as `curr`
struct BlurCache {
    source: Vec<u8>,
    width: u32,
    height: u32,
    blurred: GrayImage,
}

impl BlurCache {
    fn matches(&self, frame: &VideoFrame) -> bool {
        self.width == frame.width && self.height == frame.height && self.source == frame.data
    }
}

/// Computes ambient light and motion from consecutive frames
pub struct FrameAnalyzer {
    config: AnalyzerConfig,
    light_level: u16,
    motion_active: bool,
    last_motion: Option<Instant>,
    cache: Option<BlurCache>,
}

impl FrameAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            light_level: config.initial_light_level.min(MAX_LIGHT_LEVEL),
            motion_active: false,
            last_motion: None,
            cache: None,
            config,
        }
    }

    /// Mean luminance scaled to 0-1000.
    ///
    /// Invalid frames leave the previous level in place.
    pub fn analyze_brightness(&mut self, frame: &VideoFrame) -> u16 {
        if frame.validate().is_err() {
            return self.light_level;
        }

        let gray = frame.to_grayscale();
        let sum: u64 = gray.iter().map(|&v| v as u64).sum();
        let mean = sum as f64 / gray.len() as f64;
        self.light_level = ((mean / 255.0) * MAX_LIGHT_LEVEL as f64) as u16;
        self.light_level = self.light_level.min(MAX_LIGHT_LEVEL);
        self.light_level
    }

    /// Motion flag for `curr` relative to `prev` at time `now`.
    ///
    /// A qualifying frame turns motion on; it turns off once no qualifying
    /// frame has been seen for longer than the hold window. The blurred
    /// `curr` is kept and reused when it comes back as the next `prev`.
    pub fn detect_motion_at(&mut self, prev: &VideoFrame, curr: &VideoFrame, now: Instant) -> bool {
        if prev.validate().is_err()
            || curr.validate().is_err()
            || prev.width != curr.width
            || prev.height != curr.height
        {
            self.cache = None;
            self.motion_active = false;
            return false;
        }

        let Some(curr_blurred) = curr.to_gray_image().map(|gray| self.blurred(gray)) else {
            self.cache = None;
            self.motion_active = false;
            return false;
        };
        let prev_blurred = match self.cache.take() {
            Some(cache) if cache.matches(prev) => Some(cache.blurred),
            _ => prev.to_gray_image().map(|gray| self.blurred(gray)),
        };
        let Some(prev_blurred) = prev_blurred else {
            self.motion_active = false;
            return false;
        };

        let moved = self.blurred_motion(&prev_blurred, &curr_blurred);
        self.cache = Some(BlurCache {
            source: curr.data.clone(),
            width: curr.width,
            height: curr.height,
            blurred: curr_blurred,
        });

        if moved {
            self.motion_active = true;
            self.last_motion = Some(now);
        } else {
            let hold = Duration::from_secs_f32(self.config.motion_hold_secs.max(0.0));
            let expired = self
                .last_motion
                .map_or(true, |t| now.saturating_duration_since(t) > hold);
            if expired {
                self.motion_active = false;
            }
        }

        self.motion_active
    }

    /// Single-frame decision: is any changed region larger than the minimum area
    pub fn has_significant_motion(&self, prev: &GrayImage, curr: &GrayImage) -> bool {
        if prev.dimensions() != curr.dimensions() {
            return false;
        }
        self.blurred_motion(&self.blurred(prev.clone()), &self.blurred(curr.clone()))
    }

    fn blurred(&self, gray: GrayImage) -> GrayImage {
        if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(&gray, self.config.blur_sigma)
        } else {
            gray
        }
    }

    /// Thresholded difference of two blurred frames of equal size
    fn blurred_motion(&self, prev: &GrayImage, curr: &GrayImage) -> bool {
        let (width, height) = curr.dimensions();
        let threshold = self.config.motion_threshold;
        let mask = GrayImage::from_fn(width, height, |x, y| {
            let a = prev.get_pixel(x, y)[0];
            let b = curr.get_pixel(x, y)[0];
            if a.abs_diff(b) > threshold {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });

        let mask = if self.config.dilate_radius > 0 {
            dilate(&mask, Norm::LInf, self.config.dilate_radius)
        } else {
            mask
        };

        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));
        let mut areas: Vec<u32> = Vec::new();
        for pixel in labels.pixels() {
            let label = pixel[0] as usize;
            if label == 0 {
                continue;
            }
            if areas.len() <= label {
                areas.resize(label + 1, 0);
            }
            areas[label] += 1;
        }

        let min_area = self.scaled_min_area(width, height);
        let largest = areas.iter().copied().max().unwrap_or(0);
        debug!("Largest motion region {}px² (min {:.0}px²)", largest, min_area);
        largest as f64 > min_area
    }

    /// Minimum region area scaled from the reference resolution
    fn scaled_min_area(&self, width: u32, height: u32) -> f64 {
        let reference = self.config.reference_width as f64 * self.config.reference_height as f64;
        if reference <= 0.0 {
            return self.config.min_motion_area as f64;
        }
        self.config.min_motion_area as f64 * (width as f64 * height as f64) / reference
    }

    /// Last computed light level
    pub fn light_level(&self) -> u16 {
        self.light_level
    }

    /// Current (held) motion state
    pub fn motion_active(&self) -> bool {
        self.motion_active
    }

    /// Forget motion history and light level
    pub fn reset(&mut self) {
        self.light_level = self.config.initial_light_level.min(MAX_LIGHT_LEVEL);
        self.motion_active = false;
        self.last_motion = None;
        self.cache = None;
    }
}

impl Default for FrameAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
