//! Annotated frame drawing

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};
use vision_frame::{BoundingBox, VideoFrame};

use crate::config::OverlayConfig;

pub const PERSON_COLOR: Rgb<u8> = Rgb([50, 205, 50]);
pub const VEHICLE_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
pub const FACE_COLOR: Rgb<u8> = Rgb([173, 255, 47]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const PANEL_WIDTH: u32 = 220;
const PANEL_MARGIN: u32 = 10;
const LINE_GAP: f32 = 4.0;

/// Tried in order when no font is configured
const SYSTEM_FONTS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// Figures written into the summary panel
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSummary {
    pub humans: usize,
    pub vehicles: usize,
    pub faces: usize,
    pub light_level: u16,
    pub motion: bool,
    pub distance_m: f32,
    pub simulated: bool,
}

impl PanelSummary {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Humans: {}", self.humans),
            format!("Vehicles: {}", self.vehicles),
            format!("Faces: {}", self.faces),
            format!("Light: {}", self.light_level),
            format!("Motion: {}", if self.motion { "yes" } else { "no" }),
            format!("Distance: {:.1}m", self.distance_m),
        ];
        if self.simulated {
            lines.push("SIMULATED".to_string());
        }
        lines
    }
}

/// Box to be drawn with an optional label
pub struct Annotation<'a> {
    pub bbox: BoundingBox,
    pub color: Rgb<u8>,
    pub label: &'a str,
}

/// Draws boxes, labels and a summary panel onto frame copies
pub struct Overlay {
    config: OverlayConfig,
    font: Option<FontVec>,
}

impl Overlay {
    pub fn new(config: OverlayConfig) -> Self {
        let font = match &config.font_path {
            Some(path) => match load_font(path) {
                Ok(font) => {
                    info!("Loaded overlay font from {}", path.display());
                    Some(font)
                }
                Err(e) => {
                    warn!(
                        "Failed to load overlay font {}: {}. Labels disabled.",
                        path.display(),
                        e
                    );
                    None
                }
            },
            None => {
                let found = SYSTEM_FONTS.iter().map(Path::new).find_map(|path| {
                    let font = load_font(path).ok()?;
                    info!("Using system font {} for overlay labels", path.display());
                    Some(font)
                });
                if found.is_none() {
                    debug!("No overlay font configured or installed. Labels disabled.");
                }
                found
            }
        };
        Self { config, font }
    }

    /// Annotated copy of `frame`; `lines` go into the lower-left panel
    pub fn annotate(
        &self,
        frame: &VideoFrame,
        boxes: &[Annotation<'_>],
        lines: &[String],
    ) -> VideoFrame {
        if !self.config.enabled {
            return frame.clone();
        }
        let Some(mut img) = frame.to_rgb_image() else {
            return frame.clone();
        };

        for annotation in boxes {
            self.draw_box(&mut img, annotation);
        }
        self.draw_panel(&mut img, lines);

        VideoFrame::from_rgb_image(img, frame.timestamp_ns, frame.sequence)
    }

    fn draw_box(&self, img: &mut RgbImage, annotation: &Annotation<'_>) {
        let bbox = annotation.bbox;
        if bbox.width == 0 || bbox.height == 0 {
            return;
        }
        let thickness = self.config.line_thickness.max(1);
        for inset in 0..thickness {
            let w = bbox.width.saturating_sub(2 * inset);
            let h = bbox.height.saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(img, rect, annotation.color);
        }

        if let Some(font) = &self.font {
            let size = self.config.font_size;
            let y = bbox.y as f32 - size - 2.0;
            let y = if y < 0.0 { bbox.y as f32 + 2.0 } else { y };
            draw_text_mut(
                img,
                annotation.color,
                bbox.x as i32,
                y as i32,
                PxScale::from(size),
                font,
                annotation.label,
            );
        }
    }

    /// Darken the panel region with `panel_alpha` opacity, then write the lines
    fn draw_panel(&self, img: &mut RgbImage, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let (width, height) = img.dimensions();
        let line_height = self.config.font_size + LINE_GAP;
        let panel_h = (lines.len() as f32 * line_height + 2.0 * PANEL_MARGIN as f32) as u32;
        let panel_w = PANEL_WIDTH.min(width.saturating_sub(PANEL_MARGIN));
        let panel_h = panel_h.min(height.saturating_sub(PANEL_MARGIN));
        if panel_w == 0 || panel_h == 0 {
            return;
        }
        let left = PANEL_MARGIN.min(width - panel_w);
        let top = height - panel_h - PANEL_MARGIN.min(height - panel_h);

        let keep = 1.0 - self.config.panel_alpha.clamp(0.0, 1.0);
        for y in top..top + panel_h {
            for x in left..left + panel_w {
                let px = img.get_pixel_mut(x, y);
                for c in px.0.iter_mut() {
                    *c = (*c as f32 * keep) as u8;
                }
            }
        }

        if let Some(font) = &self.font {
            let scale = PxScale::from(self.config.font_size);
            for (i, line) in lines.iter().enumerate() {
                let y = top as f32 + PANEL_MARGIN as f32 / 2.0 + i as f32 * line_height;
                let x = (left + PANEL_MARGIN) as i32;
                draw_text_mut(img, TEXT_COLOR, x, y as i32, scale, font, line);
            }
        }
    }
}

fn load_font(path: &Path) -> Result<FontVec, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec(bytes).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_outline_drawn() {
        let overlay = Overlay::new(OverlayConfig::default());
        let frame = VideoFrame::solid(200, 200, [0, 0, 0]);
        let boxes = [Annotation {
            bbox: BoundingBox::new(20, 20, 50, 40),
            color: PERSON_COLOR,
            label: "person",
        }];
        let out = overlay.annotate(&frame, &boxes, &[]);
        assert_eq!(out.get_pixel(20, 20), Some(PERSON_COLOR.0));
        assert_eq!(out.get_pixel(21, 30), Some(PERSON_COLOR.0));
        // interior untouched
        assert_eq!(out.get_pixel(40, 40), Some([0, 0, 0]));
    }

    #[test]
    fn test_panel_darkens_lower_left() {
        let overlay = Overlay::new(OverlayConfig::default());
        let frame = VideoFrame::solid(320, 240, [200, 200, 200]);
        let out = overlay.annotate(&frame, &[], &["Humans: 0".to_string()]);
        // 0.3 of the original brightness
        assert_eq!(out.get_pixel(15, 225), Some([60, 60, 60]));
        assert_eq!(out.get_pixel(300, 10), Some([200, 200, 200]));
    }

    #[test]
    fn test_disabled_overlay_copies_frame() {
        let overlay = Overlay::new(OverlayConfig {
            enabled: false,
            ..Default::default()
        });
        let frame = VideoFrame::solid(16, 16, [5, 6, 7]);
        let boxes = [Annotation {
            bbox: BoundingBox::new(0, 0, 8, 8),
            color: VEHICLE_COLOR,
            label: "car",
        }];
        assert_eq!(overlay.annotate(&frame, &boxes, &["x".to_string()]).data, frame.data);
    }

    #[test]
    fn test_missing_font_disables_labels() {
        let overlay = Overlay::new(OverlayConfig {
            font_path: Some("/nonexistent/font.ttf".into()),
            ..Default::default()
        });
        assert!(overlay.font.is_none());
    }

    #[test]
    fn test_panel_lines() {
        let summary = PanelSummary {
            humans: 3,
            vehicles: 1,
            faces: 2,
            light_level: 420,
            motion: true,
            distance_m: 4.26,
            simulated: false,
        };
        assert_eq!(
            summary.lines(),
            vec![
                "Humans: 3",
                "Vehicles: 1",
                "Faces: 2",
                "Light: 420",
                "Motion: yes",
                "Distance: 4.3m",
            ]
        );

        let simulated = PanelSummary {
            simulated: true,
            ..summary
        };
        assert_eq!(simulated.lines().last().map(String::as_str), Some("SIMULATED"));
    }
}
