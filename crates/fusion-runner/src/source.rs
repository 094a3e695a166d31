//! Frame sources: an image directory or a generated scene

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use vision_frame::{BoundingBox, VideoFrame};

use crate::settings::SourceConfig;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Sequence of frames fed to the engine
pub enum FrameSource {
    Directory { paths: Vec<PathBuf>, next: usize, fps: u32 },
    Scene(MovingScene),
}

impl FrameSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        match &config.input_dir {
            Some(dir) => {
                let paths = list_images(dir)?;
                info!("Reading {} frames from {}", paths.len(), dir.display());
                Ok(FrameSource::Directory {
                    paths,
                    next: 0,
                    fps: config.fps,
                })
            }
            None => {
                info!(
                    "No input directory; generating a {}x{} scene of {} frames",
                    config.width, config.height, config.frames
                );
                Ok(FrameSource::Scene(MovingScene::new(
                    config.width,
                    config.height,
                    config.frames,
                    config.fps,
                )))
            }
        }
    }

    /// Next frame, or `None` when the source is exhausted
    pub fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        match self {
            FrameSource::Directory { paths, next, fps } => {
                let Some(path) = paths.get(*next) else {
                    return Ok(None);
                };
                let sequence = *next as u32;
                let img = image::open(path)
                    .with_context(|| format!("Failed to read frame {}", path.display()))?
                    .to_rgb8();
                *next += 1;
                Ok(Some(VideoFrame::from_rgb_image(img, timestamp_ns(sequence, *fps), sequence)))
            }
            FrameSource::Scene(scene) => Ok(scene.next_frame()),
        }
    }
}

fn timestamp_ns(sequence: u32, fps: u32) -> u64 {
    sequence as u64 * 1_000_000_000 / fps.max(1) as u64
}

/// Image files in `dir`, sorted by name
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Dark road with a bright block driving across and a figure walking the
/// other way
pub struct MovingScene {
    width: u32,
    height: u32,
    frames: u32,
    fps: u32,
    produced: u32,
}

impl MovingScene {
    pub fn new(width: u32, height: u32, frames: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frames,
            fps,
            produced: 0,
        }
    }

    pub fn next_frame(&mut self) -> Option<VideoFrame> {
        if self.produced >= self.frames {
            return None;
        }
        let sequence = self.produced;
        self.produced += 1;

        let (w, h) = (self.width, self.height);
        let mut frame = VideoFrame::solid(w, h, [40, 40, 45]);
        frame.timestamp_ns = timestamp_ns(sequence, self.fps);
        frame.sequence = sequence;

        // road
        frame.fill_rect(&BoundingBox::new(0, h * 2 / 3, w, h / 3), [70, 70, 70]);

        let span = self.frames.max(1);
        let vehicle_w = w / 4;
        let vehicle_h = h / 6;
        let vx = (w - vehicle_w) * sequence / span;
        frame.fill_rect(
            &BoundingBox::new(vx, h * 2 / 3 - vehicle_h / 2, vehicle_w, vehicle_h),
            [220, 120, 30],
        );

        let person_w = (w / 16).max(1);
        let person_h = (h / 4).max(1);
        let px = (w - person_w) - (w - person_w) * sequence / span;
        frame.fill_rect(
            &BoundingBox::new(px, h * 2 / 3 - person_h, person_w, person_h),
            [200, 200, 210],
        );

        Some(frame)
    }
}
