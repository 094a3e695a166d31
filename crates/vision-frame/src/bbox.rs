//! Pixel-space bounding boxes

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a box from float `[x, y, w, h]`, clipped to a `frame_w` x `frame_h` frame.
    ///
    /// Negative origins are moved to zero and the extent is cut at the frame edge.
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn from_xywh_clipped(
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<Self> {
        if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) {
            return None;
        }
        let x0 = x.max(0.0) as i64;
        let y0 = y.max(0.0) as i64;
        let x1 = ((x + w) as i64).min(frame_w as i64);
        let y1 = ((y + h) as i64).min(frame_h as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }

    /// Build a box from corner coordinates normalised to [0, 1]
    pub fn from_normalized_corners(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<Self> {
        let fw = frame_w as f32;
        let fh = frame_h as f32;
        Self::from_xywh_clipped(x1 * fw, y1 * fh, (x2 - x1) * fw, (y2 - y1) * fh, frame_w, frame_h)
    }

    /// Build a box from a centre/size tuple normalised to [0, 1]
    pub fn from_normalized_center(
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<Self> {
        let fw = frame_w as f32;
        let fh = frame_h as f32;
        let bw = (w * fw).trunc();
        let bh = (h * fh).trunc();
        let x = (cx * fw).trunc() - bw / 2.0;
        let y = (cy * fh).trunc() - bh / 2.0;
        Self::from_xywh_clipped(x, y, bw, bh, frame_w, frame_h)
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width over height; a zero height counts as one pixel
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Box area divided by frame area
    pub fn area_ratio(&self, frame_w: u32, frame_h: u32) -> f32 {
        let frame_area = frame_w as u64 * frame_h as u64;
        if frame_area == 0 {
            return 0.0;
        }
        (self.area() as f64 / frame_area as f64) as f32
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return 0;
        }
        (right - left) as u64 * (bottom - top) as u64
    }

    /// Intersection over union
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union == 0 {
            return 0.0;
        }
        (inter as f64 / union as f64) as f32
    }

    /// Share of this box's area that lies inside `other`
    pub fn containment_in(&self, other: &BoundingBox) -> f32 {
        let area = self.area();
        if area == 0 {
            return 0.0;
        }
        (self.intersection_area(other) as f64 / area as f64) as f32
    }

    /// Scale coordinates, truncating to whole pixels
    pub fn scaled(&self, sx: f32, sy: f32) -> BoundingBox {
        BoundingBox::new(
            (self.x as f32 * sx) as u32,
            (self.y as f32 * sy) as u32,
            (self.width as f32 * sx) as u32,
            (self.height as f32 * sy) as u32,
        )
    }

    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

impl From<[u32; 4]> for BoundingBox {
    fn from(v: [u32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}
