//! Video frame types and processing

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

use crate::{BoundingBox, FrameError};

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, 0, 0)
    }

    /// Wrap an `image` RGB buffer
    pub fn from_rgb_image(img: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Expected RGB buffer length for the declared dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Check that the frame is non-empty and its buffer matches its dimensions
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(FrameError::DataLength {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Pixel area of the frame
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Resolution string, e.g. "640x480"
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data.get(idx..idx + 3).map(|p| [p[0], p[1], p[2]])
    }

    /// Paint a filled rectangle, clipped to the frame
    pub fn fill_rect(&mut self, bbox: &BoundingBox, rgb: [u8; 3]) {
        let x_end = bbox.right().min(self.width);
        let y_end = bbox.bottom().min(self.height);
        for row in bbox.y..y_end {
            for col in bbox.x..x_end {
                let idx = ((row * self.width + col) * 3) as usize;
                if let Some(px) = self.data.get_mut(idx..idx + 3) {
                    px.copy_from_slice(&rgb);
                }
            }
        }
    }

    /// BT.601 luma, one byte per pixel
    pub fn to_grayscale(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|p| (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32) as u8)
            .collect()
    }

    /// Grayscale copy as an `image` buffer
    pub fn to_gray_image(&self) -> Option<GrayImage> {
        ImageBuffer::<Luma<u8>, _>::from_raw(self.width, self.height, self.to_grayscale())
    }

    /// RGB copy as an `image` buffer
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        ImageBuffer::<Rgb<u8>, _>::from_raw(self.width, self.height, self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty() {
        let frame = VideoFrame::new(vec![], 0, 0, 0, 0);
        assert_eq!(frame.validate(), Err(FrameError::Empty { width: 0, height: 0 }));
    }

    #[test]
    fn test_validate_rejects_short_buffer() {
        let frame = VideoFrame::new(vec![0; 10], 4, 4, 0, 0);
        assert!(matches!(
            frame.validate(),
            Err(FrameError::DataLength { expected: 48, actual: 10 })
        ));
    }

    #[test]
    fn test_grayscale_white_and_black() {
        let white = VideoFrame::solid(4, 2, [255, 255, 255]);
        assert!(white.to_grayscale().iter().all(|&v| v >= 254));

        let black = VideoFrame::solid(4, 2, [0, 0, 0]);
        assert!(black.to_grayscale().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_fill_rect_clips_to_frame() {
        let mut frame = VideoFrame::solid(10, 10, [0, 0, 0]);
        frame.fill_rect(&BoundingBox::new(8, 8, 5, 5), [255, 0, 0]);
        assert_eq!(frame.get_pixel(9, 9), Some([255, 0, 0]));
        assert_eq!(frame.get_pixel(7, 7), Some([0, 0, 0]));
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_image_round_trip_dimensions() {
        let frame = VideoFrame::solid(6, 3, [1, 2, 3]);
        let img = frame.to_rgb_image().unwrap();
        assert_eq!(img.dimensions(), (6, 3));
        let gray = frame.to_gray_image().unwrap();
        assert_eq!(gray.dimensions(), (6, 3));
    }
}
