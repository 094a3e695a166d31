//! ONNX network runner (tract) and output decoders

use std::path::Path;

use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;
use tracing::{debug, info};
use vision_frame::{BoundingBox, VideoFrame};

use crate::candidate::{Candidate, ObjectClass};
use crate::DetectorError;

/// Pixel normalisation applied when building the input tensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputScaling {
    /// `value / 255`
    UnitRange,
    /// `value - mean[channel]`, channels in RGB order
    MeanSubtract([f32; 3]),
}

impl InputScaling {
    fn apply(&self, value: u8, channel: usize) -> f32 {
        match self {
            InputScaling::UnitRange => value as f32 / 255.0,
            InputScaling::MeanSubtract(mean) => value as f32 - mean[channel],
        }
    }
}

/// One output tensor flattened into fixed-length rows
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRows {
    pub row_len: usize,
    pub data: Vec<f32>,
}

impl OutputRows {
    pub fn new(row_len: usize, data: Vec<f32>) -> Self {
        Self { row_len, data }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.row_len.max(1))
    }
}

/// Network that turns a frame into flattened output rows
pub trait RowNetwork: Send {
    fn run(&self, frame: &VideoFrame) -> Result<Vec<OutputRows>, DetectorError>;
}

/// Loaded ONNX network with a fixed NCHW input
pub struct OnnxNetwork {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    scaling: InputScaling,
}

impl OnnxNetwork {
    /// Load and optimise a model for a `1x3xHxW` f32 input
    pub fn load(
        path: &Path,
        input_width: u32,
        input_height: u32,
        scaling: InputScaling,
    ) -> Result<Self, DetectorError> {
        info!("Loading ONNX model from {}", path.display());

        let load_err =
            |e: TractError| DetectorError::ModelLoad(format!("{}: {}", path.display(), e));
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_err)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        Ok(Self {
            model,
            input_width,
            input_height,
            scaling,
        })
    }

    /// Resize the frame to the network input, run it, and flatten every output
    pub fn run(&self, frame: &VideoFrame) -> Result<Vec<OutputRows>, DetectorError> {
        frame.validate()?;
        let rgb = frame
            .to_rgb_image()
            .ok_or_else(|| {
                DetectorError::Inference("frame buffer does not match dimensions".to_string())
            })?;
        let resized =
            imageops::resize(&rgb, self.input_width, self.input_height, FilterType::Triangle);

        let scaling = self.scaling;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, c, y, x)| scaling.apply(resized.get_pixel(x as u32, y as u32)[c], c),
        )
        .into_tensor();

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DetectorError::Inference(e.to_string()))?;

        let mut flattened = Vec::with_capacity(outputs.len());
        for output in outputs.iter() {
            let view = output
                .to_array_view::<f32>()
                .map_err(|e| DetectorError::Inference(format!("output tensor is not f32: {}", e)))?;
            let row_len = view.shape().last().copied().unwrap_or(0);
            if row_len == 0 {
                continue;
            }
            flattened.push(OutputRows::new(row_len, view.iter().copied().collect()));
        }

        debug!("Network produced {} output tensors", flattened.len());
        Ok(flattened)
    }
}

impl RowNetwork for OnnxNetwork {
    fn run(&self, frame: &VideoFrame) -> Result<Vec<OutputRows>, DetectorError> {
        OnnxNetwork::run(self, frame)
    }
}

/// Minimum YOLO row length: 4 box values, objectness, 80 class scores
pub const YOLO_MIN_ROW: usize = 85;

/// Decode YOLO rows `[cx, cy, w, h, objectness, scores...]` (normalised).
///
/// Keeps rows whose best class score exceeds `threshold` and whose class is
/// a person or vehicle.
pub fn decode_yolo(
    outputs: &[OutputRows],
    frame_w: u32,
    frame_h: u32,
    threshold: f32,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for output in outputs.iter().filter(|o| o.row_len >= YOLO_MIN_ROW) {
        for row in output.rows() {
            let Some((index, score)) = row[5..]
                .iter()
                .copied()
                .enumerate()
                .fold(None, |best: Option<(usize, f32)>, (i, s)| match best {
                    Some((_, b)) if b >= s => best,
                    _ => Some((i, s)),
                })
            else {
                continue;
            };
            if score <= threshold {
                continue;
            }
            let class = ObjectClass::from_coco_index(index);
            if class.category().is_none() {
                continue;
            }
            if let Some(bbox) = BoundingBox::from_normalized_center(
                row[0], row[1], row[2], row[3], frame_w, frame_h,
            ) {
                candidates.push(Candidate::new(bbox, class, score));
            }
        }
    }
    candidates
}

/// SSD row length: `[image_id, label, score, x1, y1, x2, y2]`
pub const SSD_ROW: usize = 7;

/// Decode SSD rows with 1-based COCO labels, keeping scores above `threshold`
pub fn decode_ssd(
    outputs: &[OutputRows],
    frame_w: u32,
    frame_h: u32,
    threshold: f32,
) -> Vec<Candidate> {
    decode_ssd_with(outputs, frame_w, frame_h, threshold, |label| {
        ObjectClass::from_coco_id(label as i64)
    })
}

/// Decode SSD rows as faces regardless of label
pub fn decode_ssd_faces(
    outputs: &[OutputRows],
    frame_w: u32,
    frame_h: u32,
    threshold: f32,
) -> Vec<Candidate> {
    decode_ssd_with(outputs, frame_w, frame_h, threshold, |_| Some(ObjectClass::Face))
}

fn decode_ssd_with(
    outputs: &[OutputRows],
    frame_w: u32,
    frame_h: u32,
    threshold: f32,
    classify: impl Fn(f32) -> Option<ObjectClass>,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for output in outputs.iter().filter(|o| o.row_len == SSD_ROW) {
        for row in output.rows() {
            let score = row[2];
            if !(score > threshold) {
                continue;
            }
            let Some(class) = classify(row[1]) else {
                continue;
            };
            if let Some(bbox) = BoundingBox::from_normalized_corners(
                row[3], row[4], row[5], row[6], frame_w, frame_h,
            ) {
                candidates.push(Candidate::new(bbox, class, score));
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yolo_row(cx: f32, cy: f32, w: f32, h: f32, class: usize, score: f32) -> Vec<f32> {
        let mut row = vec![cx, cy, w, h, 0.9];
        row.extend(std::iter::repeat(0.0).take(80));
        row[5 + class] = score;
        row
    }

    #[test]
    fn test_decode_yolo_keeps_person_and_vehicle() {
        let mut data = yolo_row(0.5, 0.5, 0.2, 0.4, 0, 0.9);
        data.extend(yolo_row(0.3, 0.3, 0.2, 0.2, 2, 0.8));
        // dog
        data.extend(yolo_row(0.7, 0.7, 0.1, 0.1, 16, 0.95));
        // below threshold
        data.extend(yolo_row(0.1, 0.1, 0.1, 0.1, 0, 0.5));
        let outputs = vec![OutputRows::new(85, data)];

        let found = decode_yolo(&outputs, 100, 100, 0.7);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].class, ObjectClass::Person);
        assert_eq!(found[0].bbox, BoundingBox::new(40, 30, 20, 40));
        assert_eq!(found[1].class, ObjectClass::Car);
    }

    #[test]
    fn test_decode_yolo_ignores_short_rows() {
        let outputs = vec![OutputRows::new(7, vec![0.0; 14])];
        assert!(decode_yolo(&outputs, 100, 100, 0.1).is_empty());
    }

    #[test]
    fn test_decode_ssd_one_based_labels() {
        let data = vec![
            0.0, 1.0, 0.9, 0.1, 0.1, 0.3, 0.5, // person
            0.0, 3.0, 0.6, 0.5, 0.5, 0.9, 0.8, // car
            0.0, 0.0, 0.99, 0.0, 0.0, 1.0, 1.0, // background
            0.0, 3.0, 0.4, 0.5, 0.5, 0.9, 0.8, // weak
        ];
        let outputs = vec![OutputRows::new(SSD_ROW, data)];
        let found = decode_ssd(&outputs, 200, 100, 0.5);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].class, ObjectClass::Person);
        assert_eq!(found[0].bbox, BoundingBox::new(20, 10, 40, 40));
        assert_eq!(found[1].class, ObjectClass::Car);
    }

    #[test]
    fn test_decode_faces_ignores_label() {
        let data = vec![0.0, 1.0, 0.8, 0.25, 0.25, 0.5, 0.5];
        let outputs = vec![OutputRows::new(SSD_ROW, data)];
        let faces = decode_ssd_faces(&outputs, 100, 100, 0.6);
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].class, ObjectClass::Face);
        assert_eq!(faces[0].bbox, BoundingBox::new(25, 25, 25, 25));
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let path = Path::new("/nonexistent/model.onnx");
        let result = OnnxNetwork::load(path, 416, 416, InputScaling::UnitRange);
        assert!(matches!(result, Err(DetectorError::ModelLoad(_))));
    }
}
