#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::result::{non_maximum_suppression, BoundingBox, Detection};
use crate::frame::Frame;

const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// The model takes a `1x3xHxW` float input in `[0, 1]` and produces a
/// `1x(4+C)xA` tensor: box centre, size and one score per class for each of
/// `A` anchors. Frames are stretched to the model input and boxes scaled back
/// to frame pixels.
pub struct TractBackend {
    model: Plan,
    labels: Vec<String>,
    width: u32,
    height: u32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, labels: Vec<String>) -> Result<Self> {
        Self::with_input_size(model_path, labels, DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
    }

    pub fn with_input_size<P: AsRef<Path>>(
        model_path: P,
        labels: Vec<String>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels,
            width,
            height,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default non-maximum suppression overlap.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let rgb = frame.to_rgb_image()?;
        let resized = imageops::resize(&rgb, self.width, self.height, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame: &Frame,
        min_confidence: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not a 1x(4+C)xA tensor")?;

        let rows = view.shape()[1];
        let anchors = view.shape()[2];
        if rows <= 4 {
            return Err(anyhow!("model output has no class scores ({} rows)", rows));
        }

        let scale_x = frame.width as f32 / self.width as f32;
        let scale_y = frame.height as f32 / self.height as f32;

        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let (class_index, score) = (4..rows)
                .map(|row| (row - 4, view[[0, row, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, candidate| {
                    if candidate.1 > best.1 {
                        candidate
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < min_confidence {
                continue;
            }
            let bbox = BoundingBox::from_center(
                view[[0, 0, anchor]] * scale_x,
                view[[0, 1, anchor]] * scale_y,
                view[[0, 2, anchor]] * scale_x,
                view[[0, 3, anchor]] * scale_y,
            );
            let label = self
                .labels
                .get(class_index)
                .cloned()
                .unwrap_or_else(|| format!("class{}", class_index));
            detections.push(Detection::new(label, score).with_box(bbox));
        }

        Ok(non_maximum_suppression(detections, self.iou_threshold))
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame, min_confidence: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, min_confidence)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::solid(self.width, self.height, [114, 114, 114]);
        self.detect(&blank, 1.0).map(|_| ())
    }
}
