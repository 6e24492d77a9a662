#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{rank_candidates, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection};
use crate::detect::vocabulary::label_for_coco_id;
use crate::frame::Frame;

/// Output tensor positions of a post-processed SSD export.
const BOXES_OUTPUT: usize = 0;
const CLASSES_OUTPUT: usize = 1;
const SCORES_OUTPUT: usize = 2;

/// Tract-based backend for SSD-style ONNX detectors.
///
/// Expects a uint8 NHWC image input and post-processed outputs: normalised
/// `[ymin, xmin, ymax, xmax]` boxes, 1-based COCO class ids and scores.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, input_height as usize, input_width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let resized = if frame.width == self.input_width && frame.height == self.input_height {
            image
        } else {
            imageops::resize(
                &image,
                self.input_width,
                self.input_height,
                FilterType::Triangle,
            )
        };

        let width = self.input_width as usize;
        let height = self.input_height as usize;
        let raw = resized.into_raw();
        let input =
            tract_ndarray::Array4::from_shape_vec((1, height, width, 3), raw).context("input shape")?;
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: &TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = |idx: usize| {
            outputs
                .get(idx)
                .ok_or_else(|| anyhow!("model produced {} outputs, need 3", outputs.len()))
        };
        let boxes = output(BOXES_OUTPUT)?
            .to_array_view::<f32>()
            .context("boxes tensor was not f32")?;
        let classes = output(CLASSES_OUTPUT)?
            .to_array_view::<f32>()
            .context("classes tensor was not f32")?;
        let scores = output(SCORES_OUTPUT)?
            .to_array_view::<f32>()
            .context("scores tensor was not f32")?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        if boxes.len() != scores.len() * 4 || classes.len() != scores.len() {
            return Err(anyhow!(
                "inconsistent detector outputs: {} boxes, {} classes, {} scores",
                boxes.len() / 4,
                classes.len(),
                scores.len()
            ));
        }

        let (fw, fh) = (frame.width as f32, frame.height as f32);
        let mut detections = Vec::with_capacity(scores.len());
        for (i, score) in scores.iter().copied().enumerate() {
            let Some(label) = label_for_coco_id(classes[i].round() as u32) else {
                continue;
            };
            let b = &boxes[i * 4..i * 4 + 4];
            let (ymin, xmin, ymax, xmax) = (
                b[0].clamp(0.0, 1.0),
                b[1].clamp(0.0, 1.0),
                b[2].clamp(0.0, 1.0),
                b[3].clamp(0.0, 1.0),
            );
            detections.push(Detection::new(
                label,
                score,
                BoundingBox::new(xmin * fw, ymin * fh, (xmax - xmin) * fw, (ymax - ymin) * fh),
            ));
        }
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        frame: &Frame,
        max_candidates: usize,
        min_score: f32,
    ) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let candidates = self.decode(&outputs, frame)?;
        Ok(rank_candidates(candidates, max_candidates, min_score))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::solid(self.input_width, self.input_height, [0, 0, 0], 0)?;
        self.detect(&blank, 1, 1.0).map(|_| ())
    }
}
