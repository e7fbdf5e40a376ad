#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::{Device, DetectorBackend, ObjectBox, ObjectClass};
use crate::detect::postprocess::non_max_suppression;
use crate::frame::{BoundingBox, VideoFrame};

const YOLO_INPUT_SIZE: u32 = 640;
const FLOOR_CONFIDENCE: f32 = 0.05;
const IOU_THRESHOLD: f32 = 0.45;
const MAX_DETECTIONS: usize = 300;

/// Tract-based backend for YOLOv8 ONNX person detection.
///
/// Loads a local model file once; inference runs on the CPU and keeps no
/// state between calls, so one instance serves concurrent jobs.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    floor_confidence: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = YOLO_INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size: YOLO_INPUT_SIZE,
            floor_confidence: FLOOR_CONFIDENCE,
        })
    }

    /// Override the pre-NMS floor threshold.
    pub fn with_floor(mut self, threshold: f32) -> Self {
        self.floor_confidence = threshold;
        self
    }

    fn build_input(&self, frame: &VideoFrame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;
        let resized = image::imageops::resize(
            &image,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    /// Decode `[1, 4 + classes, anchors]` (or its transpose) into source-pixel boxes.
    fn decode(&self, outputs: TVec<TValue>, frame: &VideoFrame) -> Result<Vec<ObjectBox>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not rank 3")?;

        let (_, d1, d2) = view.dim();
        let transposed = d1 > d2;
        let (attrs, anchors) = if transposed { (d2, d1) } else { (d1, d2) };
        if attrs < 5 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", view.dim()));
        }
        let at = |attr: usize, anchor: usize| {
            if transposed {
                view[[0, anchor, attr]]
            } else {
                view[[0, attr, anchor]]
            }
        };

        let scale_x = frame.width as f32 / self.input_size as f32;
        let scale_y = frame.height as f32 / self.input_size as f32;
        let mut boxes = Vec::new();

        for anchor in 0..anchors {
            let (class_id, score) = (4..attrs)
                .map(|attr| (attr - 4, at(attr, anchor)))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.floor_confidence {
                continue;
            }

            let bbox = BoundingBox::from_center(
                at(0, anchor) * scale_x,
                at(1, anchor) * scale_y,
                at(2, anchor) * scale_x,
                at(3, anchor) * scale_y,
            )
            .clamp_to(frame.width as f32, frame.height as f32);
            if !bbox.is_valid() {
                continue;
            }

            boxes.push(ObjectBox {
                bbox,
                confidence: score.min(1.0),
                class: ObjectClass::from_coco(class_id),
            });
        }

        Ok(non_max_suppression(boxes, IOU_THRESHOLD, MAX_DETECTIONS))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn detect(&self, frame: &VideoFrame) -> Result<Vec<ObjectBox>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
