#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceEngine, RawDetections};
use crate::frame::InputTensor;

const BOXES_OUTPUT: &str = "detection_boxes";
const SCORES_OUTPUT: &str = "detection_scores";
const CLASSES_OUTPUT: &str = "detection_classes";
const COUNT_OUTPUT: &str = "num_detections";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OutputSlots {
    boxes: usize,
    scores: usize,
    classes: usize,
    count: Option<usize>,
}

impl OutputSlots {
    /// Resolve outputs by name, falling back to positional order 0/1/2.
    fn resolve(names: &[String]) -> Result<Self> {
        let find = |wanted: &str| names.iter().position(|name| name.contains(wanted));
        match (
            find(BOXES_OUTPUT),
            find(SCORES_OUTPUT),
            find(CLASSES_OUTPUT),
        ) {
            (Some(boxes), Some(scores), Some(classes)) => Ok(Self {
                boxes,
                scores,
                classes,
                count: find(COUNT_OUTPUT),
            }),
            _ if names.len() >= 3 => {
                log::warn!(
                    "TractEngine: output names {:?} not recognised, using positional order",
                    names
                );
                Ok(Self {
                    boxes: 0,
                    scores: 1,
                    classes: 2,
                    count: None,
                })
            }
            _ => Err(anyhow!(
                "model exposes {} outputs, need boxes, scores and classes",
                names.len()
            )),
        }
    }
}

/// Tract-based engine for ONNX object-detection graphs.
///
/// The graph takes a `uint8 [1, S, S, 3]` image tensor and produces
/// `detection_boxes [n, m, 4]`, `detection_scores [n, m]` and
/// `detection_classes [n, m]`.
pub struct TractEngine {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    slots: OutputSlots,
}

impl TractEngine {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?;

        let names: Vec<String> = model
            .output_outlets()
            .context("failed to read model outputs")?
            .iter()
            .map(|outlet| {
                model
                    .outlet_label(*outlet)
                    .map(str::to_string)
                    .unwrap_or_else(|| model.node(outlet.node).name.clone())
            })
            .collect();
        let slots = OutputSlots::resolve(&names)?;
        log::debug!("TractEngine: outputs {:?} -> {:?}", names, slots);

        let side = input_size as usize;
        let model = model
            .with_input_fact(
                0,
                InferenceFact::dt_shape(u8::datum_type(), tvec!(1, side, side, 3)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractEngine: loaded {} ({}x{} input)",
            model_path.display(),
            input_size,
            input_size
        );

        Ok(Self {
            model,
            input_size,
            slots,
        })
    }

    fn build_input(&self, tensor: &InputTensor) -> Result<Tensor> {
        if tensor.size() != self.input_size {
            return Err(anyhow!(
                "tensor size {} does not match model input {}",
                tensor.size(),
                self.input_size
            ));
        }
        let side = self.input_size as usize;
        let input =
            tract_ndarray::Array4::from_shape_vec((1, side, side, 3), tensor.as_slice().to_vec())
                .context("tensor buffer does not match (1, S, S, 3)")?;
        Ok(input.into_tensor())
    }

    fn extract(&self, outputs: &TVec<TValue>) -> Result<RawDetections> {
        let output = |idx: usize, what: &str| {
            outputs
                .get(idx)
                .ok_or_else(|| anyhow!("model produced no {} output", what))
        };
        let boxes = output(self.slots.boxes, "boxes")?
            .to_array_view::<f32>()
            .context("boxes output was not f32")?;
        let scores = output(self.slots.scores, "scores")?
            .to_array_view::<f32>()
            .context("scores output was not f32")?;
        let classes = output(self.slots.classes, "classes")?
            .to_array_view::<f32>()
            .context("classes output was not f32")?;

        let shape = scores.shape();
        if shape.len() != 2 {
            return Err(anyhow!("scores output has shape {:?}, expected [n, m]", shape));
        }
        let raw = RawDetections::from_flat(
            shape[0],
            shape[1],
            boxes.iter().copied().collect(),
            scores.iter().copied().collect(),
            classes.iter().copied().collect(),
        )?;

        match self.slots.count.and_then(|idx| outputs.get(idx)) {
            Some(count) => {
                let count = count
                    .to_array_view::<f32>()
                    .context("num_detections output was not f32")?;
                Ok(raw.with_num_detections(count.iter().copied().collect()))
            }
            None => Ok(raw),
        }
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, tensor: &InputTensor) -> Result<RawDetections> {
        let input = self.build_input(tensor)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract(&outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_outputs_by_name() {
        let slots = OutputSlots::resolve(&names(&[
            "num_detections",
            "detection_scores",
            "detection_classes",
            "detection_boxes",
        ]))
        .unwrap();
        assert_eq!(
            slots,
            OutputSlots {
                boxes: 3,
                scores: 1,
                classes: 2,
                count: Some(0),
            }
        );
    }

    #[test]
    fn falls_back_to_positional_outputs() {
        let slots = OutputSlots::resolve(&names(&["a", "b", "c"])).unwrap();
        assert_eq!(slots.boxes, 0);
        assert_eq!(slots.count, None);
        assert!(OutputSlots::resolve(&names(&["a"])).is_err());
    }
}
