use anyhow::{anyhow, Result};

use crate::frame::InputTensor;

/// Raw engine outputs for one call.
///
/// `boxes` is `[n][m][4]` (`ymin, xmin, ymax, xmax`), `scores` and `classes`
/// are `[n][m]`, all stored flat in row-major order. `classes` holds integer
/// ids encoded as floats.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawDetections {
    batch: usize,
    candidates: usize,
    boxes: Vec<f32>,
    scores: Vec<f32>,
    classes: Vec<f32>,
    num_detections: Option<Vec<f32>>,
}

impl RawDetections {
    /// Build from flat buffers, checking that the lengths agree with `(n, m)`.
    pub fn from_flat(
        batch: usize,
        candidates: usize,
        boxes: Vec<f32>,
        scores: Vec<f32>,
        classes: Vec<f32>,
    ) -> Result<Self> {
        let cells = batch
            .checked_mul(candidates)
            .ok_or_else(|| anyhow!("output dimensions overflow"))?;
        if scores.len() != cells {
            return Err(anyhow!(
                "scores has {} values, expected {}x{}",
                scores.len(),
                batch,
                candidates
            ));
        }
        if classes.len() != cells {
            return Err(anyhow!(
                "classes has {} values, expected {}x{}",
                classes.len(),
                batch,
                candidates
            ));
        }
        if boxes.len() != cells * 4 {
            return Err(anyhow!(
                "boxes has {} values, expected {}x{}x4",
                boxes.len(),
                batch,
                candidates
            ));
        }
        Ok(Self {
            batch,
            candidates,
            boxes,
            scores,
            classes,
            num_detections: None,
        })
    }

    /// Build from nested arrays, checking that every row has the same length.
    pub fn from_nested(
        boxes: Vec<Vec<[f32; 4]>>,
        scores: Vec<Vec<f32>>,
        classes: Vec<Vec<f32>>,
    ) -> Result<Self> {
        let batch = scores.len();
        let candidates = scores.first().map(Vec::len).unwrap_or(0);
        if boxes.len() != batch || classes.len() != batch {
            return Err(anyhow!(
                "output batch sizes differ (boxes {}, scores {}, classes {})",
                boxes.len(),
                batch,
                classes.len()
            ));
        }
        let ragged = boxes.iter().any(|row| row.len() != candidates)
            || scores.iter().any(|row| row.len() != candidates)
            || classes.iter().any(|row| row.len() != candidates);
        if ragged {
            return Err(anyhow!("output rows have differing candidate counts"));
        }
        Self::from_flat(
            batch,
            candidates,
            boxes.into_iter().flatten().flatten().collect(),
            scores.into_iter().flatten().collect(),
            classes.into_iter().flatten().collect(),
        )
    }

    /// Attach the optional `num_detections` output. Never consulted by decoding.
    pub fn with_num_detections(mut self, num_detections: Vec<f32>) -> Self {
        self.num_detections = Some(num_detections);
        self
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn candidates(&self) -> usize {
        self.candidates
    }

    pub fn score(&self, i: usize, j: usize) -> f32 {
        self.scores[i * self.candidates + j]
    }

    pub fn class(&self, i: usize, j: usize) -> f32 {
        self.classes[i * self.candidates + j]
    }

    /// `[ymin, xmin, ymax, xmax]`
    pub fn bbox(&self, i: usize, j: usize) -> [f32; 4] {
        let start = (i * self.candidates + j) * 4;
        [
            self.boxes[start],
            self.boxes[start + 1],
            self.boxes[start + 2],
            self.boxes[start + 3],
        ]
    }

    pub fn num_detections(&self) -> Option<&[f32]> {
        self.num_detections.as_deref()
    }
}

/// Inference engine boundary.
///
/// The engine is owned by exactly one worker for the lifetime of a detection
/// loop and is never called concurrently. It is released by `Drop` once the
/// loop has fully stopped.
pub trait InferenceEngine: Send {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    /// Run one `(1, S, S, 3)` tensor through the graph.
    fn infer(&mut self, tensor: &InputTensor) -> Result<RawDetections>;

    /// Optional warm-up hook, called once before the first cycle.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn infer(&mut self, tensor: &InputTensor) -> Result<RawDetections> {
        (**self).infer(tensor)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_outputs_flatten_in_row_major_order() {
        let raw = RawDetections::from_nested(
            vec![vec![[0.1, 0.2, 0.5, 0.6], [0.0, 0.0, 0.0, 0.0]]],
            vec![vec![0.9, 0.1]],
            vec![vec![3.0, 7.0]],
        )
        .unwrap();
        assert_eq!(raw.batch(), 1);
        assert_eq!(raw.candidates(), 2);
        assert_eq!(raw.bbox(0, 0), [0.1, 0.2, 0.5, 0.6]);
        assert_eq!(raw.score(0, 1), 0.1);
        assert_eq!(raw.class(0, 1), 7.0);
        assert!(raw.num_detections().is_none());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(RawDetections::from_flat(1, 2, vec![0.0; 8], vec![0.0; 2], vec![0.0; 1]).is_err());
        assert!(RawDetections::from_flat(1, 2, vec![0.0; 4], vec![0.0; 2], vec![0.0; 2]).is_err());
        assert!(RawDetections::from_nested(
            vec![vec![[0.0; 4]]],
            vec![vec![0.5, 0.5]],
            vec![vec![1.0, 1.0]],
        )
        .is_err());
    }
}
