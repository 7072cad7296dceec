use std::sync::Arc;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::catalog::CatalogIndex;
use crate::detect::backend::RawDetections;
use crate::detect::result::{Detection, NormalizedRect};
use crate::error::DetectError;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;

/// What to do with a candidate whose class id is not in the catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownClassPolicy {
    /// Drop the candidate.
    #[default]
    Skip,
    /// Emit an `UnknownClass` error in the candidate's position.
    Strict,
}

/// Turns raw engine outputs into labeled detections.
#[derive(Clone, Debug)]
pub struct Decoder {
    catalog: Arc<CatalogIndex>,
    threshold: f32,
    policy: UnknownClassPolicy,
}

impl Decoder {
    pub fn new(catalog: Arc<CatalogIndex>) -> Self {
        Self {
            catalog,
            threshold: DEFAULT_SCORE_THRESHOLD,
            policy: UnknownClassPolicy::default(),
        }
    }

    /// Candidates scoring below `threshold` are dropped.
    pub fn with_threshold(mut self, threshold: f32) -> Result<Self> {
        if !threshold.is_finite() {
            bail!("score threshold must be finite, got {}", threshold);
        }
        self.threshold = threshold;
        Ok(self)
    }

    pub fn with_policy(mut self, policy: UnknownClassPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn policy(&self) -> UnknownClassPolicy {
        self.policy
    }

    /// Decode every candidate, batch-major then candidate index ascending.
    ///
    /// Under `Skip`, unknown classes never appear in the output. Under
    /// `Strict`, each one becomes an `Err` at its position and decoding
    /// continues with the next candidate.
    pub fn decode(&self, raw: &RawDetections) -> Vec<Result<Detection, DetectError>> {
        let mut out = Vec::new();
        for i in 0..raw.batch() {
            for j in 0..raw.candidates() {
                let score = raw.score(i, j);
                if score.is_nan() || score < self.threshold {
                    continue;
                }

                let [ymin, xmin, ymax, xmax] = raw.bbox(i, j);
                let class_value = raw.class(i, j);
                let item = class_id_of(class_value).and_then(|id| self.catalog.lookup(id));

                match item {
                    Some(item) => out.push(Ok(Detection {
                        class_id: item.id,
                        label: item.display_name.clone(),
                        score,
                        rect: NormalizedRect {
                            x0: xmin,
                            y0: ymin,
                            x1: xmax,
                            y1: ymax,
                        },
                    })),
                    None => match self.policy {
                        UnknownClassPolicy::Skip => {
                            log::debug!(
                                "decoder: skipping candidate [{}][{}] with unknown class {}",
                                i,
                                j,
                                class_value
                            );
                        }
                        UnknownClassPolicy::Strict => out.push(Err(DetectError::UnknownClass {
                            class_id: rounded_class(class_value),
                            batch: i,
                            candidate: j,
                        })),
                    },
                }
            }
        }
        out
    }

    /// Decode a whole output set, failing on the first unknown class under `Strict`.
    pub fn decode_batch(&self, raw: &RawDetections) -> Result<Vec<Detection>, DetectError> {
        self.decode(raw).into_iter().collect()
    }
}

fn rounded_class(value: f32) -> i64 {
    if value.is_finite() {
        value.round() as i64
    } else {
        -1
    }
}

fn class_id_of(value: f32) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round();
    if rounded < 0.0 || rounded > u32::MAX as f32 {
        return None;
    }
    Some(rounded as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogItem, DuplicateIdPolicy};

    fn catalog(entries: &[(u32, &str)]) -> Arc<CatalogIndex> {
        let items = entries.iter().map(|(id, label)| CatalogItem {
            id: *id,
            name: format!("/m/{}", id),
            display_name: label.to_string(),
        });
        Arc::new(CatalogIndex::build(items, DuplicateIdPolicy::Reject))
    }

    fn two_candidates() -> RawDetections {
        RawDetections::from_nested(
            vec![vec![[0.1, 0.2, 0.5, 0.6], [0.0, 0.0, 0.0, 0.0]]],
            vec![vec![0.9, 0.1]],
            vec![vec![3.0, 7.0]],
        )
        .unwrap()
    }

    #[test]
    fn thresholds_and_resolves_labels() {
        let decoder = Decoder::new(catalog(&[(3, "cat")]));
        let detections = decoder.decode_batch(&two_candidates()).unwrap();
        assert_eq!(
            detections,
            vec![Detection {
                class_id: 3,
                label: "cat".to_string(),
                score: 0.9,
                rect: NormalizedRect {
                    x0: 0.2,
                    y0: 0.1,
                    x1: 0.6,
                    y1: 0.5,
                },
            }]
        );
    }

    #[test]
    fn decoding_is_deterministic() {
        let decoder = Decoder::new(catalog(&[(1, "a"), (2, "b"), (3, "c")]));
        let raw = RawDetections::from_nested(
            vec![vec![[0.0, 0.0, 1.0, 1.0]; 4]],
            vec![vec![0.8, 0.4, 0.95, 0.31]],
            vec![vec![2.0, 1.0, 3.0, 1.0]],
        )
        .unwrap();
        let first = decoder.decode_batch(&raw).unwrap();
        let second = decoder.decode_batch(&raw).unwrap();
        assert_eq!(first, second);
        let labels: Vec<&str> = first.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["b", "a", "c", "a"]);
    }

    #[test]
    fn score_equal_to_threshold_is_kept() {
        let decoder = Decoder::new(catalog(&[(1, "a")]))
            .with_threshold(0.5)
            .unwrap();
        let raw = RawDetections::from_nested(
            vec![vec![[0.0; 4]; 2]],
            vec![vec![0.5, 0.49]],
            vec![vec![1.0, 1.0]],
        )
        .unwrap();
        assert_eq!(decoder.decode_batch(&raw).unwrap().len(), 1);
    }

    #[test]
    fn class_values_round_to_nearest() {
        let decoder = Decoder::new(catalog(&[(4, "four")]));
        let raw = RawDetections::from_nested(
            vec![vec![[0.0; 4]; 2]],
            vec![vec![0.9, 0.9]],
            vec![vec![3.9999, 4.2]],
        )
        .unwrap();
        let detections = decoder.decode_batch(&raw).unwrap();
        assert_eq!(detections.len(), 2);
        assert!(detections.iter().all(|d| d.class_id == 4));
    }

    #[test]
    fn skip_policy_drops_unknown_classes() {
        let decoder = Decoder::new(catalog(&[(1, "a")]));
        let raw = RawDetections::from_nested(
            vec![vec![[0.0; 4]; 3]],
            vec![vec![0.9, 0.9, 0.9]],
            vec![vec![42.0, 1.0, -3.0]],
        )
        .unwrap();
        let decoded = decoder.decode(&raw);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].as_ref().unwrap().label, "a");
    }

    #[test]
    fn strict_policy_isolates_unknown_candidates() {
        let decoder = Decoder::new(catalog(&[(1, "a")])).with_policy(UnknownClassPolicy::Strict);
        let raw = RawDetections::from_nested(
            vec![vec![[0.0; 4]; 3]],
            vec![vec![0.9, 0.9, 0.9]],
            vec![vec![1.0, 42.0, 1.0]],
        )
        .unwrap();
        let decoded = decoder.decode(&raw);
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].is_ok());
        assert!(matches!(
            decoded[1],
            Err(DetectError::UnknownClass {
                class_id: 42,
                batch: 0,
                candidate: 1
            })
        ));
        assert!(decoded[2].is_ok());
        assert!(decoder.decode_batch(&raw).is_err());
    }

    #[test]
    fn boxes_pass_through_unclamped() {
        let decoder = Decoder::new(catalog(&[(1, "a")]));
        let raw = RawDetections::from_nested(
            vec![vec![[1.2, 0.9, -0.1, 0.1]]],
            vec![vec![0.7]],
            vec![vec![1.0]],
        )
        .unwrap();
        let det = &decoder.decode_batch(&raw).unwrap()[0];
        assert_eq!(
            det.rect,
            NormalizedRect {
                x0: 0.9,
                y0: 1.2,
                x1: 0.1,
                y1: -0.1,
            }
        );
    }

    #[test]
    fn iterates_batches_outer() {
        let decoder = Decoder::new(catalog(&[(1, "a"), (2, "b")]));
        let raw = RawDetections::from_nested(
            vec![vec![[0.0; 4]], vec![[0.0; 4]]],
            vec![vec![0.9], vec![0.9]],
            vec![vec![2.0], vec![1.0]],
        )
        .unwrap();
        let labels: Vec<String> = decoder
            .decode_batch(&raw)
            .unwrap()
            .into_iter()
            .map(|d| d.label)
            .collect();
        assert_eq!(labels, vec!["b", "a"]);
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let decoder = Decoder::new(catalog(&[(1, "a")]));
        assert!(decoder.clone().with_threshold(f32::NAN).is_err());
        assert!(decoder.clone().with_threshold(f32::INFINITY).is_err());
        assert_eq!(decoder.with_threshold(0.7).unwrap().threshold(), 0.7);
    }
}
