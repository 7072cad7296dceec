//! Error taxonomy for the frame-to-detections core.
//!
//! Catalog parse problems never reach this type: malformed manifest blocks are
//! skipped inside the parser. Everything here is either fatal to the current
//! cycle (and therefore to the loop) or, for `UnknownClass`, policy dependent.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    /// The captured frame cannot be turned into a valid tensor.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A decoded class id has no catalog entry (strict policy only).
    #[error("unknown class id {class_id} at candidate [{batch}][{candidate}]")]
    UnknownClass {
        class_id: i64,
        batch: usize,
        candidate: usize,
    },

    /// The engine call failed or returned malformed outputs.
    #[error("inference failed: {0:#}")]
    InferenceFailure(anyhow::Error),

    /// No frame was available from the source. This is the capture-side
    /// counterpart of `InvalidFrame`: the frame never existed rather than
    /// arriving malformed. Always reported under `Stage::Capturing`.
    #[error("capture failed: {0:#}")]
    Capture(anyhow::Error),
}

impl DetectError {
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        DetectError::InvalidFrame(msg.into())
    }
}

/// Pipeline stage a cycle was in when it failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Capturing,
    Preprocessing,
    Inferring,
    Decoding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Capturing => "capture",
            Stage::Preprocessing => "preprocess",
            Stage::Inferring => "inference",
            Stage::Decoding => "decode",
        };
        f.write_str(name)
    }
}

/// Terminal error of the detection loop, reported once to the caller.
#[derive(Debug, Error)]
#[error("cycle {cycle} stopped in {stage} stage: {source}")]
pub struct LoopError {
    pub cycle: u64,
    pub stage: Stage,
    #[source]
    pub source: DetectError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_error_message_names_cycle_and_stage() {
        let err = LoopError {
            cycle: 7,
            stage: Stage::Preprocessing,
            source: DetectError::invalid_frame("zero width"),
        };
        assert_eq!(
            err.to_string(),
            "cycle 7 stopped in preprocess stage: invalid frame: zero width"
        );
    }

    #[test]
    fn unknown_class_reports_position() {
        let err = DetectError::UnknownClass {
            class_id: 91,
            batch: 0,
            candidate: 4,
        };
        assert!(err.to_string().contains("91"));
        assert!(err.to_string().contains("[0][4]"));
    }
}
