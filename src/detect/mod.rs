mod backend;
pub mod backends;
mod decoder;
mod result;

pub use backend::{InferenceEngine, RawDetections};
pub use backends::{StubEngine, StubProbe};
pub use decoder::{Decoder, UnknownClassPolicy, DEFAULT_SCORE_THRESHOLD};
pub use result::{Detection, DetectionBatch, NormalizedRect, ScreenRect, Viewport};

#[cfg(feature = "backend-tract")]
pub use backends::TractEngine;
