//! Frame Detect
//!
//! Turns camera frames into labeled, screen-placed object detections.
//!
//! # Architecture
//!
//! Each detection cycle runs these stages in order, one cycle at a time:
//!
//! 1. **Capture**: a `FrameSource` delivers an RGBA8 frame.
//! 2. **Preprocess**: the frame is resampled to `S x S`, rows are put in
//!    top-down order, and RGB is packed into a `(1, S, S, 3)` u8 tensor.
//! 3. **Infer**: an `InferenceEngine` on its own worker thread produces raw
//!    boxes, scores and class ids.
//! 4. **Decode**: candidates above the score threshold are labeled through
//!    the `CatalogIndex` and published as a `DetectionBatch`.
//!
//! # Module Structure
//!
//! - `catalog`: label manifest parser and `id -> label` index
//! - `frame`: captured frames, input tensors, preprocessing
//! - `detect`: engine boundary, backends, decoder, detection types
//! - `ingest`: frame sources (synthetic, still image, V4L2)
//! - `pipeline`: single-flight detection loop and its handle
//! - `config`: `detectd` settings (file + `DETECT_*` environment)

pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;

pub use catalog::{parse_catalog, CatalogIndex, CatalogItem, DuplicateIdPolicy};
pub use config::DetectorConfig;
pub use detect::{
    Decoder, Detection, DetectionBatch, InferenceEngine, NormalizedRect, RawDetections,
    ScreenRect, StubEngine, UnknownClassPolicy, Viewport,
};
pub use error::{DetectError, LoopError, Stage};
pub use frame::{CapturedFrame, InputTensor, Preprocessor, RowOrder};
pub use ingest::{open_source, FrameSource, SourceConfig};
pub use pipeline::{DetectionLoop, ExitReason, LoopExit, LoopHandle, LoopState, LoopStatus};
