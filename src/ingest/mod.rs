//! Frame sources.
//!
//! This module provides the capture side of the pipeline:
//! - Synthetic source (`stub://...`) for tests and demos
//! - Local still-image file, re-served every cycle
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source yields RGBA8 `CapturedFrame`s and records the memory row
//! order it delivers, so the preprocessor can flip rows when needed.

pub mod file;
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{bail, Result};

use crate::frame::CapturedFrame;

pub use file::ImageFileSource;
pub use normalize::{to_rgba, PixelFormat};
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

const DEFAULT_SOURCE_URL: &str = "stub://camera";

/// Configuration shared by all frame sources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// `stub://name`, `/dev/videoN` / `v4l2:///dev/videoN`, or a local image path.
    pub url: String,
    /// Target frame rate. Zero disables pacing.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Capture boundary. Sources are driven from the loop thread only.
pub trait FrameSource: Send {
    /// Source identifier.
    fn name(&self) -> &'static str;

    /// Open the underlying device or file.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Capture the next frame. May block briefly on device readback.
    fn next_frame(&mut self) -> Result<CapturedFrame>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<CapturedFrame> {
        (**self).next_frame()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Build a source for the configured URL. The source is not yet connected.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    let url = config.url.trim();
    if url.is_empty() {
        bail!("source url must not be empty");
    }
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    if url.starts_with("v4l2://") || url.starts_with("/dev/video") {
        #[cfg(feature = "ingest-v4l2")]
        {
            let mut config = config.clone();
            config.url = url.trim_start_matches("v4l2://").to_string();
            return Ok(Box::new(V4l2Source::new(config)?));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            bail!("camera capture requires the ingest-v4l2 feature")
        }
    }
    if url.contains("://") {
        bail!("unsupported source url '{}'", url);
    }
    Ok(Box::new(ImageFileSource::new(config.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> SourceConfig {
        SourceConfig {
            url: url.to_string(),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn dispatches_on_url() -> Result<()> {
        assert_eq!(open_source(&config("stub://front"))?.name(), "synthetic");
        assert_eq!(open_source(&config("/tmp/still.png"))?.name(), "image-file");
        assert!(open_source(&config("rtsp://camera")).is_err());
        assert!(open_source(&config("  ")).is_err());
        Ok(())
    }
}
