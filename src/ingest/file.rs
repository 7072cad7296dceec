//! Local still-image source.
//!
//! Decodes one image file at connect time and hands out the same frame on
//! every capture. Useful for reproducing a detection offline.

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::{CapturedFrame, RowOrder};

pub struct ImageFileSource {
    config: SourceConfig,
    frame: Option<CapturedFrame>,
    frame_count: u64,
}

impl ImageFileSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame: None,
            frame_count: 0,
        }
    }
}

impl FrameSource for ImageFileSource {
    fn name(&self) -> &'static str {
        "image-file"
    }

    fn connect(&mut self) -> Result<()> {
        let image = image::open(&self.config.url)
            .with_context(|| format!("failed to open image {}", self.config.url))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        self.frame = Some(
            CapturedFrame::new(width, height, image.into_raw()).with_row_order(RowOrder::TopDown),
        );
        log::info!(
            "ImageFileSource: loaded {} ({}x{})",
            self.config.url,
            width,
            height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<CapturedFrame> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| anyhow!("image source not connected"))?;
        self.frame_count += 1;
        Ok(frame.clone())
    }

    fn is_healthy(&self) -> bool {
        self.frame.is_some()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
