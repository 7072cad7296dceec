//! Synthetic frame source (`stub://`).
//!
//! Produces a gradient pattern that shifts every frame, paced to the target
//! frame rate. Frames are delivered bottom-up, like a GPU readback.

use anyhow::{bail, Result};
use std::time::{Duration, Instant};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::{CapturedFrame, RGBA_CHANNELS};

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
        }
    }

    fn frame_interval(&self) -> Option<Duration> {
        if self.config.target_fps == 0 {
            None
        } else {
            Some(Duration::from_secs(1) / self.config.target_fps)
        }
    }

    fn pace(&self) {
        let (Some(interval), Some(last)) = (self.frame_interval(), self.last_frame_at) else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let count = self.config.width as usize * self.config.height as usize;
        let mut pixels = Vec::with_capacity(count * RGBA_CHANNELS);
        for i in 0..count {
            let v = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
            pixels.extend_from_slice(&[v, v.wrapping_add(85), v.wrapping_add(170), 255]);
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn connect(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            bail!(
                "synthetic source needs a non-zero size, got {}x{}",
                self.config.width,
                self.config.height
            );
        }
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<CapturedFrame> {
        self.pace();
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        let pixels = self.generate_synthetic_pixels();
        Ok(CapturedFrame::new(
            self.config.width,
            self.config.height,
            pixels,
        ))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RowOrder;

    fn stub_config() -> SourceConfig {
        SourceConfig {
            url: "stub://test".to_string(),
            target_fps: 0,
            width: 32,
            height: 24,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config());
        source.connect()?;

        let frame = source.next_frame()?;
        assert_eq!(frame.width, 32);
        assert_eq!(frame.height, 24);
        assert_eq!(frame.pixels().len(), 32 * 24 * 4);
        assert_eq!(frame.row_order, RowOrder::BottomUp);
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn synthetic_frames_change_between_captures() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config());
        source.connect()?;
        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_ne!(first.pixels(), second.pixels());
        Ok(())
    }

    #[test]
    fn zero_size_is_rejected_on_connect() {
        let mut source = SyntheticSource::new(SourceConfig {
            width: 0,
            ..stub_config()
        });
        assert!(source.connect().is_err());
    }
}
