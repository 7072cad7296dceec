//! V4L2 frame source.
//!
//! Captures from a local device node (e.g. /dev/video0) through libv4l,
//! requesting RGB24 and accepting NV12 when the driver insists. Frames are
//! converted to RGBA in-memory and delivered top-down.

use anyhow::{bail, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::normalize::{to_rgba, PixelFormat};
use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::{CapturedFrame, RowOrder};

pub struct V4l2Source {
    config: SourceConfig,
    state: Option<DeviceV4l2State>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if !config.url.starts_with("/dev/") {
            bail!("v4l2 source expects a device path, got '{}'", config.url);
        }
        Ok(Self {
            active_width: config.width,
            active_height: config.height,
            active_format: PixelFormat::Rgb24,
            config,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.url)
            .with_context(|| format!("open v4l2 device {}", self.config.url))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.url,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.active_format = if format.fourcc == v4l::FourCC::new(b"RGB3") {
            PixelFormat::Rgb24
        } else if format.fourcc == v4l::FourCC::new(b"NV12") {
            PixelFormat::Nv12
        } else {
            bail!(
                "v4l2 device {} negotiated unsupported format {}",
                self.config.url,
                format.fourcc
            );
        };

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.url,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.config.url,
            self.active_width,
            self.active_height,
            self.active_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<CapturedFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;

        let used = (meta.bytesused as usize).min(buf.len());
        let pixels = to_rgba(
            &buf[..used],
            self.active_width,
            self.active_height,
            self.active_format,
        )?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        Ok(
            CapturedFrame::new(self.active_width, self.active_height, pixels)
                .with_row_order(RowOrder::TopDown),
        )
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
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

    #[test]
    fn rejects_non_device_paths() {
        let config = SourceConfig {
            url: "stub://camera".to_string(),
            ..SourceConfig::default()
        };
        assert!(V4l2Source::new(config).is_err());
    }

    #[test]
    fn unconnected_source_cannot_capture() -> Result<()> {
        let mut source = V4l2Source::new(SourceConfig {
            url: "/dev/video99".to_string(),
            ..SourceConfig::default()
        })?;
        assert!(source.next_frame().is_err());
        Ok(())
    }
}
