//! Captured frames and the tensor preprocessor.
//!
//! - `CapturedFrame`: RGBA8 pixel buffer as delivered by a frame source.
//! - `InputTensor`: `(1, S, S, 3)` u8 buffer in the engine's row order.
//! - `Preprocessor`: resample, row-order normalization, channel packing.
//!
//! Capture buffers are bottom-up by default (first row in memory is the
//! bottom of the image) while the engine expects top-down rows. Skipping the
//! flip mirrors every decoded box vertically.

use anyhow::{bail, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::DetectError;

pub const RGBA_CHANNELS: usize = 4;
pub const TENSOR_CHANNELS: usize = 3;
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Memory order of the rows in a captured frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RowOrder {
    /// First row in memory is the bottom of the image.
    #[default]
    BottomUp,
    /// First row in memory is the top of the image.
    TopDown,
}

/// A captured RGBA8 frame.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub row_order: RowOrder,
}

impl CapturedFrame {
    /// Wrap an RGBA8 buffer. Rows are assumed bottom-up.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            pixels,
            width,
            height,
            row_order: RowOrder::BottomUp,
        }
    }

    /// A frame where every pixel has the same color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * RGBA_CHANNELS);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self::new(width, height, pixels)
    }

    pub fn with_row_order(mut self, row_order: RowOrder) -> Self {
        self.row_order = row_order;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(RGBA_CHANNELS))
    }

    fn validate(&self) -> Result<(), DetectError> {
        if self.width == 0 || self.height == 0 {
            return Err(DetectError::invalid_frame(format!(
                "frame has zero dimension ({}x{})",
                self.width, self.height
            )));
        }
        let expected = self
            .expected_len()
            .ok_or_else(|| DetectError::invalid_frame("frame dimensions overflow"))?;
        if self.pixels.len() != expected {
            return Err(DetectError::invalid_frame(format!(
                "expected {} RGBA bytes for {}x{}, received {}",
                expected,
                self.width,
                self.height,
                self.pixels.len()
            )));
        }
        Ok(())
    }
}

/// Engine input: `(1, size, size, 3)` u8, channel interleaved, rows top-down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputTensor {
    size: u32,
    data: Vec<u8>,
}

impl InputTensor {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn shape(&self) -> [usize; 4] {
        let s = self.size as usize;
        [1, s, s, TENSOR_CHANNELS]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Packed triplet at column `x`, row `y` (top-down), if in range.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.size || y >= self.size {
            return None;
        }
        let idx = (y as usize * self.size as usize + x as usize) * TENSOR_CHANNELS;
        let px = self.data.get(idx..idx + TENSOR_CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

/// Converts captured frames into engine tensors.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    size: u32,
    mean: f32,
    scale: f32,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            size: DEFAULT_INPUT_SIZE,
            mean: 0.0,
            scale: 1.0,
        }
    }
}

impl Preprocessor {
    pub fn new(size: u32) -> Result<Self> {
        if size == 0 {
            bail!("preprocessor input size must be greater than zero");
        }
        Ok(Self {
            size,
            ..Self::default()
        })
    }

    /// Override `value = (channel - mean) / scale`. Identity is `(0, 1)`.
    pub fn with_normalization(mut self, mean: f32, scale: f32) -> Result<Self> {
        if !mean.is_finite() {
            bail!("preprocessor mean must be finite");
        }
        if !scale.is_finite() || scale == 0.0 {
            bail!("preprocessor scale must be finite and non-zero");
        }
        self.mean = mean;
        self.scale = scale;
        Ok(self)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Produce the engine tensor for a frame.
    pub fn process(&self, frame: &CapturedFrame) -> Result<InputTensor, DetectError> {
        frame.validate()?;

        let resized;
        let square: &[u8] = if frame.width == self.size && frame.height == self.size {
            frame.pixels()
        } else {
            let image = RgbaImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
                .ok_or_else(|| DetectError::invalid_frame("frame buffer rejected by resampler"))?;
            resized = imageops::resize(&image, self.size, self.size, FilterType::Triangle);
            resized.as_raw()
        };

        let side = self.size as usize;
        let mut data = Vec::with_capacity(side * side * TENSOR_CHANNELS);
        for row in 0..side {
            let src_row = match frame.row_order {
                RowOrder::BottomUp => side - 1 - row,
                RowOrder::TopDown => row,
            };
            let start = src_row * side * RGBA_CHANNELS;
            let line = &square[start..start + side * RGBA_CHANNELS];
            for px in line.chunks_exact(RGBA_CHANNELS) {
                data.push(self.normalize(px[0]));
                data.push(self.normalize(px[1]));
                data.push(self.normalize(px[2]));
            }
        }

        Ok(InputTensor {
            size: self.size,
            data,
        })
    }

    fn normalize(&self, channel: u8) -> u8 {
        ((channel as f32 - self.mean) / self.scale)
            .round()
            .clamp(0.0, 255.0) as u8
    }
}
