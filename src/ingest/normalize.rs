use anyhow::{anyhow, Result};

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Nv12,
}

/// Convert a device buffer to RGBA8 with opaque alpha.
pub fn to_rgba(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>> {
    let count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    match format {
        PixelFormat::Rgb24 => {
            check_len(pixels, count.checked_mul(3), "RGB")?;
            let mut rgba = Vec::with_capacity(count * 4);
            for px in pixels.chunks_exact(3) {
                rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
            Ok(rgba)
        }
        PixelFormat::Nv12 => nv12_to_rgba(pixels, width as usize, height as usize, count),
    }
}

fn check_len(pixels: &[u8], expected: Option<usize>, what: &str) -> Result<()> {
    let expected = expected.ok_or_else(|| anyhow!("{} frame dimensions overflow", what))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            what,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(pixels: &[u8], w: usize, h: usize, y_plane: usize) -> Result<Vec<u8>> {
    // Chroma is subsampled 2x2; odd edges round up to a whole UV pair.
    let uv_stride = w.div_ceil(2) * 2;
    let uv_plane = uv_stride.checked_mul(h.div_ceil(2));
    check_len(
        pixels,
        uv_plane.and_then(|uv| y_plane.checked_add(uv)),
        "NV12",
    )?;

    let mut rgba = vec![0u8; y_plane * 4];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * uv_stride + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 4;
            rgba[offset] = clamp_to_u8(r);
            rgba[offset + 1] = clamp_to_u8(g);
            rgba[offset + 2] = clamp_to_u8(b);
            rgba[offset + 3] = 255;
        }
    }

    Ok(rgba)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
