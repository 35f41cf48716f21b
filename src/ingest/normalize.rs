//! Conversion of native capture layouts to packed RGB24.

use super::CaptureError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    /// Full-resolution Y plane followed by interleaved half-resolution UV.
    Nv12,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
    Yuyv,
}

impl PixelFormat {
    /// Bytes needed for a `width x height` image, `None` on overflow.
    fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels.checked_mul(3),
            PixelFormat::Nv12 => {
                let chroma = nv12_chroma_stride(width as usize)
                    .checked_mul((height as usize).div_ceil(2))?;
                pixels.checked_add(chroma)
            }
            PixelFormat::Yuyv => pixels.checked_mul(2),
        }
    }
}

pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>, CaptureError> {
    let expected = format
        .frame_len(width, height)
        .ok_or_else(|| CaptureError::Format(format!("{:?} frame dimensions overflow", format)))?;
    // Drivers may hand out buffers padded past the image.
    if pixels.len() < expected {
        return Err(CaptureError::Format(format!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        )));
    }
    let pixels = &pixels[..expected];

    Ok(match format {
        PixelFormat::Rgb24 => pixels.to_vec(),
        PixelFormat::Bgr24 => pixels
            .chunks_exact(3)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .collect(),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width as usize, height as usize),
        PixelFormat::Yuyv => yuyv_to_rgb(pixels),
    })
}

/// UV row length in bytes; odd widths still carry a whole final pair.
fn nv12_chroma_stride(width: usize) -> usize {
    width.div_ceil(2) * 2
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let stride = nv12_chroma_stride(w);
    let mut rgb = Vec::with_capacity(y_plane * 3);
    for j in 0..h {
        for i in 0..w {
            let uv = y_plane + (j / 2) * stride + (i / 2) * 2;
            rgb.extend_from_slice(&yuv_to_rgb(pixels[j * w + i], pixels[uv], pixels[uv + 1]));
        }
    }
    rgb
}

fn yuyv_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / 2 * 3);
    for quad in pixels.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

/// BT.601 full-range.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;
    [
        clamp_to_u8(y + 1.402 * v),
        clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v),
        clamp_to_u8(y + 1.772 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_produces_gray() -> Result<(), CaptureError> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        assert_eq!(normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?, vec![128u8; 12]);

        let yuyv = [90u8, 128, 90, 128];
        assert_eq!(normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?, vec![90u8; 6]);
        Ok(())
    }

    #[test]
    fn odd_nv12_sizes_use_a_rounded_chroma_plane() -> Result<(), CaptureError> {
        // 3x3: 9 luma bytes, then 2 chroma rows of 2 UV pairs each.
        let mut nv12 = vec![100u8; 9];
        nv12.extend_from_slice(&[128, 128, 128, 128, 128, 128, 128, 128]);
        let rgb = normalize_to_rgb(&nv12, 3, 3, PixelFormat::Nv12)?;
        assert_eq!(rgb, vec![100u8; 27]);

        let short = &nv12[..13];
        assert!(matches!(
            normalize_to_rgb(short, 3, 3, PixelFormat::Nv12),
            Err(CaptureError::Format(_))
        ));
        Ok(())
    }

    #[test]
    fn bgr_channels_are_swapped() -> Result<(), CaptureError> {
        let bgr = [1u8, 2, 3, 4, 5, 6];
        assert_eq!(
            normalize_to_rgb(&bgr, 2, 1, PixelFormat::Bgr24)?,
            vec![3, 2, 1, 6, 5, 4]
        );
        Ok(())
    }

    #[test]
    fn short_buffers_are_rejected() {
        let result = normalize_to_rgb(&[0u8; 5], 2, 1, PixelFormat::Rgb24);
        assert!(matches!(result, Err(CaptureError::Format(_))));
    }
}
