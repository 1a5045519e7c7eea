//! Planar YUV to RGB conversion

use crate::error::IngestError;
use image::RgbImage;

/// Chroma plane size for a 4:2:0 picture
pub fn chroma_dims(width: usize, height: usize) -> (usize, usize) {
    (width.div_ceil(2), height.div_ceil(2))
}

#[inline]
fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert packed, stride-free I420 (Y plane, then U, then V) to RGB using
/// BT.601 limited-range coefficients.
pub fn yuv420_to_rgb(yuv: &[u8], width: usize, height: usize) -> Result<RgbImage, IngestError> {
    let (cw, ch) = chroma_dims(width, height);
    let y_size = width * height;
    let c_size = cw * ch;

    if width == 0 || height == 0 || yuv.len() < y_size + 2 * c_size {
        return Err(IngestError::Decode {
            reason: format!(
                "I420 buffer of {} bytes too small for {}x{}",
                yuv.len(),
                width,
                height
            ),
        });
    }

    let (y_plane, rest) = yuv.split_at(y_size);
    let (u_plane, v_plane) = rest.split_at(c_size);

    let mut rgb = vec![0u8; y_size * 3];
    for row in 0..height {
        let c_row = (row / 2) * cw;
        for col in 0..width {
            let c = y_plane[row * width + col] as i32 - 16;
            let d = u_plane[c_row + col / 2] as i32 - 128;
            let e = v_plane[c_row + col / 2] as i32 - 128;

            let px = (row * width + col) * 3;
            rgb[px] = clamp((298 * c + 409 * e + 128) >> 8);
            rgb[px + 1] = clamp((298 * c - 100 * d - 208 * e + 128) >> 8);
            rgb[px + 2] = clamp((298 * c + 516 * d + 128) >> 8);
        }
    }

    RgbImage::from_raw(width as u32, height as u32, rgb).ok_or_else(|| IngestError::Decode {
        reason: "raster size mismatch".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize, y: u8, u: u8, v: u8) -> Vec<u8> {
        let (cw, ch) = chroma_dims(width, height);
        let mut buf = vec![y; width * height];
        buf.extend(std::iter::repeat_n(u, cw * ch));
        buf.extend(std::iter::repeat_n(v, cw * ch));
        buf
    }

    #[test]
    fn test_black_and_white() {
        let black = yuv420_to_rgb(&solid(4, 2, 16, 128, 128), 4, 2).unwrap();
        assert!(black.pixels().all(|p| p.0 == [0, 0, 0]));

        let white = yuv420_to_rgb(&solid(4, 2, 235, 128, 128), 4, 2).unwrap();
        assert!(white.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn test_red_dominates() {
        // BT.601 red is roughly Y=81 U=90 V=240
        let img = yuv420_to_rgb(&solid(2, 2, 81, 90, 240), 2, 2).unwrap();
        let [r, g, b] = img.get_pixel(0, 0).0;
        assert!(r > 240 && g < 10 && b < 10, "got {:?}", (r, g, b));
    }

    #[test]
    fn test_odd_dimensions() {
        let img = yuv420_to_rgb(&solid(3, 3, 128, 128, 128), 3, 3).unwrap();
        assert_eq!(img.dimensions(), (3, 3));
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(yuv420_to_rgb(&[0u8; 10], 4, 4).is_err());
        assert!(yuv420_to_rgb(&[], 0, 0).is_err());
    }
}
