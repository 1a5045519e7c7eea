use crate::decoder::FrameDecoder;
use crate::decoder::raster::{chroma_dims, yuv420_to_rgb};
use crate::error::IngestError;
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::codec::video::VideoDecoder;
use ac_ffmpeg::packet::PacketMut;
use ac_ffmpeg::time::{TimeBase, Timestamp};
use image::RgbImage;

use crate::assets::VP8_CLOCK_RATE;

/// VP8 video decoder using FFmpeg.
pub struct FfmpegDecoder {
    decoder: VideoDecoder,
    frame_count: i64,
    /// Reusable buffer for packed YUV output to avoid per-frame allocation
    packed_buffer: Vec<u8>,
}

unsafe impl Send for FfmpegDecoder {}

fn decode_error(e: impl std::fmt::Display) -> IngestError {
    IngestError::Decode {
        reason: e.to_string(),
    }
}

impl FfmpegDecoder {
    pub fn new() -> Result<Self, IngestError> {
        let decoder = VideoDecoder::builder("vp8")
            .and_then(|b| b.time_base(TimeBase::new(1, VP8_CLOCK_RATE as i32)).build())
            .map_err(|e| IngestError::DecoderUnavailable {
                reason: e.to_string(),
            })?;

        Ok(Self {
            decoder,
            frame_count: 0,
            packed_buffer: Vec::new(),
        })
    }

    #[inline]
    fn next_pts(&mut self) -> Timestamp {
        self.frame_count += 1;
        Timestamp::new(self.frame_count, TimeBase::new(1, VP8_CLOCK_RATE as i32))
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn decode(&mut self, frame: &[u8]) -> Result<Option<RgbImage>, IngestError> {
        let pts = self.next_pts();
        let packet = PacketMut::from(frame).with_pts(pts).freeze();

        self.decoder.try_push(packet).map_err(decode_error)?;

        let Some(picture) = self.decoder.take().map_err(decode_error)? else {
            return Ok(None);
        };

        let w = picture.width();
        let h = picture.height();
        let (cw, ch) = chroma_dims(w, h);
        let planes = picture.planes();
        if planes.len() < 3 {
            return Err(decode_error(format!("expected 3 planes, got {}", planes.len())));
        }

        self.packed_buffer.resize(w * h + cw * ch * 2, 0);
        pack_yuv420(
            &mut self.packed_buffer,
            Plane {
                data: planes[0].data(),
                stride: planes[0].line_size(),
                width: w,
                height: h,
            },
            Plane {
                data: planes[1].data(),
                stride: planes[1].line_size(),
                width: cw,
                height: ch,
            },
            Plane {
                data: planes[2].data(),
                stride: planes[2].line_size(),
                width: cw,
                height: ch,
            },
        );

        yuv420_to_rgb(&self.packed_buffer, w, h).map(Some)
    }
}

#[derive(Clone, Copy)]
struct Plane<'a> {
    data: &'a [u8],
    stride: usize,
    width: usize,
    height: usize,
}

fn pack_yuv420(dst: &mut [u8], y: Plane<'_>, u: Plane<'_>, v: Plane<'_>) {
    let y_size = y.width * y.height;
    let u_size = u.width * u.height;
    extract_plane(&mut dst[..y_size], y);
    extract_plane(&mut dst[y_size..y_size + u_size], u);
    extract_plane(&mut dst[y_size + u_size..], v);
}

/// Extract a plane from padded source to contiguous destination.
#[inline]
fn extract_plane(dst: &mut [u8], plane: Plane<'_>) {
    let Plane {
        data: src,
        stride,
        width,
        height,
    } = plane;

    // No stride padding: single copy
    if stride == width && src.len() >= width * height {
        dst.copy_from_slice(&src[..width * height]);
        return;
    }

    for r in 0..height {
        let src_start = r * stride;
        let dst_start = r * width;
        if src_start + width > src.len() || dst_start + width > dst.len() {
            break;
        }
        dst[dst_start..dst_start + width].copy_from_slice(&src[src_start..src_start + width]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plane_strips_padding() {
        let src = [1, 2, 9, 9, 3, 4, 9, 9];
        let mut dst = [0u8; 4];
        extract_plane(
            &mut dst,
            Plane {
                data: &src,
                stride: 4,
                width: 2,
                height: 2,
            },
        );
        assert_eq!(dst, [1, 2, 3, 4]);
    }
}
