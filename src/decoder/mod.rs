//! Video decoding module
//!
//! VP8 header parsing is always available; turning a compressed frame into a
//! raster needs the `ffmpeg` feature.

#[cfg(feature = "ffmpeg")]
mod ffmpeg;

pub mod raster;
pub mod vp8;

use crate::error::IngestError;
use image::RgbImage;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegDecoder;
pub use vp8::{Vp8FrameHeader, parse_frame_header};

/// Turns one compressed frame into an RGB raster.
pub trait FrameDecoder: Send {
    /// `Ok(None)` means the decoder accepted the frame but has no picture yet.
    fn decode(&mut self, frame: &[u8]) -> Result<Option<RgbImage>, IngestError>;
}

#[cfg(feature = "ffmpeg")]
pub fn open_default_decoder() -> Result<Box<dyn FrameDecoder>, IngestError> {
    Ok(Box::new(FfmpegDecoder::new()?))
}

#[cfg(not(feature = "ffmpeg"))]
pub fn open_default_decoder() -> Result<Box<dyn FrameDecoder>, IngestError> {
    Err(IngestError::DecoderUnavailable {
        reason: "built without the `ffmpeg` feature".to_string(),
    })
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn decode(&mut self, frame: &[u8]) -> Result<Option<RgbImage>, IngestError> {
        (**self).decode(frame)
    }
}
