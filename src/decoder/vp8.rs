//! VP8 uncompressed data chunk parsing (RFC 6386, section 9.1)

use crate::error::IngestError;

const START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vp8FrameHeader {
    pub key_frame: bool,
    pub version: u8,
    pub show_frame: bool,
    pub first_partition_size: u32,
    /// Only present on keyframes
    pub width: u16,
    pub height: u16,
    pub horizontal_scale: u8,
    pub vertical_scale: u8,
}

fn header_error(reason: impl Into<String>) -> IngestError {
    IngestError::Header {
        reason: reason.into(),
    }
}

pub fn parse_frame_header(frame: &[u8]) -> Result<Vp8FrameHeader, IngestError> {
    if frame.len() < 3 {
        return Err(header_error(format!("frame tag needs 3 bytes, got {}", frame.len())));
    }

    let tag = frame[0] as u32 | (frame[1] as u32) << 8 | (frame[2] as u32) << 16;
    let key_frame = tag & 0x01 == 0;
    let version = ((tag >> 1) & 0x07) as u8;
    let show_frame = (tag >> 4) & 0x01 == 1;
    let first_partition_size = (tag >> 5) & 0x7_ffff;

    if version > 3 {
        return Err(header_error(format!("unknown version {}", version)));
    }

    let mut header = Vp8FrameHeader {
        key_frame,
        version,
        show_frame,
        first_partition_size,
        width: 0,
        height: 0,
        horizontal_scale: 0,
        vertical_scale: 0,
    };

    if !key_frame {
        return Ok(header);
    }

    if frame.len() < 10 {
        return Err(header_error(format!("keyframe header needs 10 bytes, got {}", frame.len())));
    }
    if frame[3..6] != START_CODE {
        return Err(header_error(format!(
            "bad start code {:02x} {:02x} {:02x}",
            frame[3], frame[4], frame[5]
        )));
    }

    let w = u16::from_le_bytes([frame[6], frame[7]]);
    let h = u16::from_le_bytes([frame[8], frame[9]]);
    header.width = w & 0x3fff;
    header.horizontal_scale = (w >> 14) as u8;
    header.height = h & 0x3fff;
    header.vertical_scale = (h >> 14) as u8;

    if header.width == 0 || header.height == 0 {
        return Err(header_error("zero frame dimension"));
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyframe_header() {
        // 640x480, scale bits set on the height
        let frame = [0x50, 0x42, 0x00, 0x9d, 0x01, 0x2a, 0x80, 0x02, 0xe0, 0x41, 0xff];
        let h = parse_frame_header(&frame).unwrap();
        assert!(h.key_frame);
        assert!(h.show_frame);
        assert_eq!(h.version, 0);
        assert_eq!(h.width, 640);
        assert_eq!(h.height, 480);
        assert_eq!(h.horizontal_scale, 0);
        assert_eq!(h.vertical_scale, 1);
        assert_eq!(h.first_partition_size, (0x004250 >> 5) & 0x7ffff);
    }

    #[test]
    fn test_interframe_header() {
        let h = parse_frame_header(&[0x11, 0x00, 0x00]).unwrap();
        assert!(!h.key_frame);
        assert!(h.show_frame);
        assert_eq!(h.width, 0);
    }

    #[test]
    fn test_invalid_headers() {
        assert!(parse_frame_header(&[]).is_err());
        assert!(parse_frame_header(&[0x10, 0x00]).is_err());
        // keyframe cut short
        assert!(parse_frame_header(&[0x10, 0x00, 0x00, 0x9d, 0x01]).is_err());
        // wrong start code
        let err = parse_frame_header(&[0x10, 0, 0, 0x9d, 0x01, 0x2b, 16, 0, 16, 0]).unwrap_err();
        assert!(matches!(err, IngestError::Header { .. }));
        // version 7
        assert!(parse_frame_header(&[0x0f, 0x00, 0x00]).is_err());
    }
}
