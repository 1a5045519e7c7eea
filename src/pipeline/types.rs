//! Core types for the pipeline system

use webrtc::rtp::packet::Packet;

/// Kind of media data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video frame data
    Video,
    /// Audio sample data
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// Codec of the track a packet arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecTag {
    Vp8,
    Opus,
    /// Any other negotiated codec, kept by its lowercase MIME type
    Other(String),
}

impl CodecTag {
    /// Build a tag from a track MIME type (`video/VP8`, `audio/opus`, ...).
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.to_lowercase();
        match mime.as_str() {
            "video/vp8" => CodecTag::Vp8,
            "audio/opus" => CodecTag::Opus,
            _ => CodecTag::Other(mime),
        }
    }

    /// Media kind of the codecs this pipeline knows about
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            CodecTag::Vp8 => Some(MediaKind::Video),
            CodecTag::Opus => Some(MediaKind::Audio),
            CodecTag::Other(_) => None,
        }
    }

    /// Short codec name, as printed when a track starts
    pub fn name(&self) -> &str {
        match self {
            CodecTag::Vp8 => "VP8",
            CodecTag::Opus => "opus",
            CodecTag::Other(mime) => mime.split('/').nth(1).unwrap_or(mime),
        }
    }
}

impl std::fmt::Display for CodecTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An RTP packet together with the codec of its track.
///
/// Moved by value from the intake through the queue to the active sink.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub packet: Packet,
    pub codec: CodecTag,
}

impl QueuedPacket {
    pub fn new(packet: Packet, codec: CodecTag) -> Self {
        Self { packet, codec }
    }

    pub fn sequence_number(&self) -> u16 {
        self.packet.header.sequence_number
    }
}
