//! Error taxonomy of the ingest pipeline
//!
//! Every failure is either transient (logged, the pipeline keeps going and the
//! next cycle retries) or fatal (the pipeline cannot continue and the process
//! shuts down through the coordinator).

use crate::pipeline::MediaKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Frame header parse failed: {reason}")]
    Header { reason: String },

    #[error("Frame decode failed: {reason}")]
    Decode { reason: String },

    #[error("Decoder unavailable: {reason}")]
    DecoderUnavailable { reason: String },

    #[error("Image encode failed: {reason}")]
    ImageEncode { reason: String },

    #[error("Failed to persist image {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {kind} container at {path:?}: {reason}")]
    WriterOpen {
        kind: MediaKind,
        path: PathBuf,
        reason: String,
    },

    #[error("{kind} container write failed: {reason}")]
    Write { kind: MediaKind, reason: String },

    #[error("{kind} container close failed: {reason}")]
    Close { kind: MediaKind, reason: String },

    #[error("Control message send failed: {reason}")]
    ControlSend { reason: String },

    #[error("Peer connection error: {0}")]
    Peer(#[from] webrtc::Error),

    #[error("Signaling error: {reason}")]
    Signal { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How the pipeline reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged, the pipeline continues.
    Transient,
    /// Logged, the process shuts down.
    Fatal,
}

impl IngestError {
    pub fn severity(&self) -> Severity {
        match self {
            IngestError::Header { .. }
            | IngestError::ImageEncode { .. }
            | IngestError::Persist { .. }
            | IngestError::ControlSend { .. } => Severity::Transient,
            IngestError::Decode { .. }
            | IngestError::DecoderUnavailable { .. }
            | IngestError::WriterOpen { .. }
            | IngestError::Write { .. }
            | IngestError::Close { .. }
            | IngestError::Peer(_)
            | IngestError::Signal { .. }
            | IngestError::Io(_) => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_classes() {
        let header = IngestError::Header {
            reason: "short".into(),
        };
        let decode = IngestError::Decode {
            reason: "bitstream".into(),
        };
        let write = IngestError::Write {
            kind: MediaKind::Video,
            reason: "disk full".into(),
        };
        let persist = IngestError::Persist {
            path: PathBuf::from("out1.jpg"),
            source: std::io::Error::other("denied"),
        };

        assert!(!header.is_fatal());
        assert!(!persist.is_fatal());
        assert!(decode.is_fatal());
        assert!(write.is_fatal());
    }

    #[test]
    fn test_display_mentions_media_kind() {
        let err = IngestError::Close {
            kind: MediaKind::Audio,
            reason: "flush".into(),
        };
        assert_eq!(err.to_string(), "Audio container close failed: flush");
    }
}
