use crate::assets::{VIDEO_HEIGHT, VIDEO_WIDTH};
use crate::error::IngestError;
use crate::pipeline::MediaKind;
use crate::workers::WorkerClose;
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use webrtc::media::io::Writer;
use webrtc::media::io::ivf_reader::IVFFileHeader;
use webrtc::media::io::ivf_writer::IVFWriter;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::rtp::packet::Packet;

/// A media container that accepts RTP packets
pub trait ContainerWriter: Send {
    fn write_rtp(&mut self, packet: &Packet) -> Result<(), IngestError>;

    /// Finalize the container. Called at most once by `SaveStream`.
    fn close(&mut self) -> Result<(), IngestError>;
}

/// Adapter from a `webrtc` media writer to `ContainerWriter`.
///
/// Refuses writes after close and turns a second close into a no-op, so the
/// trailer (IVF frame count, Ogg end-of-stream page) is written exactly once.
pub struct MediaFileWriter<W: Writer + Send> {
    kind: MediaKind,
    inner: W,
    closed: bool,
}

impl<W: Writer + Send> MediaFileWriter<W> {
    pub fn new(kind: MediaKind, inner: W) -> Self {
        Self {
            kind,
            inner,
            closed: false,
        }
    }
}

impl<W: Writer + Send> ContainerWriter for MediaFileWriter<W> {
    fn write_rtp(&mut self, packet: &Packet) -> Result<(), IngestError> {
        if self.closed {
            return Err(IngestError::Write {
                kind: self.kind,
                reason: "container already closed".to_string(),
            });
        }
        self.inner.write_rtp(packet).map_err(|e| IngestError::Write {
            kind: self.kind,
            reason: e.to_string(),
        })
    }

    fn close(&mut self) -> Result<(), IngestError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close().map_err(|e| IngestError::Close {
            kind: self.kind,
            reason: e.to_string(),
        })
    }
}

fn create_file(kind: MediaKind, path: &Path) -> Result<BufWriter<File>, IngestError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| IngestError::WriterOpen {
            kind,
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| IngestError::WriterOpen {
            kind,
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn vp8_ivf_header() -> IVFFileHeader {
    IVFFileHeader {
        signature: *b"DKIF",
        version: 0,
        header_size: 32,
        four_cc: *b"VP80",
        width: VIDEO_WIDTH,
        height: VIDEO_HEIGHT,
        timebase_denominator: 30,
        timebase_numerator: 1,
        // Rewritten with the real count on close
        num_frames: 900,
        unused: 0,
    }
}

/// The pair of containers used by the raw sink
pub struct SaveStream {
    audio: Box<dyn ContainerWriter>,
    video: Box<dyn ContainerWriter>,
    closed: bool,
}

impl SaveStream {
    /// Open `video_path` as a VP8 IVF file and `audio_path` as an Opus Ogg
    /// file. Either failing is fatal for the raw sink.
    pub fn open(
        video_path: &Path,
        audio_path: &Path,
        sample_rate: u32,
        channels: u8,
    ) -> Result<Self, IngestError> {
        let video_file = create_file(MediaKind::Video, video_path)?;
        let video = IVFWriter::new(video_file, &vp8_ivf_header()).map_err(|e| {
            IngestError::WriterOpen {
                kind: MediaKind::Video,
                path: video_path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        let audio_file = create_file(MediaKind::Audio, audio_path)?;
        let audio = OggWriter::new(audio_file, sample_rate, channels).map_err(|e| {
            IngestError::WriterOpen {
                kind: MediaKind::Audio,
                path: audio_path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        info!(
            "SaveStream: writing video to {} and audio to {}",
            video_path.display(),
            audio_path.display()
        );

        Ok(Self::from_writers(
            Box::new(MediaFileWriter::new(MediaKind::Audio, audio)),
            Box::new(MediaFileWriter::new(MediaKind::Video, video)),
        ))
    }

    pub fn from_writers(
        audio: Box<dyn ContainerWriter>,
        video: Box<dyn ContainerWriter>,
    ) -> Self {
        Self {
            audio,
            video,
            closed: false,
        }
    }

    pub fn write_audio(&mut self, packet: &Packet) -> Result<(), IngestError> {
        self.audio.write_rtp(packet)
    }

    pub fn write_video(&mut self, packet: &Packet) -> Result<(), IngestError> {
        self.video.write_rtp(packet)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl WorkerClose for SaveStream {
    /// Close audio, then video. Both are attempted even if the first fails.
    fn close(&mut self) -> Result<(), Vec<IngestError>> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut errors = Vec::new();
        for (kind, writer) in [
            (MediaKind::Audio, &mut self.audio),
            (MediaKind::Video, &mut self.video),
        ] {
            match writer.close() {
                Ok(()) => info!("SaveStream: {} container closed", kind),
                Err(e) => {
                    warn!("SaveStream: {}", e);
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl Drop for SaveStream {
    fn drop(&mut self) {
        if !self.closed {
            warn!("SaveStream dropped without close, finalizing containers");
            let _ = WorkerClose::close(self);
        }
    }
}
