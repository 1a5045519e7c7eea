use crate::assets::{
    AUDIO_CHANNELS, AUDIO_FILE_NAME, AUDIO_SAMPLE_RATE, DECODE_INTERVAL, DRAIN_BATCH_LIMIT,
    KEYFRAME_INTERVAL, OUTPUT_DIR, QUEUE_CAPACITY, SAVE_INTERVAL, STUN_SERVER, VIDEO_FILE_NAME,
};
use crate::pipeline::receiver::ReassemblerConfig;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which sink drains the media queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    /// Reassemble VP8 frames, keep keyframes, store them as JPEG
    Decode,
    /// Write packets verbatim into IVF/Ogg containers
    Raw,
}

impl FromStr for SinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "decode" | "jpeg" => Ok(SinkMode::Decode),
            "raw" | "save" => Ok(SinkMode::Raw),
            other => Err(format!("unknown sink mode '{}'", other)),
        }
    }
}

impl fmt::Display for SinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkMode::Decode => write!(f, "decode"),
            SinkMode::Raw => write!(f, "raw"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub mode: SinkMode,
    pub queue_capacity: usize,
    pub decode_interval: Duration,
    pub save_interval: Duration,
    pub drain_batch_limit: usize,
    pub keyframe_interval: Duration,
    pub reassembly: ReassemblerConfig,
    pub output_dir: PathBuf,
    pub audio_sample_rate: u32,
    pub audio_channels: u8,
    pub ice_servers: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            mode: SinkMode::Raw,
            queue_capacity: QUEUE_CAPACITY,
            decode_interval: DECODE_INTERVAL,
            save_interval: SAVE_INTERVAL,
            drain_batch_limit: DRAIN_BATCH_LIMIT,
            keyframe_interval: KEYFRAME_INTERVAL,
            reassembly: ReassemblerConfig::default(),
            output_dir: PathBuf::from(OUTPUT_DIR),
            audio_sample_rate: AUDIO_SAMPLE_RATE,
            audio_channels: AUDIO_CHANNELS,
            ice_servers: vec![STUN_SERVER.to_string()],
        }
    }
}

impl IngestConfig {
    pub fn new(mode: SinkMode, output_dir: PathBuf) -> Self {
        IngestConfig {
            mode,
            output_dir,
            ..Default::default()
        }
    }

    pub fn video_path(&self) -> PathBuf {
        self.output_dir.join(VIDEO_FILE_NAME)
    }

    pub fn audio_path(&self) -> PathBuf {
        self.output_dir.join(AUDIO_FILE_NAME)
    }
}

/// Returns a version as specified in Cargo.toml
pub fn app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
