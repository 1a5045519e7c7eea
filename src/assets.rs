use std::time::Duration;

// queue
pub const QUEUE_CAPACITY: usize = 1000;

// drain loops
pub const DECODE_INTERVAL: Duration = Duration::from_millis(200);
pub const SAVE_INTERVAL: Duration = Duration::from_millis(33);
pub const DRAIN_BATCH_LIMIT: usize = 256;

// keyframe requests
pub const KEYFRAME_INTERVAL: Duration = Duration::from_secs(1);

// reassembly
pub const REASSEMBLY_MAX_LATE: u16 = 20;
pub const VP8_CLOCK_RATE: u32 = 90_000;

// output
pub const OUTPUT_DIR: &str = "./out";
pub const VIDEO_FILE_NAME: &str = "output.ivf";
pub const AUDIO_FILE_NAME: &str = "output.ogg";
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;
pub const AUDIO_CHANNELS: u8 = 2;
pub const VIDEO_WIDTH: u16 = 640;
pub const VIDEO_HEIGHT: u16 = 480;

// connections
pub const STUN_SERVER: &str = "stun:stun.l.google.com:19302";
pub const VP8_PAYLOAD_TYPE: u8 = 96;
pub const OPUS_PAYLOAD_TYPE: u8 = 111;

pub const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);
pub const STREAM_STALL_THRESHOLD: Duration = Duration::from_secs(5);
