//! Health monitoring and metrics for pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Health metrics for the ingest pipeline
///
/// Tracks various counters and timestamps to monitor pipeline health.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Packets handed to the intake by the network layer
    pub packets_received: AtomicU64,

    /// Packets rejected because the media queue was full
    pub packets_dropped: AtomicU64,

    /// Timestamp (as Unix microseconds) of the last packet handed to the intake
    pub last_packet_time: AtomicU64,

    /// Frames released by the reassembler
    pub frames_assembled: AtomicU64,

    /// Frames whose header could not be parsed
    pub header_failures: AtomicU64,

    /// Frames skipped because they were not keyframes
    pub non_keyframes_skipped: AtomicU64,

    /// Images persisted to disk
    pub images_saved: AtomicU64,

    /// Images that could not be encoded or written
    pub image_failures: AtomicU64,

    /// Packets appended to a container writer
    pub packets_written: AtomicU64,

    /// Keyframe requests sent to the remote peer
    pub keyframe_requests: AtomicU64,

    /// Keyframe requests that failed to send
    pub keyframe_request_failures: AtomicU64,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            last_packet_time: AtomicU64::new(now_micros()),
            frames_assembled: AtomicU64::new(0),
            header_failures: AtomicU64::new(0),
            non_keyframes_skipped: AtomicU64::new(0),
            images_saved: AtomicU64::new(0),
            image_failures: AtomicU64::new(0),
            packets_written: AtomicU64::new(0),
            keyframe_requests: AtomicU64::new(0),
            keyframe_request_failures: AtomicU64::new(0),
        }
    }

    pub fn record_packet(&self) {
        self.last_packet_time.store(now_micros(), Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet_drop(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_assembled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_header_failure(&self) {
        self.header_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_non_keyframe(&self) {
        self.non_keyframes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_image(&self, saved: bool) {
        if saved {
            self.images_saved.fetch_add(1, Ordering::Relaxed);
        } else {
            self.image_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_packet_written(&self) {
        self.packets_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_keyframe_request(&self, sent: bool) {
        if sent {
            self.keyframe_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.keyframe_request_failures
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped.load(Ordering::Relaxed)
    }

    pub fn frames_assembled(&self) -> u64 {
        self.frames_assembled.load(Ordering::Relaxed)
    }

    pub fn header_failures(&self) -> u64 {
        self.header_failures.load(Ordering::Relaxed)
    }

    pub fn non_keyframes_skipped(&self) -> u64 {
        self.non_keyframes_skipped.load(Ordering::Relaxed)
    }

    pub fn images_saved(&self) -> u64 {
        self.images_saved.load(Ordering::Relaxed)
    }

    pub fn image_failures(&self) -> u64 {
        self.image_failures.load(Ordering::Relaxed)
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written.load(Ordering::Relaxed)
    }

    pub fn keyframe_requests(&self) -> u64 {
        self.keyframe_requests.load(Ordering::Relaxed)
    }

    pub fn keyframe_request_failures(&self) -> u64 {
        self.keyframe_request_failures.load(Ordering::Relaxed)
    }

    /// Calculate the packet drop rate as a percentage
    pub fn drop_rate(&self) -> f64 {
        let received = self.packets_received();
        if received == 0 {
            return 0.0;
        }
        (self.packets_dropped() as f64 / received as f64) * 100.0
    }

    /// Check if the stream has stalled (no packets for given duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let last_packet = self.last_packet_time.load(Ordering::Relaxed);
        let elapsed_micros = now_micros().saturating_sub(last_packet);
        elapsed_micros > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            packets_received: self.packets_received(),
            packets_dropped: self.packets_dropped(),
            drop_rate: self.drop_rate(),
            frames_assembled: self.frames_assembled(),
            header_failures: self.header_failures(),
            non_keyframes_skipped: self.non_keyframes_skipped(),
            images_saved: self.images_saved(),
            packets_written: self.packets_written(),
            keyframe_requests: self.keyframe_requests(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub drop_rate: f64,
    pub frames_assembled: u64,
    pub header_failures: u64,
    pub non_keyframes_skipped: u64,
    pub images_saved: u64,
    pub packets_written: u64,
    pub keyframe_requests: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} packets ({} drops, {:.2}%), {} frames, {} bad headers, {} non-keyframes, {} images, {} written, {} PLIs",
            self.packets_received,
            self.packets_dropped,
            self.drop_rate,
            self.frames_assembled,
            self.header_failures,
            self.non_keyframes_skipped,
            self.images_saved,
            self.packets_written,
            self.keyframe_requests
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_metrics() {
        let health = PipelineHealth::new();

        health.record_packet();
        health.record_packet();
        health.record_packet();
        health.record_packet();
        health.record_packet_drop();

        assert_eq!(health.packets_received(), 4);
        assert_eq!(health.packets_dropped(), 1);
        assert!((health.drop_rate() - 25.0).abs() < f64::EPSILON);

        health.record_image(true);
        health.record_image(false);
        assert_eq!(health.images_saved(), 1);
        assert_eq!(health.image_failures(), 1);

        health.record_keyframe_request(true);
        health.record_keyframe_request(false);
        assert_eq!(health.keyframe_requests(), 1);
        assert_eq!(health.keyframe_request_failures(), 1);
    }

    #[test]
    fn test_stall_detection() {
        let health = PipelineHealth::new();

        assert!(!health.is_stalled(Duration::from_secs(1)));

        health.record_packet();
        std::thread::sleep(Duration::from_millis(150));

        assert!(health.is_stalled(Duration::from_millis(100)));
    }

    #[test]
    fn test_summary_display() {
        let health = PipelineHealth::new();
        health.record_packet();
        let text = health.summary().to_string();
        assert!(text.starts_with("Health: 1 packets (0 drops"));
    }
}
