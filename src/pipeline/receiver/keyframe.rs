//! Periodic keyframe requests
//!
//! Sends a Picture Loss Indication for one video track at a fixed interval so
//! the remote sender keeps producing keyframes.

use crate::pipeline::health::PipelineHealth;
use crate::utils::net::webrtc::ControlChannel;
use crate::utils::sos::SignalOfStop;
use log::{info, warn};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub struct KeyframeTicker<C: ControlChannel + ?Sized> {
    channel: Weak<C>,
    media_ssrc: u32,
    interval: Duration,
    sos: SignalOfStop,
    health: Arc<PipelineHealth>,
}

impl<C: ControlChannel + ?Sized> KeyframeTicker<C> {
    /// `sos` should be the stop signal of the track the ticker belongs to.
    pub fn new(
        channel: &Arc<C>,
        media_ssrc: u32,
        interval: Duration,
        sos: SignalOfStop,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            channel: Arc::downgrade(channel),
            media_ssrc,
            interval,
            sos,
            health,
        }
    }

    /// Tick until the track stops or the connection is dropped.
    ///
    /// Returns the number of requests sent successfully.
    pub async fn run(self) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        let mut sent = 0u64;
        loop {
            if self.sos.select(ticker.tick()).await.is_none() {
                break;
            }

            let Some(channel) = self.channel.upgrade() else {
                break;
            };

            match channel.request_keyframe(self.media_ssrc).await {
                Ok(()) => {
                    sent += 1;
                    self.health.record_keyframe_request(true);
                }
                Err(e) => {
                    self.health.record_keyframe_request(false);
                    warn!("KeyframeTicker: {} (ssrc {})", e, self.media_ssrc);
                }
            }
        }

        info!(
            "KeyframeTicker: stopped for ssrc {} after {} requests",
            self.media_ssrc, sent
        );
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingChannel {
        requests: Mutex<Vec<u32>>,
        fail_first: AtomicU32,
    }

    #[async_trait]
    impl ControlChannel for RecordingChannel {
        async fn request_keyframe(&self, media_ssrc: u32) -> Result<(), IngestError> {
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(IngestError::ControlSend {
                    reason: "socket closed".into(),
                });
            }
            self.requests.lock().unwrap().push(media_ssrc);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_every_interval_until_stopped() {
        let channel = Arc::new(RecordingChannel::default());
        let sos = SignalOfStop::new();
        let health = Arc::new(PipelineHealth::new());
        let ticker = KeyframeTicker::new(
            &channel,
            0xBEEF,
            Duration::from_secs(1),
            sos.clone(),
            health.clone(),
        );
        let handle = tokio::spawn(ticker.run());

        tokio::time::sleep(Duration::from_millis(3500)).await;
        sos.cancel();
        let sent = handle.await.unwrap();

        assert_eq!(sent, 3);
        assert_eq!(*channel.requests.lock().unwrap(), vec![0xBEEF; 3]);
        assert_eq!(health.keyframe_requests(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_does_not_stop_ticker() {
        let channel = Arc::new(RecordingChannel::default());
        channel.fail_first.store(2, Ordering::SeqCst);
        let sos = SignalOfStop::new();
        let health = Arc::new(PipelineHealth::new());
        let ticker = KeyframeTicker::new(
            &channel,
            7,
            Duration::from_secs(1),
            sos.clone(),
            health.clone(),
        );
        let handle = tokio::spawn(ticker.run());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        sos.cancel();
        let sent = handle.await.unwrap();

        assert_eq!(sent, 2);
        assert_eq!(health.keyframe_request_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_channel_dropped() {
        let channel = Arc::new(RecordingChannel::default());
        let ticker = KeyframeTicker::new(
            &channel,
            1,
            Duration::from_secs(1),
            SignalOfStop::new(),
            Arc::new(PipelineHealth::new()),
        );
        drop(channel);

        let sent = tokio::time::timeout(Duration::from_secs(5), ticker.run())
            .await
            .expect("ticker kept running without a channel");
        assert_eq!(sent, 0);
    }
}
