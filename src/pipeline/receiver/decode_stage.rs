//! Decode sink for the receiver pipeline
//!
//! Drains the media queue on a fixed cadence, reassembles VP8 frames, keeps
//! only keyframes, decodes them and stores each one as a numbered JPEG.

use crate::decoder::{FrameDecoder, parse_frame_header};
use crate::encoder::ImageStore;
use crate::error::IngestError;
use crate::pipeline::PipelineStage;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::queue::QueueDrain;
use crate::pipeline::receiver::reassembler::{Frame, FrameReassembler, ReassemblerConfig};
use crate::pipeline::types::CodecTag;
use crate::utils::sos::SignalOfStop;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use webrtc::rtp::codecs::vp8::Vp8Packet;

pub struct DecodeSink<F: FrameDecoder> {
    drain: Option<QueueDrain>,
    reassembler: FrameReassembler<Vp8Packet>,
    decoder: F,
    images: ImageStore,
    /// Only packets of this codec reach the reassembler
    video_codec: CodecTag,
    interval: Duration,
    batch_limit: usize,
    sos: SignalOfStop,
    health: Arc<PipelineHealth>,
}

impl<F: FrameDecoder> DecodeSink<F> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        drain: QueueDrain,
        decoder: F,
        images: ImageStore,
        reassembly: ReassemblerConfig,
        interval: Duration,
        batch_limit: usize,
        sos: SignalOfStop,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            drain: Some(drain),
            reassembler: FrameReassembler::vp8(reassembly),
            decoder,
            images,
            video_codec: CodecTag::Vp8,
            interval,
            batch_limit,
            sos,
            health,
        }
    }

    /// Header check, keyframe filter, decode, persist.
    ///
    /// A bad header comes back as a transient error, a decoder failure as a
    /// fatal one. Image store failures are logged by the store itself.
    fn handle_frame(&mut self, frame: Frame) -> Result<(), IngestError> {
        self.health.record_frame();

        let header = parse_frame_header(&frame.data)
            .inspect_err(|_| self.health.record_header_failure())?;

        if !header.key_frame {
            debug!("DecodeSink: not a keyframe (ts {})", frame.timestamp);
            self.health.record_non_keyframe();
            return Ok(());
        }

        debug!("DecodeSink: keyframe {:?}", header);

        let Some(img) = self.decoder.decode(&frame.data)? else {
            debug!("DecodeSink: decoder buffering (ts {})", frame.timestamp);
            return Ok(());
        };
        info!(
            "DecodeSink: image decoded {}x{}",
            img.width(),
            img.height()
        );

        let saved = self.images.persist(&img).is_some();
        self.health.record_image(saved);
        Ok(())
    }
}

#[async_trait]
impl<F: FrameDecoder> PipelineStage for DecodeSink<F> {
    async fn run(&mut self) -> Result<(), IngestError> {
        let mut drain = self.drain.take().ok_or_else(|| IngestError::Signal {
            reason: "DecodeSink started twice".to_string(),
        })?;

        info!(
            "DecodeSink: started, writing images to {}",
            self.images.dir().display()
        );

        loop {
            let Some(batch) = self
                .sos
                .select(drain.next_batch(self.interval, self.batch_limit))
                .await
            else {
                break;
            };

            if batch.is_empty() {
                if drain.is_closed() {
                    break;
                }
                // Nothing arrived this cycle
                continue;
            }

            for item in batch {
                if item.codec == self.video_codec {
                    self.reassembler.push(item.packet);
                }
            }

            let mut popped = 0;
            while let Some(frame) = self.reassembler.pop() {
                popped += 1;
                let ts = frame.timestamp;
                match self.handle_frame(frame) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("DecodeSink: {} (ts {}), frame skipped", e, ts),
                }
            }
            if popped == 0 {
                debug!("DecodeSink: sample is not enough, skip it");
            }
        }

        let stats = self.reassembler.stats();
        info!(
            "DecodeSink: finished ({} frames, {} discarded groups, {} packets lost, {} images)",
            stats.frames_released,
            stats.groups_discarded,
            stats.packets_lost,
            self.images.last_index()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DecodeSink"
    }
}
