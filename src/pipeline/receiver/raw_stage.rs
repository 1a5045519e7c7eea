//! Raw sink for the receiver pipeline
//!
//! Writes every queued packet, undecoded, into the container of its media
//! kind. The sink never closes the containers itself: once its loop ends the
//! coordinator takes the `SaveStream` back and closes it.

use crate::error::IngestError;
use crate::pipeline::PipelineStage;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::queue::QueueDrain;
use crate::pipeline::types::{CodecTag, QueuedPacket};
use crate::utils::sos::SignalOfStop;
use crate::workers::save_stream::SaveStream;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

pub struct RawSink {
    drain: Option<QueueDrain>,
    stream: Option<SaveStream>,
    interval: Duration,
    batch_limit: usize,
    sos: SignalOfStop,
    health: Arc<PipelineHealth>,
    written: u64,
}

impl RawSink {
    pub fn new(
        drain: QueueDrain,
        stream: SaveStream,
        interval: Duration,
        batch_limit: usize,
        sos: SignalOfStop,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            drain: Some(drain),
            stream: Some(stream),
            interval,
            batch_limit,
            sos,
            health,
            written: 0,
        }
    }

    /// Hand the containers back for closing. `None` once taken.
    pub fn take_stream(&mut self) -> Option<SaveStream> {
        self.stream.take()
    }

    fn write(&mut self, item: &QueuedPacket) -> Result<(), IngestError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        match item.codec {
            CodecTag::Opus => stream.write_audio(&item.packet)?,
            CodecTag::Vp8 => stream.write_video(&item.packet)?,
            CodecTag::Other(ref mime) => {
                debug!("RawSink: no container for {}, packet dropped", mime);
                return Ok(());
            }
        }

        self.written += 1;
        self.health.record_packet_written();
        Ok(())
    }
}

#[async_trait]
impl PipelineStage for RawSink {
    async fn run(&mut self) -> Result<(), IngestError> {
        let mut drain = self.drain.take().ok_or_else(|| IngestError::Signal {
            reason: "RawSink started twice".to_string(),
        })?;

        info!("RawSink: started");

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
                continue;
            }

            for item in &batch {
                self.write(item)?;
            }
        }

        info!("RawSink: finished ({} packets written)", self.written);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "RawSink"
    }
}
