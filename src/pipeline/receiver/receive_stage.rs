//! Packet intake for the receiver pipeline
//!
//! Called from the per-track read loops. Hands every packet to the media queue
//! without blocking; a full queue drops the newest packet.

use crate::pipeline::health::PipelineHealth;
use crate::pipeline::queue::{PushOutcome, QueueSender};
use crate::pipeline::types::{CodecTag, QueuedPacket};
use log::{debug, info};
use std::sync::Arc;
use webrtc::rtp::packet::Packet;

/// Producer side of the pipeline, one clone per remote track
#[derive(Clone)]
pub struct PacketIntake {
    sender: QueueSender,
    health: Arc<PipelineHealth>,
}

impl PacketIntake {
    pub fn new(sender: QueueSender, health: Arc<PipelineHealth>) -> Self {
        Self { sender, health }
    }

    /// Enqueue one packet. Never blocks and never fails: when the queue is
    /// full the packet is dropped and counted.
    pub fn on_packet(&self, packet: Packet, codec: CodecTag) {
        self.health.record_packet();

        if self.health.packets_received() == 1 {
            info!(
                "PacketIntake: first packet received (seq: {}, codec: {})",
                packet.header.sequence_number, codec
            );
        }

        match self.sender.try_push(QueuedPacket::new(packet, codec)) {
            PushOutcome::Queued => {}
            PushOutcome::Dropped(item) => {
                self.health.record_packet_drop();
                debug!(
                    "PacketIntake: queue full ({}), dropped seq {}",
                    self.sender.capacity(),
                    item.sequence_number()
                );
            }
            PushOutcome::Closed(_) => {
                // Sink already stopped, nothing left to feed
                self.health.record_packet_drop();
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.sender.len()
    }
}
