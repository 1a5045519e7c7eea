use crate::error::IngestError;
use async_trait::async_trait;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;

/// Outgoing control path towards the remote sender
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Ask the sender for a fresh keyframe on the given media SSRC
    async fn request_keyframe(&self, media_ssrc: u32) -> Result<(), IngestError>;
}

/// The part of the peer connection the shutdown routine needs
#[async_trait]
pub trait PeerHandle: Send + Sync {
    async fn close(&self) -> Result<(), IngestError>;
}

#[async_trait]
impl ControlChannel for RTCPeerConnection {
    async fn request_keyframe(&self, media_ssrc: u32) -> Result<(), IngestError> {
        self.write_rtcp(&[Box::new(PictureLossIndication {
            sender_ssrc: 0,
            media_ssrc,
        })])
        .await
        .map(|_| ())
        .map_err(|e| IngestError::ControlSend {
            reason: e.to_string(),
        })
    }
}
