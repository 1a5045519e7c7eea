use crate::assets::{OPUS_PAYLOAD_TYPE, VP8_CLOCK_RATE, VP8_PAYLOAD_TYPE};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::lifecycle::{LifecycleAction, LifecycleController};
use crate::pipeline::receiver::{KeyframeTicker, PacketIntake, ShutdownReason};
use crate::pipeline::types::{CodecTag, MediaKind};
use crate::utils::net::webrtc::PeerHandle;
use crate::utils::sos::SignalOfStop;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

fn create_webrtc_api(config: &IngestConfig) -> Result<API, IngestError> {
    let mut media_engine = MediaEngine::default();

    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: VP8_CLOCK_RATE,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            payload_type: VP8_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Video,
    )?;

    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: config.audio_sample_rate,
                channels: u16::from(config.audio_channels),
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            payload_type: OPUS_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Audio,
    )?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Feed one ICE state into the lifecycle controller. The first failure is
/// forwarded to `shutdown_tx` as `ConnectionFailed`.
async fn route_state_change(
    lifecycle: &LifecycleController,
    shutdown_tx: &mpsc::Sender<ShutdownReason>,
    state: RTCIceConnectionState,
) -> LifecycleAction {
    let action = lifecycle.on_state_change(state.into());
    if action == LifecycleAction::Teardown
        && shutdown_tx.send(ShutdownReason::ConnectionFailed).await.is_err()
    {
        warn!("Shutdown channel closed before connection failure was reported");
    }
    action
}

/// The receiving side of one WebRTC session
pub struct IngestPeer {
    connection: Arc<RTCPeerConnection>,
}

impl IngestPeer {
    /// Build a peer connection with one receive-only audio and one
    /// receive-only video transceiver.
    pub async fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let api = create_webrtc_api(config)?;

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }

        connection.on_ice_candidate(Box::new(|candidate: Option<RTCIceCandidate>| {
            match candidate {
                Some(candidate) => {
                    info!("Address: {}, Port: {}", candidate.address, candidate.port)
                }
                None => debug!("No candidate, ICE gathering finished"),
            }
            Box::pin(async {})
        }));

        Ok(Self { connection })
    }

    /// Feed every remote track into `intake`. Video tracks also get a
    /// keyframe ticker that lives as long as the track is read.
    pub fn on_track(
        &self,
        intake: PacketIntake,
        sos: SignalOfStop,
        health: Arc<PipelineHealth>,
        keyframe_interval: Duration,
    ) {
        let weak_pc: Weak<RTCPeerConnection> = Arc::downgrade(&self.connection);

        self.connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let codec = CodecTag::from_mime(&track.codec().capability.mime_type);
                info!(
                    "Track has started, of type {}: {}",
                    track.payload_type(),
                    codec.name()
                );

                // Stopped when this track's read loop ends
                let track_sos = sos.child();

                if codec.kind() == Some(MediaKind::Video)
                    && let Some(pc) = weak_pc.upgrade()
                {
                    let ticker = KeyframeTicker::new(
                        &pc,
                        track.ssrc(),
                        keyframe_interval,
                        track_sos.clone(),
                        health.clone(),
                    );
                    tokio::spawn(ticker.run());
                }

                let intake = intake.clone();
                Box::pin(async move {
                    tokio::spawn(async move {
                        loop {
                            match track_sos.select(track.read_rtp()).await {
                                Some(Ok((packet, _))) => intake.on_packet(packet, codec.clone()),
                                Some(Err(e)) => {
                                    info!("Track {} ended: {}", codec, e);
                                    break;
                                }
                                None => break,
                            }
                        }
                        track_sos.cancel();
                    });
                })
            },
        ));
    }

    /// Route ICE connection state changes through the lifecycle controller.
    ///
    /// The first failure pushes `ConnectionFailed` into `shutdown_tx`.
    pub fn on_connection_state(
        &self,
        lifecycle: Arc<LifecycleController>,
        shutdown_tx: mpsc::Sender<ShutdownReason>,
    ) {
        self.connection
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                let lifecycle = lifecycle.clone();
                let shutdown_tx = shutdown_tx.clone();
                Box::pin(async move {
                    route_state_change(&lifecycle, &shutdown_tx, state).await;
                })
            }));
    }

    /// Apply the remote offer and return the local answer once ICE gathering
    /// has completed (no trickle ICE).
    pub async fn answer(
        &self,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription, IngestError> {
        self.connection.set_remote_description(offer).await?;

        let answer = self.connection.create_answer(None).await?;
        let mut gather_complete = self.connection.gathering_complete_promise().await;
        self.connection.set_local_description(answer).await?;
        let _ = gather_complete.recv().await;

        self.connection
            .local_description()
            .await
            .ok_or_else(|| IngestError::Signal {
                reason: "no local description after ICE gathering".to_string(),
            })
    }
}

#[async_trait]
impl PeerHandle for IngestPeer {
    async fn close(&self) -> Result<(), IngestError> {
        self.connection.close().await?;
        Ok(())
    }
}
