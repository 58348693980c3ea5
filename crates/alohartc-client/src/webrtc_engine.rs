//! [`NegotiationEngine`] backed by webrtc-rs.

use std::sync::Arc;

use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use alohartc_protocol::{CandidateSignal, IceCandidate, IceServer};

use crate::engine::{
    EngineConfig, EngineError, EngineEvents, EngineFactory, EngineResult, IceTransportPolicy,
    NegotiationEngine, OfferConstraints, RemoteStream, SdpType, SessionDescription,
};
use crate::transport::BoxFuture;

/// Builds one `RTCPeerConnection` per call with the default codecs and
/// interceptors.
#[derive(Debug, Clone, Default)]
pub struct WebRtcEngineFactory;

impl EngineFactory for WebRtcEngineFactory {
    fn build(
        &self,
        config: EngineConfig,
        events: EngineEvents,
    ) -> BoxFuture<'_, EngineResult<Arc<dyn NegotiationEngine>>> {
        Box::pin(async move {
            let mut media = MediaEngine::default();
            media
                .register_default_codecs()
                .map_err(|e| EngineError::new("build", e))?;
            let registry = register_default_interceptors(Registry::new(), &mut media)
                .map_err(|e| EngineError::new("build", e))?;
            let api = APIBuilder::new()
                .with_media_engine(media)
                .with_interceptor_registry(registry)
                .build();

            let rtc_config = RTCConfiguration {
                ice_servers: config.ice_servers.iter().map(rtc_ice_server).collect(),
                ice_transport_policy: match config.ice_transport_policy {
                    IceTransportPolicy::All => RTCIceTransportPolicy::All,
                    IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
                },
                ..Default::default()
            };
            let pc = Arc::new(
                api.new_peer_connection(rtc_config)
                    .await
                    .map_err(|e| EngineError::new("build", e))?,
            );
            register_callbacks(&pc, events);

            debug!(
                ice_servers = config.ice_servers.len(),
                policy = ?config.ice_transport_policy,
                "peer connection created"
            );
            Ok(Arc::new(WebRtcEngine { pc }) as Arc<dyn NegotiationEngine>)
        })
    }
}

fn rtc_ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn register_callbacks(pc: &RTCPeerConnection, events: EngineEvents) {
    let candidates = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let events = candidates.clone();
        Box::pin(async move {
            match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => events.local_candidate(CandidateSignal::Candidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    })),
                    Err(e) => warn!(error = %e, "failed to serialize local candidate"),
                },
                None => events.local_candidate(CandidateSignal::EndOfCandidates),
            }
        })
    }));

    let tracks = events.clone();
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let events = tracks.clone();
            Box::pin(async move {
                debug!(kind = %track.kind(), stream = %track.stream_id(), "remote track");
                events.track(RemoteStream::new(track.stream_id().to_string(), track));
            })
        },
    ));

    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let events = events.clone();
        Box::pin(async move {
            events.connection_state(state.to_string());
        })
    }));
}

/// A call's peer connection.
pub struct WebRtcEngine {
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcEngine {
    /// The underlying peer connection. Reach it from a session with
    /// `session.engine().as_any().downcast_ref::<WebRtcEngine>()`.
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    async fn add_recvonly(&self, kind: RTPCodecType) -> EngineResult<()> {
        self.pc
            .add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map(|_| ())
            .map_err(|e| EngineError::new("create_offer", e))
    }
}

fn rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, webrtc::Error> {
    match description.kind {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    }
}

impl NegotiationEngine for WebRtcEngine {
    fn create_offer(
        &self,
        constraints: OfferConstraints,
    ) -> BoxFuture<'_, EngineResult<SessionDescription>> {
        Box::pin(async move {
            if constraints.receive_video {
                self.add_recvonly(RTPCodecType::Video).await?;
            }
            if constraints.receive_audio {
                self.add_recvonly(RTPCodecType::Audio).await?;
            }
            let offer = self
                .pc
                .create_offer(None)
                .await
                .map_err(|e| EngineError::new("create_offer", e))?;
            Ok(SessionDescription::offer(offer.sdp))
        })
    }

    fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            let description = rtc_description(description)
                .map_err(|e| EngineError::new("set_local_description", e))?;
            self.pc
                .set_local_description(description)
                .await
                .map_err(|e| EngineError::new("set_local_description", e))
        })
    }

    fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            let description = rtc_description(description)
                .map_err(|e| EngineError::new("set_remote_description", e))?;
            self.pc
                .set_remote_description(description)
                .await
                .map_err(|e| EngineError::new("set_remote_description", e))
        })
    }

    fn add_candidate(&self, candidate: CandidateSignal) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            // An empty candidate marks the end of remote candidates.
            let init = match candidate {
                CandidateSignal::Candidate(c) => RTCIceCandidateInit {
                    candidate: c.candidate,
                    sdp_mid: c.sdp_mid,
                    sdp_mline_index: c.sdp_mline_index,
                    ..Default::default()
                },
                CandidateSignal::EndOfCandidates => RTCIceCandidateInit::default(),
            };
            self.pc
                .add_ice_candidate(init)
                .await
                .map_err(|e| EngineError::new("add_candidate", e))
        })
    }

    fn close(&self) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(async move {
            self.pc
                .close()
                .await
                .map_err(|e| EngineError::new("close", e))
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
