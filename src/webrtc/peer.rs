//! webrtc-rs backed [`PeerTransport`]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::full_intra_request::FullIntraRequest;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCPFeedback;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::config::{CodecPreference, WebRtcConfig};
use super::media::{spawn_media_pump, KeyframeRequest};
use super::signaling::{SdpType, SessionDescription};
use super::transport::{
    PeerTransport, TransportEvent, TransportFactory, TransportState, EVENT_CHANNEL_CAPACITY,
};
use crate::error::{AppError, Result};
use crate::video::VideoFeed;

const STREAM_ID: &str = "camrtc";

fn video_rtcp_feedback() -> Vec<RTCPFeedback> {
    vec![
        RTCPFeedback {
            typ: "goog-remb".to_owned(),
            parameter: "".to_owned(),
        },
        RTCPFeedback {
            typ: "ccm".to_owned(),
            parameter: "fir".to_owned(),
        },
        RTCPFeedback {
            typ: "nack".to_owned(),
            parameter: "".to_owned(),
        },
        RTCPFeedback {
            typ: "nack".to_owned(),
            parameter: "pli".to_owned(),
        },
    ]
}

fn codec_capability(codec: &CodecPreference) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: codec.mime_type.clone(),
        clock_rate: codec.clock_rate,
        channels: 0,
        sdp_fmtp_line: codec.sdp_fmtp_line.clone(),
        rtcp_feedback: video_rtcp_feedback(),
    }
}

/// Register the preference list in order; nothing else is offered
fn build_media_engine(codecs: &[CodecPreference]) -> Result<MediaEngine> {
    let mut media_engine = MediaEngine::default();
    for codec in codecs {
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: codec_capability(codec),
                    payload_type: codec.payload_type,
                    ..Default::default()
                },
                RTPCodecType::Video,
            )
            .map_err(|e| {
                AppError::Negotiation(format!(
                    "Failed to register codec {} ({}): {}",
                    codec.mime_type, codec.payload_type, e
                ))
            })?;
    }
    Ok(media_engine)
}

fn ice_servers(config: &WebRtcConfig) -> Vec<RTCIceServer> {
    let mut ice_servers = vec![];
    for stun_url in &config.stun_servers {
        ice_servers.push(RTCIceServer {
            urls: vec![stun_url.clone()],
            ..Default::default()
        });
    }
    for turn in &config.turn_servers {
        // webrtc-rs rejects TURN servers without credentials
        if turn.username.is_empty() || turn.credential.is_empty() {
            warn!("Skipping TURN server {:?}: credentials missing", turn.urls);
            continue;
        }
        ice_servers.push(RTCIceServer {
            urls: turn.urls.clone(),
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        });
    }
    ice_servers
}

fn map_state(state: RTCPeerConnectionState) -> Option<TransportState> {
    match state {
        RTCPeerConnectionState::New => Some(TransportState::New),
        RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
        RTCPeerConnectionState::Connected => Some(TransportState::Connected),
        RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
        RTCPeerConnectionState::Failed => Some(TransportState::Failed),
        RTCPeerConnectionState::Closed => Some(TransportState::Closed),
        _ => None,
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let result = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(AppError::Negotiation("Rollback is not supported".into()));
        }
    };
    result.map_err(|e| AppError::Negotiation(format!("Invalid SDP {}: {}", desc.sdp_type, e)))
}

fn from_rtc(desc: RTCSessionDescription) -> Option<SessionDescription> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        _ => return None,
    };
    Some(SessionDescription {
        sdp: desc.sdp,
        sdp_type,
    })
}

/// Drain RTCP for the sender; PLI/FIR raise the keyframe flag
fn spawn_rtcp_reader(sender: Arc<RTCRtpSender>, keyframe_request: KeyframeRequest) {
    tokio::spawn(async move {
        while let Ok((packets, _)) = sender.read_rtcp().await {
            for packet in packets {
                let any = packet.as_any();
                if any.downcast_ref::<PictureLossIndication>().is_some()
                    || any.downcast_ref::<FullIntraRequest>().is_some()
                {
                    keyframe_request.store(true, Ordering::Release);
                }
            }
        }
    });
}

/// Shared with the connection-state callback
struct MediaSlot {
    session_id: String,
    track: Arc<TrackLocalStaticSample>,
    feed: Mutex<Option<Arc<VideoFeed>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    keyframe_request: KeyframeRequest,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl MediaSlot {
    fn start_pump(&self) {
        let mut pump = self.pump.lock();
        if pump.is_some() || self.cancel.is_cancelled() {
            return;
        }
        let Some(feed) = self.feed.lock().clone() else {
            warn!("Session {} connected without a video source", self.session_id);
            return;
        };
        *pump = Some(spawn_media_pump(
            self.session_id.clone(),
            feed,
            self.track.clone(),
            self.events.clone(),
            self.keyframe_request.clone(),
            self.cancel.child_token(),
        ));
    }
}

/// Peer connection sending one H.264 video track
pub struct RtcTransport {
    session_id: String,
    pc: Arc<RTCPeerConnection>,
    media: Arc<MediaSlot>,
    gathering_timeout: Duration,
    closed: AtomicBool,
}

impl RtcTransport {
    pub async fn new(
        config: &WebRtcConfig,
        session_id: &str,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let primary = config
            .codecs
            .first()
            .ok_or_else(|| AppError::Config("No video codec configured".into()))?;

        let mut media_engine = build_media_engine(&config.codecs)?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::Negotiation(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            AppError::Negotiation(format!("Failed to create peer connection: {}", e))
        })?);

        let track = Arc::new(TrackLocalStaticSample::new(
            codec_capability(primary),
            format!("video-{}", &session_id[..8.min(session_id.len())]),
            STREAM_ID.to_string(),
        ));

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let media = Arc::new(MediaSlot {
            session_id: session_id.to_string(),
            track,
            feed: Mutex::new(None),
            pump: Mutex::new(None),
            keyframe_request: Arc::new(AtomicBool::new(false)),
            events: events_tx,
            cancel: CancellationToken::new(),
        });

        let transport = Self {
            session_id: session_id.to_string(),
            pc,
            media,
            gathering_timeout: config.ice_gathering_timeout(),
            closed: AtomicBool::new(false),
        };
        transport.setup_event_handlers();

        debug!("Peer connection created for session {}", session_id);
        Ok((transport, events_rx))
    }

    fn setup_event_handlers(&self) {
        let media = self.media.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let media = media.clone();
                Box::pin(async move {
                    let Some(state) = map_state(s) else {
                        return;
                    };
                    info!("Session {} transport state: {}", media.session_id, state);
                    if state == TransportState::Connected {
                        media.start_pump();
                    }
                    let _ = media.events.send(TransportEvent::StateChanged(state)).await;
                })
            }));
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn add_video_source(&self, feed: Arc<VideoFeed>) -> Result<()> {
        let track: Arc<dyn TrackLocal + Send + Sync> = self.media.track.clone();
        let sender = self
            .pc
            .add_track(track)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to add video track: {}", e)))?;
        spawn_rtcp_reader(sender, self.media.keyframe_request.clone());

        info!(
            "Video source {} added to session {}",
            feed.device_id(),
            self.session_id
        );
        *self.media.feed.lock() = Some(feed);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc(desc)?;
        self.pc.set_remote_description(desc).await.map_err(|e| {
            AppError::Negotiation(format!("Failed to set remote description: {}", e))
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to create answer: {}", e)))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc(desc)?;
        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(desc).await.map_err(|e| {
            AppError::Negotiation(format!("Failed to set local description: {}", e))
        })?;

        if tokio::time::timeout(self.gathering_timeout, gather_complete.recv())
            .await
            .is_err()
        {
            warn!(
                "Session {} ICE gathering not complete after {:?}, answering with partial candidates",
                self.session_id, self.gathering_timeout
            );
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.and_then(from_rtc)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.media.cancel.cancel();
        self.media.feed.lock().take();
        self.pc
            .close()
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to close peer connection: {}", e)))?;
        debug!("Peer connection closed for session {}", self.session_id);
        Ok(())
    }
}

/// Creates one [`RtcTransport`] per session
pub struct RtcTransportFactory {
    config: WebRtcConfig,
}

impl RtcTransportFactory {
    pub fn new(config: WebRtcConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        session_id: &str,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::Receiver<TransportEvent>)> {
        let (transport, events) = RtcTransport::new(&self.config, session_id).await?;
        Ok((Arc::new(transport), events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{
        CaptureConfig, CaptureSourceFactory, DeviceClaims, RecoveryPolicy, SourceFactory,
        SourceKind, TimestampPolicy,
    };

    async fn offer_sdp() -> (Arc<RTCPeerConnection>, String) {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let api = APIBuilder::new().with_media_engine(media_engine).build();
        let pc = Arc::new(api.new_peer_connection(RTCConfiguration::default()).await.unwrap());
        pc.add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .unwrap();
        let offer = pc.create_offer(None).await.unwrap();
        let sdp = offer.sdp.clone();
        pc.set_local_description(offer).await.unwrap();
        (pc, sdp)
    }

    async fn test_feed() -> Arc<VideoFeed> {
        let config = CaptureConfig::default()
            .with_source(SourceKind::TestPattern)
            .with_resolution(64, 48);
        let source = CaptureSourceFactory::new(config, DeviceClaims::new())
            .create()
            .unwrap();
        Arc::new(
            VideoFeed::attach(
                source,
                RecoveryPolicy::Propagate,
                TimestampPolicy::TransportAssigned,
                CancellationToken::new(),
            )
            .await
            .unwrap(),
        )
    }

    #[test]
    fn test_description_conversion() {
        let rtc = to_rtc(SessionDescription::answer("v=0\r\n")).unwrap();
        assert_eq!(rtc.sdp_type, RTCSdpType::Answer);
        assert_eq!(from_rtc(rtc), Some(SessionDescription::answer("v=0\r\n")));
        assert!(matches!(
            to_rtc(SessionDescription {
                sdp: String::new(),
                sdp_type: SdpType::Rollback,
            }),
            Err(AppError::Negotiation(_))
        ));
    }

    #[tokio::test]
    async fn test_answer_offers_preferred_h264() {
        let config = WebRtcConfig {
            ice_gathering_timeout_ms: 2000,
            ..Default::default()
        };
        let (transport, _events) = RtcTransport::new(&config, "test-session-0001").await.unwrap();
        let (offerer, offer) = offer_sdp().await;

        transport.add_video_source(test_feed().await).await.unwrap();
        transport
            .set_remote_description(SessionDescription::offer(offer))
            .await
            .unwrap();
        let answer = transport.create_answer().await.unwrap();
        transport.set_local_description(answer).await.unwrap();

        let local = transport.local_description().await.unwrap();
        assert_eq!(local.sdp_type, SdpType::Answer);
        assert!(local.sdp.contains("m=video"));
        assert!(local.sdp.contains("H264/90000"));
        assert!(local.sdp.contains("profile-level-id=42e01f"));

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        offerer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_offer_is_negotiation_error() {
        let (transport, _events) = RtcTransport::new(&WebRtcConfig::default(), "test-session-0002")
            .await
            .unwrap();
        let err = transport
            .set_remote_description(SessionDescription::offer("not sdp"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Negotiation(_)));
        transport.close().await.unwrap();
    }
}
