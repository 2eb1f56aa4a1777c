use crate::config::StreamSelection;
use crate::error::{Error, Result};
use crate::peer::engine::{
    LinkSetup, PeerEvent, PeerEventEnvelope, PeerEventSender, PeerLink, RtcEngine,
};
use crate::peer::media::{CapturedMedia, LocalStream, LocalTrack};
use crate::peer::types::{
    IceCandidate, IceConnectionState, IceServer, MediaKind, RemoteDescription, SdpKind,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Engine backed by the `webrtc` crate
pub struct WebRtcEngine {
    api: API,
}

impl WebRtcEngine {
    pub fn new() -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

/// Creates the peer connection configuration
fn rtc_config(ice_servers: &[IceServer]) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: vec![server.url.clone()],
                username: server.username.clone(),
                credential: server.credential.clone(),
                ..Default::default()
            })
            .collect(),
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

#[async_trait]
impl RtcEngine for WebRtcEngine {
    async fn capture(&self, request: StreamSelection) -> Result<CapturedMedia> {
        // samples are pushed by the host capture pipeline through LocalTrack::write_sample
        info!(
            "Opening local capture: audio={} video={}",
            request.audio, request.video
        );
        Ok(CapturedMedia {
            audio: request.audio.then(LocalTrack::audio),
            video: request.video.then(LocalTrack::video),
        })
    }

    async fn open(&self, setup: LinkSetup, events: PeerEventSender) -> Result<Arc<dyn PeerLink>> {
        info!(
            "Creating peer connection for session {} ({} ICE servers)",
            setup.session_key,
            setup.ice_servers.len()
        );
        let pc = Arc::new(
            self.api
                .new_peer_connection(rtc_config(&setup.ice_servers))
                .await?,
        );

        let notify = Notifier {
            session_key: setup.session_key.clone(),
            connection_id: setup.connection_id.clone(),
            events,
        };

        let on_candidate = notify.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let notify = on_candidate.clone();
            Box::pin(async move {
                let Some(c) = cand else {
                    debug!("ICE gathering finished for {}", notify.session_key);
                    return;
                };
                match c.to_json() {
                    Ok(init) => {
                        debug!("Local candidate: {}", init.candidate);
                        notify.send(PeerEvent::LocalCandidate(IceCandidate::from(init)));
                    }
                    Err(e) => warn!("Cannot serialize local candidate: {:?}", e),
                }
            })
        }));

        let on_track = notify.clone();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let notify = on_track.clone();
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => MediaKind::Audio,
                        RTPCodecType::Video => MediaKind::Video,
                        _ => {
                            warn!("Ignoring remote track of unspecified kind");
                            return;
                        }
                    };
                    let track_id = track.id().to_string();
                    info!("Remote {:?} track {} on {}", kind, track_id, notify.session_key);
                    notify.send(PeerEvent::RemoteTrack { track_id, kind });
                })
            },
        ));

        let on_ice = notify.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let notify = on_ice.clone();
            debug!("ICE connection state changed to: {:?}", state);
            if let Some(state) = IceConnectionState::from_rtc(state) {
                notify.send(PeerEvent::IceConnectionState(state));
            }
            Box::pin(async {})
        }));

        let key = setup.session_key.clone();
        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            debug!("Peer connection {} state changed to: {:?}", key, st);
            Box::pin(async {})
        }));

        Ok(Arc::new(WebRtcLink::new(pc, setup.session_key, setup.receive_video)))
    }
}

/// Pushes engine callbacks into the coordination task
#[derive(Clone)]
struct Notifier {
    session_key: String,
    connection_id: String,
    events: PeerEventSender,
}

impl Notifier {
    fn send(&self, event: PeerEvent) {
        let envelope = PeerEventEnvelope {
            session_key: self.session_key.clone(),
            connection_id: self.connection_id.clone(),
            event,
        };
        if self.events.send(envelope).is_err() {
            debug!("Event receiver gone, dropping event for {}", self.session_key);
        }
    }
}

pub struct WebRtcLink {
    pc: Arc<RTCPeerConnection>,
    session_key: String,
    receive_video: bool,
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
    sends_audio: AtomicBool,
    sends_video: AtomicBool,
    recv_audio_added: AtomicBool,
    recv_video_added: AtomicBool,
}

impl WebRtcLink {
    fn new(pc: Arc<RTCPeerConnection>, session_key: String, receive_video: bool) -> Self {
        Self {
            pc,
            session_key,
            receive_video,
            senders: Mutex::new(Vec::new()),
            sends_audio: AtomicBool::new(false),
            sends_video: AtomicBool::new(false),
            recv_audio_added: AtomicBool::new(false),
            recv_video_added: AtomicBool::new(false),
        }
    }

    /// Audio is always requested from the peer, video only when a view exists.
    /// A flag is set only once its transceiver exists, so a failed add is
    /// retried on the next offer.
    async fn ensure_receive_transceivers(&self) -> Result<()> {
        if !self.sends_audio.load(Ordering::SeqCst)
            && !self.recv_audio_added.load(Ordering::SeqCst)
        {
            self.add_recvonly(RTPCodecType::Audio).await?;
            self.recv_audio_added.store(true, Ordering::SeqCst);
        }
        if self.receive_video
            && !self.sends_video.load(Ordering::SeqCst)
            && !self.recv_video_added.load(Ordering::SeqCst)
        {
            self.add_recvonly(RTPCodecType::Video).await?;
            self.recv_video_added.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn add_recvonly(&self, kind: RTPCodecType) -> Result<()> {
        debug!("Adding recvonly {} transceiver on {}", kind, self.session_key);
        self.pc
            .add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        Ok(())
    }

    async fn local_sdp(&self) -> Result<String> {
        self.pc
            .local_description()
            .await
            .map(|d| d.sdp)
            .ok_or_else(|| Error::Negotiation("local description missing".into()))
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn attach_stream(&self, stream: &LocalStream) -> Result<()> {
        let mut senders = self.senders.lock().await;
        for sender in senders.drain(..) {
            self.pc.remove_track(&sender).await?;
        }

        for local in stream.tracks() {
            let track = local.track() as Arc<dyn TrackLocal + Send + Sync>;
            let sender = self.pc.add_track(track).await?;

            // RTCP has to be read for interceptors to work
            let rtcp_sender = Arc::clone(&sender);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while rtcp_sender.read(&mut buf).await.is_ok() {}
            });
            senders.push(sender);
        }

        self.sends_audio
            .store(stream.audio.is_some(), Ordering::SeqCst);
        self.sends_video
            .store(stream.video.is_some(), Ordering::SeqCst);
        debug!(
            "Attached stream {} with {} tracks to {}",
            stream.id,
            senders.len(),
            self.session_key
        );
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        self.ensure_receive_transceivers().await?;
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        self.local_sdp().await
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer).await?;
        self.local_sdp().await
    }

    async fn set_remote_description(&self, description: RemoteDescription) -> Result<()> {
        let desc = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        };
        self.pc.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing peer connection for {}", self.session_key);
        self.pc.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_keeps_server_order_and_credentials() {
        let config = rtc_config(&[
            IceServer {
                url: "stun:stun.l.google.com:19302".into(),
                username: String::new(),
                credential: String::new(),
            },
            IceServer {
                url: "turn:relay.example.org".into(),
                username: "u".into(),
                credential: "p".into(),
            },
        ]);

        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[0].urls, vec!["stun:stun.l.google.com:19302"]);
        assert_eq!(config.ice_servers[1].username, "u");
        assert_eq!(config.bundle_policy, RTCBundlePolicy::MaxBundle);
    }

    #[tokio::test]
    async fn capture_creates_requested_tracks_only() {
        let engine = WebRtcEngine::new().unwrap();
        let media = engine
            .capture(StreamSelection {
                audio: true,
                video: false,
            })
            .await
            .unwrap();
        assert!(media.audio.is_some());
        assert!(media.video.is_none());
    }

    async fn bare_link(receive_video: bool) -> WebRtcLink {
        let engine = WebRtcEngine::new().unwrap();
        let pc = engine.api.new_peer_connection(rtc_config(&[])).await.unwrap();
        WebRtcLink::new(Arc::new(pc), "a".into(), receive_video)
    }

    #[tokio::test]
    async fn receive_transceivers_are_added_once() {
        let link = bare_link(true).await;
        link.ensure_receive_transceivers().await.unwrap();
        link.ensure_receive_transceivers().await.unwrap();

        assert_eq!(link.pc.get_transceivers().await.len(), 2);
        assert!(link.recv_audio_added.load(Ordering::SeqCst));
        assert!(link.recv_video_added.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_transceiver_add_is_not_recorded() {
        let link = bare_link(false).await;
        link.pc.close().await.unwrap();

        assert!(link.ensure_receive_transceivers().await.is_err());
        assert!(!link.recv_audio_added.load(Ordering::SeqCst));
        assert!(!link.recv_video_added.load(Ordering::SeqCst));
    }
}
