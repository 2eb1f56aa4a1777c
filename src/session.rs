//! Per-peer call session: drives the offer/answer/candidate/bye exchange
//! over one peer connection.
//!
//! Lifecycle: `Created → Negotiating → Connected → Disconnected`.
//! `connect` moves to Negotiating, the first remote track to Connected, and
//! any teardown (local, remote `bye`, lost peer) to Disconnected.

use crate::config::{BridgeConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::peer::engine::{LinkSetup, PeerEventSender, PeerLink, RtcEngine};
use crate::peer::ice::{session_ice_servers, CandidateQueue};
use crate::peer::media::LocalStream;
use crate::peer::sdp::rewrite_remote;
use crate::peer::types::{IceCandidate, IceConnectionState, MediaKind, RemoteDescription, SdpKind};
use crate::signaling::{HostEvent, OutboundMessage, SignalMessage, SignalingBridge};
use crate::utils::random_id;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Negotiating,
    Connected,
    Disconnected,
}

/// Why a session is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Host asked for it
    Local,
    /// Peer sent `bye`
    RemoteBye,
    /// ICE connectivity lost without a `bye`
    PeerLost,
}

/// What the registry has to do after a session handled an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect(DisconnectReason),
}

/// Resources the registry must reclaim after a teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    pub remote_video: Option<String>,
    pub held_media: bool,
}

pub struct Session {
    key: String,
    config: SessionConfig,
    bridge_config: Arc<BridgeConfig>,
    bridge: Arc<dyn SignalingBridge>,
    state: SessionState,
    link: Option<Arc<dyn PeerLink>>,
    connection_id: Option<String>,
    pending_remote: Option<RemoteDescription>,
    candidates: CandidateQueue,
    local_stream: Option<LocalStream>,
    remote_video: Option<String>,
    holds_media: bool,
    capture_in_flight: bool,
}

impl Session {
    pub fn new(
        key: String,
        config: SessionConfig,
        bridge_config: Arc<BridgeConfig>,
        bridge: Arc<dyn SignalingBridge>,
    ) -> Self {
        Self {
            key,
            config,
            bridge_config,
            bridge,
            state: SessionState::Created,
            link: None,
            connection_id: None,
            pending_remote: None,
            candidates: CandidateQueue::new(),
            local_stream: None,
            remote_video: None,
            holds_media: false,
            capture_in_flight: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.link.is_some()
    }

    pub fn has_pending_remote(&self) -> bool {
        self.pending_remote.is_some()
    }

    pub fn queued_candidates(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_buffering_candidates(&self) -> bool {
        self.candidates.is_buffering()
    }

    pub fn local_stream(&self) -> Option<&LocalStream> {
        self.local_stream.as_ref()
    }

    pub fn remote_video(&self) -> Option<&str> {
        self.remote_video.as_deref()
    }

    pub fn capture_in_flight(&self) -> bool {
        self.capture_in_flight
    }

    pub(crate) fn set_capture_in_flight(&mut self, in_flight: bool) {
        self.capture_in_flight = in_flight;
    }

    pub(crate) fn mark_media_held(&mut self) {
        self.holds_media = true;
    }

    fn emit(&self, message: impl Into<OutboundMessage>) {
        self.bridge.send(&self.key, &message.into());
    }

    /// Tells the host which key this session's messages belong to
    pub fn announce(&self) {
        self.emit(HostEvent::SetSessionKey {
            session_key: self.key.clone(),
        });
    }

    /// Opens the peer connection with `stream` attached. An initiator sends
    /// its offer; a remote description that arrived early is applied after
    /// that. An early remote offer is answered instead of sending our own.
    pub async fn connect(
        &mut self,
        engine: &dyn RtcEngine,
        stream: LocalStream,
        events: PeerEventSender,
        receive_video: bool,
    ) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(Error::InvalidState(format!(
                "session {} already called ({:?})",
                self.key, self.state
            )));
        }

        let connection_id = random_id();
        let setup = LinkSetup {
            session_key: self.key.clone(),
            connection_id: connection_id.clone(),
            ice_servers: session_ice_servers(&self.bridge_config.stun_server, &self.config.turn),
            receive_video,
        };
        let link = engine.open(setup, events).await?;

        if let Err(e) = link.attach_stream(&stream).await {
            warn!("Attaching local stream to {} failed: {}", self.key, e);
            if let Err(close_err) = link.close().await {
                debug!("Closing half-open link failed: {}", close_err);
            }
            return Err(e);
        }

        info!(
            "Session {} connecting (connection {}, initiator={})",
            self.key, connection_id, self.config.is_initiator
        );
        self.link = Some(link);
        self.connection_id = Some(connection_id);
        self.local_stream = Some(stream);
        self.state = SessionState::Negotiating;

        match self.pending_remote.take() {
            // an early offer wins over our own, even as initiator
            Some(description) if description.kind == SdpKind::Offer => {
                debug!("Answering remote offer saved before call on {}", self.key);
                self.apply_remote(description).await
            }
            Some(description) => {
                debug!("Applying remote answer saved before call on {}", self.key);
                if self.config.is_initiator {
                    self.send_offer().await?;
                }
                self.apply_remote(description).await
            }
            None if self.config.is_initiator => self.send_offer().await,
            None => {
                debug!("Waiting for remote offer on {}", self.key);
                Ok(())
            }
        }
    }

    /// Handles one inbound signaling message
    pub async fn receive(&mut self, message: SignalMessage) -> Result<Flow> {
        if self.state == SessionState::Disconnected {
            debug!("Session {} closed, dropping {}", self.key, message.kind());
            return Ok(Flow::Continue);
        }
        debug!("Session {} received {}", self.key, message.kind());

        match message {
            SignalMessage::Offer { sdp } => self.on_remote_sdp(SdpKind::Offer, &sdp).await,
            SignalMessage::Answer { sdp } => self.on_remote_sdp(SdpKind::Answer, &sdp).await,
            SignalMessage::Candidate(candidate) => self.on_remote_candidate(candidate).await,
            SignalMessage::Bye => Ok(Flow::Disconnect(DisconnectReason::RemoteBye)),
        }
    }

    async fn on_remote_sdp(&mut self, kind: SdpKind, sdp: &str) -> Result<Flow> {
        let description = RemoteDescription {
            kind,
            sdp: rewrite_remote(sdp, &self.bridge_config.sdp),
        };

        if self.link.is_none() {
            debug!("No connection yet on {}, saving remote {:?}", self.key, kind);
            self.pending_remote = Some(description);
            return Ok(Flow::Continue);
        }

        self.apply_remote(description).await?;
        Ok(Flow::Continue)
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Result<Flow> {
        let Some(candidate) = self.candidates.offer(candidate) else {
            return Ok(Flow::Continue);
        };
        let link = self.link.as_ref().ok_or_else(|| {
            Error::InvalidState(format!("session {} has no connection", self.key))
        })?;
        link.add_ice_candidate(candidate).await?;
        Ok(Flow::Continue)
    }

    async fn apply_remote(&mut self, description: RemoteDescription) -> Result<()> {
        let link = self.require_link()?;
        let kind = description.kind;
        link.set_remote_description(description).await?;

        // the connection can take candidates from now on
        let queued = self.candidates.retire();
        if !queued.is_empty() {
            debug!("Replaying {} queued candidates on {}", queued.len(), self.key);
        }
        for candidate in queued {
            if let Err(e) = link.add_ice_candidate(candidate).await {
                warn!("Queued candidate rejected on {}: {}", self.key, e);
            }
        }

        if kind == SdpKind::Offer {
            self.send_answer().await?;
        }
        Ok(())
    }

    async fn send_offer(&self) -> Result<()> {
        let sdp = self.require_link()?.create_offer().await?;
        debug!("Sending offer on {}", self.key);
        self.emit(SignalMessage::Offer { sdp });
        Ok(())
    }

    async fn send_answer(&self) -> Result<()> {
        let sdp = self.require_link()?.create_answer().await?;
        debug!("Sending answer on {}", self.key);
        self.emit(SignalMessage::Answer { sdp });
        Ok(())
    }

    fn require_link(&self) -> Result<Arc<dyn PeerLink>> {
        self.link
            .clone()
            .ok_or_else(|| Error::InvalidState(format!("session {} has no connection", self.key)))
    }

    /// Swaps in a new configuration. On a live connection the new local
    /// stream is attached and a fresh offer (initiator) or answer is sent.
    pub async fn renegotiate(
        &mut self,
        config: SessionConfig,
        stream: Option<LocalStream>,
    ) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Err(Error::InvalidState(format!("session {} is disconnected", self.key)));
        }
        if self.capture_in_flight {
            return Err(Error::InvalidState(format!(
                "session {} is waiting for local media",
                self.key
            )));
        }
        self.config = config;

        let (Some(link), Some(stream)) = (self.link.clone(), stream) else {
            debug!("Session {} not connected, new config applies on call", self.key);
            return Ok(());
        };

        link.attach_stream(&stream).await?;
        self.local_stream = Some(stream);
        info!("Renegotiating session {}", self.key);
        if self.config.is_initiator {
            self.send_offer().await
        } else {
            self.send_answer().await
        }
    }

    /// Trickles a locally gathered candidate to the peer
    pub fn on_local_candidate(&self, candidate: IceCandidate) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.emit(SignalMessage::Candidate(candidate));
    }

    /// Returns the track id when it becomes this session's remote video
    pub fn on_remote_track(&mut self, track_id: String, kind: MediaKind) -> Option<String> {
        if self.state == SessionState::Disconnected {
            return None;
        }
        if self.state == SessionState::Negotiating {
            info!("Session {} answered", self.key);
            self.state = SessionState::Connected;
            self.emit(HostEvent::Answered);
        }

        if kind == MediaKind::Video && self.remote_video.is_none() {
            self.remote_video = Some(track_id.clone());
            return Some(track_id);
        }
        None
    }

    pub fn on_ice_state(&mut self, state: IceConnectionState) -> Flow {
        if self.state == SessionState::Disconnected {
            return Flow::Continue;
        }
        debug!("Session {} ICE state {}", self.key, state);
        self.emit(HostEvent::IceConnectionStateChange { state });

        if state.is_peer_lost() {
            warn!("Session {} lost its peer (ICE {})", self.key, state);
            Flow::Disconnect(DisconnectReason::PeerLost)
        } else {
            Flow::Continue
        }
    }

    /// Tears the session down. Only the first call does anything; later
    /// calls return `None`.
    pub async fn disconnect(
        &mut self,
        send_bye: bool,
        reason: DisconnectReason,
    ) -> Option<Teardown> {
        if self.state == SessionState::Disconnected {
            return None;
        }
        info!("Disconnecting session {} ({:?})", self.key, reason);

        let remote_video = self.remote_video.take();
        if send_bye {
            self.emit(SignalMessage::Bye);
        }
        if let Some(link) = self.link.take() {
            if let Err(e) = link.close().await {
                warn!("Closing connection of {} failed: {}", self.key, e);
            }
        }

        let dropped = self.candidates.retire();
        if !dropped.is_empty() {
            debug!("Discarded {} unapplied candidates", dropped.len());
        }
        self.pending_remote = None;
        self.local_stream = None;
        self.capture_in_flight = false;
        self.state = SessionState::Disconnected;
        self.emit(HostEvent::Disconnected);

        Some(Teardown {
            remote_video,
            held_media: std::mem::take(&mut self.holds_media),
        })
    }
}
