//! All live sessions plus the state they share: local media, the video
//! view, the engine and the host bridge.
//!
//! Owned by exactly one task (see [`crate::runtime`]); nothing here locks.

use crate::config::{BridgeConfig, SessionConfig, StreamSelection};
use crate::error::{Error, Result};
use crate::peer::engine::{PeerEvent, PeerEventEnvelope, PeerEventSender, RtcEngine};
use crate::peer::media::{CapturedMedia, LocalMedia};
use crate::session::{DisconnectReason, Flow, Session};
use crate::signaling::{SignalMessage, SignalingBridge};
use crate::video::{VideoSurface, VideoView, VideoViewConfig, ViewParams};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SessionRegistry {
    config: Arc<BridgeConfig>,
    engine: Arc<dyn RtcEngine>,
    bridge: Arc<dyn SignalingBridge>,
    surface: Arc<dyn VideoSurface>,
    events: PeerEventSender,
    sessions: HashMap<String, Session>,
    media: LocalMedia,
    capturing: StreamSelection,
    view: VideoView,
}

/// What a call or renegotiation needs before it can go ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStep {
    /// Every wanted track is in the pool
    Ready,
    /// Capture these kinds, then hand the result to
    /// [`SessionRegistry::finish_capture`]
    Capture(StreamSelection),
    /// The missing kinds are being captured for another session
    Await,
}

impl SessionRegistry {
    pub fn new(
        config: BridgeConfig,
        engine: Arc<dyn RtcEngine>,
        bridge: Arc<dyn SignalingBridge>,
        surface: Arc<dyn VideoSurface>,
        events: PeerEventSender,
    ) -> Self {
        let view = VideoView::new(config.default_aspect_ratio);
        Self {
            config: Arc::new(config),
            engine,
            bridge,
            surface,
            events,
            sessions: HashMap::new(),
            media: LocalMedia::new(),
            capturing: StreamSelection::default(),
            view,
        }
    }

    pub fn session(&self, key: &str) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn media(&self) -> &LocalMedia {
        &self.media
    }

    pub fn view(&self) -> &VideoView {
        &self.view
    }

    fn session_mut(&mut self, key: &str) -> Result<&mut Session> {
        self.sessions
            .get_mut(key)
            .ok_or_else(|| Error::SessionNotFound(key.to_string()))
    }

    pub fn create_session(&mut self, key: &str, config: SessionConfig) -> Result<()> {
        if self.sessions.contains_key(key) {
            return Err(Error::SessionExists(key.to_string()));
        }
        info!(
            "Creating session {} (initiator={}, audio={}, video={})",
            key, config.is_initiator, config.streams.audio, config.streams.video
        );
        let session = Session::new(
            key.to_string(),
            config,
            Arc::clone(&self.config),
            Arc::clone(&self.bridge),
        );
        session.announce();
        self.sessions.insert(key.to_string(), session);
        Ok(())
    }

    /// First half of `call`: checks the session can be called and plans
    /// the capture it needs. Anything but [`MediaStep::Ready`] marks the
    /// session as waiting for media until [`complete_call`](Self::complete_call)
    /// or [`abandon_capture`](Self::abandon_capture).
    pub fn prepare_call(&mut self, key: &str) -> Result<MediaStep> {
        let session = self
            .sessions
            .get(key)
            .ok_or_else(|| Error::SessionNotFound(key.to_string()))?;
        if session.is_live() || session.capture_in_flight() {
            return Err(Error::InvalidState(format!("session {} already called", key)));
        }

        let streams = session.config().streams;
        let step = self.plan_capture(streams);
        if step != MediaStep::Ready {
            self.session_mut(key)?.set_capture_in_flight(true);
        }
        Ok(step)
    }

    /// Second half of `call`: attaches the pooled tracks and connects.
    /// Fails with `MediaAcquisition` if a wanted track never arrived.
    pub async fn complete_call(&mut self, key: &str) -> Result<()> {
        let Some(session) = self.sessions.get_mut(key) else {
            debug!("Session {} went away during capture", key);
            self.settle_media();
            return Err(Error::SessionNotFound(key.to_string()));
        };
        session.set_capture_in_flight(false);

        let stream = match self.media.stream_for(session.config().streams) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Local media for {} unavailable: {}", key, e);
                self.settle_media();
                return Err(e);
            }
        };

        let receive_video = self.view.is_configured();
        let connected = session
            .connect(
                self.engine.as_ref(),
                stream,
                self.events.clone(),
                receive_video,
            )
            .await;
        match connected {
            Ok(()) => {
                session.mark_media_held();
                self.media.acquire();
                Ok(())
            }
            Err(e) if session.is_live() => {
                // connection is up, only the first negotiation step failed
                session.mark_media_held();
                self.media.acquire();
                warn!("Negotiation on {} failed: {}", key, e);
                Err(e)
            }
            Err(e) => {
                warn!("Call on {} failed: {}", key, e);
                self.settle_media();
                Err(e)
            }
        }
    }

    /// `prepare_call` and `complete_call` back to back, capturing inline
    pub async fn call(&mut self, key: &str) -> Result<()> {
        self.await_media(key, |registry| registry.prepare_call(key)).await?;
        self.complete_call(key).await
    }

    pub async fn receive_message(&mut self, key: &str, message: SignalMessage) -> Result<()> {
        let session = self.session_mut(key)?;
        let flow = match session.receive(message).await {
            Ok(flow) => flow,
            Err(e) => {
                warn!("Session {} could not apply message: {}", key, e);
                return Err(e);
            }
        };
        if let Flow::Disconnect(reason) = flow {
            self.teardown(key, false, reason).await;
        }
        Ok(())
    }

    /// Plans the capture `key` needs to renegotiate with `config`.
    /// Sessions without a connection only store the config, so they need
    /// nothing. A session still waiting for call media is rejected.
    pub fn prepare_renegotiate(&mut self, key: &str, config: &SessionConfig) -> Result<MediaStep> {
        let session = self
            .sessions
            .get(key)
            .ok_or_else(|| Error::SessionNotFound(key.to_string()))?;
        if session.capture_in_flight() {
            return Err(Error::InvalidState(format!("session {} is waiting for local media", key)));
        }
        if !session.is_live() {
            return Ok(MediaStep::Ready);
        }

        let step = self.plan_capture(config.streams);
        if step != MediaStep::Ready {
            self.session_mut(key)?.set_capture_in_flight(true);
        }
        Ok(step)
    }

    pub async fn complete_renegotiate(&mut self, key: &str, config: SessionConfig) -> Result<()> {
        let Some(session) = self.sessions.get_mut(key) else {
            self.settle_media();
            return Err(Error::SessionNotFound(key.to_string()));
        };
        session.set_capture_in_flight(false);

        let stream = if session.is_live() {
            match self.media.stream_for(config.streams) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    warn!("Local media for {} unavailable: {}", key, e);
                    self.settle_media();
                    return Err(e);
                }
            }
        } else {
            None
        };
        session.renegotiate(config, stream).await.inspect_err(|e| {
            warn!("Renegotiation of {} failed: {}", key, e);
        })
    }

    pub async fn renegotiate(&mut self, key: &str, config: SessionConfig) -> Result<()> {
        self.await_media(key, |registry| registry.prepare_renegotiate(key, &config)).await?;
        self.complete_renegotiate(key, config).await
    }

    /// Runs `prepare` and captures inline whatever it asks for
    async fn await_media(
        &mut self,
        key: &str,
        prepare: impl FnOnce(&mut Self) -> Result<MediaStep>,
    ) -> Result<()> {
        match prepare(self)? {
            MediaStep::Ready => Ok(()),
            MediaStep::Capture(request) => {
                let captured = self.engine.capture(request).await;
                self.finish_capture(request, captured).inspect_err(|_| {
                    self.abandon_capture(key);
                })
            }
            MediaStep::Await => {
                self.abandon_capture(key);
                Err(Error::InvalidState("local media capture already in flight".into()))
            }
        }
    }

    /// Decides what `wanted` still needs. Kinds another session is already
    /// capturing are never requested twice.
    fn plan_capture(&mut self, wanted: StreamSelection) -> MediaStep {
        let missing = self.media.missing(wanted);
        if missing.is_empty() {
            return MediaStep::Ready;
        }
        let request = missing.without(self.capturing);
        if request.is_empty() {
            debug!("Capture for {:?} already in flight", missing);
            return MediaStep::Await;
        }
        self.capturing = self.capturing.union(request);
        MediaStep::Capture(request)
    }

    /// Stores the outcome of a capture planned by `prepare_call` or
    /// `prepare_renegotiate`. Tracks go to the shared pool; sessions pick
    /// them up when they complete.
    pub fn finish_capture(
        &mut self,
        request: StreamSelection,
        captured: Result<CapturedMedia>,
    ) -> Result<()> {
        self.capturing = self.capturing.without(request);
        match captured {
            Ok(captured) => {
                self.media.install(captured);
                Ok(())
            }
            Err(e) => {
                let e = match e {
                    Error::MediaAcquisition(_) => e,
                    other => Error::MediaAcquisition(other.to_string()),
                };
                warn!("Capture of {:?} failed: {}", request, e);
                Err(e)
            }
        }
    }

    /// True while a capture in flight covers a kind `wanted` still lacks
    pub fn awaits_capture(&self, wanted: StreamSelection) -> bool {
        self.media.missing(wanted).intersects(self.capturing)
    }

    /// Kinds currently being captured
    pub fn capturing(&self) -> StreamSelection {
        self.capturing
    }

    pub fn awaiting_media(&self) -> usize {
        self.sessions
            .values()
            .filter(|session| session.capture_in_flight())
            .count()
    }

    /// Gives up on media for `key`, e.g. after its capture failed
    pub fn abandon_capture(&mut self, key: &str) {
        if let Some(session) = self.sessions.get_mut(key) {
            session.set_capture_in_flight(false);
        }
        self.settle_media();
    }

    /// Drops pooled tracks no session holds once nobody waits for them
    fn settle_media(&mut self) {
        let waiting = self.sessions.values().any(Session::capture_in_flight);
        if self.capturing.is_empty() && !waiting {
            self.media.drop_unheld();
        }
    }

    /// Hangs up `key`, sending `bye`. Unknown keys are a no-op.
    pub async fn disconnect(&mut self, key: &str) -> Result<()> {
        if !self.sessions.contains_key(key) {
            debug!("Disconnect for unknown session {}", key);
            return Ok(());
        }
        self.teardown(key, true, DisconnectReason::Local).await;
        Ok(())
    }

    /// Disconnects every session, e.g. on shutdown
    pub async fn disconnect_all(&mut self) {
        let keys: Vec<String> = self.sessions.keys().cloned().collect();
        for key in keys {
            self.teardown(&key, true, DisconnectReason::Local).await;
        }
    }

    async fn teardown(&mut self, key: &str, send_bye: bool, reason: DisconnectReason) {
        let Some(mut session) = self.sessions.remove(key) else {
            return;
        };
        let Some(teardown) = session.disconnect(send_bye, reason).await else {
            return;
        };

        if let Some(track_id) = teardown.remote_video {
            if self.view.remove_remote(&track_id) {
                self.render();
            }
        }
        if teardown.held_media {
            self.media.release();
        }
        debug!("{} sessions left", self.sessions.len());
    }

    /// Routes an engine notification to its session. Events from a
    /// connection the session no longer owns are dropped.
    pub async fn handle_peer_event(&mut self, envelope: PeerEventEnvelope) {
        let PeerEventEnvelope {
            session_key,
            connection_id,
            event,
        } = envelope;

        let Some(session) = self.sessions.get_mut(&session_key) else {
            debug!("Event for unknown session {} dropped", session_key);
            return;
        };
        if session.connection_id() != Some(connection_id.as_str()) {
            debug!("Stale event from connection {} dropped", connection_id);
            return;
        }

        match event {
            PeerEvent::LocalCandidate(candidate) => session.on_local_candidate(candidate),
            PeerEvent::RemoteTrack { track_id, kind } => {
                if let Some(track_id) = session.on_remote_track(track_id, kind) {
                    self.view.add_remote(&session_key, &track_id);
                    self.render();
                }
            }
            PeerEvent::IceConnectionState(state) => {
                if let Flow::Disconnect(reason) = session.on_ice_state(state) {
                    self.teardown(&session_key, false, reason).await;
                }
            }
        }
    }

    pub fn set_video_view(&mut self, config: VideoViewConfig) -> Result<()> {
        self.view.set_config(config)?;
        self.render();
        Ok(())
    }

    pub fn refresh_video_view(&mut self, container: ViewParams) -> Result<()> {
        self.view.set_container(container)?;
        self.render();
        Ok(())
    }

    pub fn set_video_visible(&mut self, visible: bool) {
        self.view.set_visible(visible);
        self.render();
    }

    /// Renderer reported the native size of a session's remote video
    pub fn video_size_changed(&mut self, key: &str, width: f64, height: f64) -> Result<()> {
        if self.view.set_video_size(key, width, height)? {
            self.render();
        }
        Ok(())
    }

    fn render(&self) {
        if let Some(layout) = self.view.compute() {
            self.surface.render(&layout);
        }
    }
}
