#![allow(dead_code)]

use async_trait::async_trait;
use callbridge_lib::config::{SessionConfig, StreamSelection, TurnConfig};
use callbridge_lib::error::{Error, Result};
use callbridge_lib::peer::engine::{
    LinkSetup, PeerEvent, PeerEventEnvelope, PeerEventSender, PeerLink, RtcEngine,
};
use callbridge_lib::peer::media::{CapturedMedia, LocalStream, LocalTrack};
use callbridge_lib::peer::types::{IceCandidate, RemoteDescription};
use callbridge_lib::runtime::BridgeHandle;
use callbridge_lib::signaling::{OutboundMessage, SignalingBridge};
use callbridge_lib::video::{VideoSurface, ViewLayout};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const REMOTE_OFFER: &str = "v=0\r\n\
o=- 1 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 0 111\r\n\
a=rtpmap:0 PCMU/8000\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=fmtp:111 minptime=10\r\n";

/// Everything a session asked its link to do, in order
#[derive(Debug, Clone)]
pub enum LinkCall {
    Attach(LocalStream),
    CreateOffer,
    CreateAnswer,
    SetRemote(RemoteDescription),
    AddCandidate(IceCandidate),
    Close,
}

pub struct FakeLink {
    pub setup: LinkSetup,
    events: PeerEventSender,
    calls: Mutex<Vec<LinkCall>>,
    reject_remote: AtomicBool,
}

impl FakeLink {
    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn added_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                LinkCall::AddCandidate(c) => Some(c.candidate),
                _ => None,
            })
            .collect()
    }

    pub fn remote_descriptions(&self) -> Vec<RemoteDescription> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                LinkCall::SetRemote(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn attached(&self) -> Vec<LocalStream> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                LinkCall::Attach(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.calls().iter().any(|c| matches!(c, LinkCall::Close))
    }

    pub fn reject_remote(&self) {
        self.reject_remote.store(true, Ordering::SeqCst);
    }

    /// Envelope as the engine would raise it for this connection
    pub fn envelope(&self, event: PeerEvent) -> PeerEventEnvelope {
        PeerEventEnvelope {
            session_key: self.setup.session_key.clone(),
            connection_id: self.setup.connection_id.clone(),
            event,
        }
    }

    pub fn raise(&self, event: PeerEvent) {
        let _ = self.events.send(self.envelope(event));
    }

    fn record(&self, call: LinkCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn attach_stream(&self, stream: &LocalStream) -> Result<()> {
        self.record(LinkCall::Attach(stream.clone()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        self.record(LinkCall::CreateOffer);
        Ok(format!("offer-from-{}", self.setup.session_key))
    }

    async fn create_answer(&self) -> Result<String> {
        self.record(LinkCall::CreateAnswer);
        Ok(format!("answer-from-{}", self.setup.session_key))
    }

    async fn set_remote_description(&self, description: RemoteDescription) -> Result<()> {
        if self.reject_remote.load(Ordering::SeqCst) {
            return Err(Error::Negotiation("remote description rejected".into()));
        }
        self.record(LinkCall::SetRemote(description));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.record(LinkCall::AddCandidate(candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(LinkCall::Close);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeEngine {
    captures: AtomicUsize,
    deny: AtomicBool,
    gate: Option<Arc<Semaphore>>,
    links: Mutex<Vec<Arc<FakeLink>>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Capture waits for a permit on `gate`, like a pending permission prompt
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn deny_capture(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn links(&self) -> Vec<Arc<FakeLink>> {
        self.links.lock().unwrap().clone()
    }

    pub fn link_for(&self, key: &str) -> Arc<FakeLink> {
        self.links()
            .into_iter()
            .rev()
            .find(|l| l.setup.session_key == key)
            .unwrap_or_else(|| panic!("no link opened for {key}"))
    }
}

#[async_trait]
impl RtcEngine for FakeEngine {
    async fn capture(&self, request: StreamSelection) -> Result<CapturedMedia> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.deny.load(Ordering::SeqCst) {
            return Err(Error::MediaAcquisition("permission denied".into()));
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(CapturedMedia {
            audio: request.audio.then(LocalTrack::audio),
            video: request.video.then(LocalTrack::video),
        })
    }

    async fn open(&self, setup: LinkSetup, events: PeerEventSender) -> Result<Arc<dyn PeerLink>> {
        let link = Arc::new(FakeLink {
            setup,
            events,
            calls: Mutex::new(Vec::new()),
            reject_remote: AtomicBool::new(false),
        });
        self.links.lock().unwrap().push(Arc::clone(&link));
        Ok(link)
    }
}

#[derive(Default)]
pub struct RecordingBridge {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages_for(&self, key: &str) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// The `type` of every message sent for `key`
    pub fn types_for(&self, key: &str) -> Vec<String> {
        self.messages_for(key)
            .iter()
            .filter_map(|m| m["type"].as_str().map(str::to_string))
            .collect()
    }

    pub fn count(&self, key: &str, kind: &str) -> usize {
        self.types_for(key).iter().filter(|t| *t == kind).count()
    }
}

impl SignalingBridge for RecordingBridge {
    fn send(&self, session_key: &str, message: &OutboundMessage) {
        let value = message.to_json().unwrap();
        self.sent
            .lock()
            .unwrap()
            .push((session_key.to_string(), value));
    }
}

#[derive(Default)]
pub struct RecordingSurface {
    layouts: Mutex<Vec<ViewLayout>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn renders(&self) -> usize {
        self.layouts.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<ViewLayout> {
        self.layouts.lock().unwrap().last().cloned()
    }
}

impl VideoSurface for RecordingSurface {
    fn render(&self, layout: &ViewLayout) {
        self.layouts.lock().unwrap().push(layout.clone());
    }
}

pub fn session_config(is_initiator: bool, audio: bool, video: bool) -> SessionConfig {
    SessionConfig {
        is_initiator,
        streams: StreamSelection { audio, video },
        turn: TurnConfig::default(),
    }
}

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        label: 0,
        id: "0".into(),
        candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ host"),
    }
}

/// Polls `check` until it holds or a second has passed
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Waits until the bridge reports `count` sessions parked on a capture
pub async fn until_awaiting_media(handle: &BridgeHandle, count: usize) -> bool {
    for _ in 0..100 {
        if handle.status().await.unwrap().awaiting_media == count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
