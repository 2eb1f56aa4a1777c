//! Seam between the session core and the WebRTC engine.
//!
//! The engine pushes [`PeerEvent`]s for everything it discovers on its own
//! (local candidates, remote tracks, ICE state); sessions drive it through
//! [`PeerLink`].

use crate::config::StreamSelection;
use crate::error::Result;
use crate::peer::media::{CapturedMedia, LocalStream};
use crate::peer::types::{IceCandidate, IceConnectionState, IceServer, MediaKind, RemoteDescription};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Notification raised by a live connection
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A local candidate was gathered and should be trickled to the peer
    LocalCandidate(IceCandidate),
    /// The remote side started sending a track
    RemoteTrack { track_id: String, kind: MediaKind },
    IceConnectionState(IceConnectionState),
}

/// A [`PeerEvent`] tagged with the connection that raised it
#[derive(Debug, Clone, PartialEq)]
pub struct PeerEventEnvelope {
    pub session_key: String,
    pub connection_id: String,
    pub event: PeerEvent,
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEventEnvelope>;
pub type PeerEventReceiver = mpsc::UnboundedReceiver<PeerEventEnvelope>;

/// Everything the engine needs to open one connection
#[derive(Debug, Clone)]
pub struct LinkSetup {
    pub session_key: String,
    pub connection_id: String,
    pub ice_servers: Vec<IceServer>,
    /// Ask the remote side for video even when we send none
    pub receive_video: bool,
}

/// Factory for connections and local capture
#[async_trait]
pub trait RtcEngine: Send + Sync {
    /// Captures the requested local media. May wait on user/OS permission.
    async fn capture(&self, request: StreamSelection) -> Result<CapturedMedia>;

    /// Opens a connection whose notifications are pushed into `events`
    async fn open(&self, setup: LinkSetup, events: PeerEventSender) -> Result<Arc<dyn PeerLink>>;
}

/// One live peer connection
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Replaces whatever local stream was attached before
    async fn attach_stream(&self, stream: &LocalStream) -> Result<()>;

    /// Creates an offer, sets it as local description and returns its SDP
    async fn create_offer(&self) -> Result<String>;

    /// Creates an answer, sets it as local description and returns its SDP
    async fn create_answer(&self) -> Result<String>;

    async fn set_remote_description(&self, description: RemoteDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
