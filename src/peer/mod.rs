pub mod connection;
pub mod engine;
pub mod ice;
pub mod media;
pub mod sdp;
pub mod types;

pub use connection::WebRtcEngine;
pub use engine::{LinkSetup, PeerEvent, PeerEventEnvelope, PeerLink, RtcEngine};
pub use ice::CandidateQueue;
pub use media::{CapturedMedia, LocalMedia, LocalStream, LocalTrack};
pub use types::{
    IceCandidate, IceConnectionState, IceServer, MediaKind, RemoteDescription, SdpKind,
};
