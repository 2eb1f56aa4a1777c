use serde::{Deserialize, Serialize};
use std::fmt;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;

/// ICE candidate as it travels in a `candidate` signaling message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// m-line index
    pub label: u16,
    /// media stream identification (mid)
    pub id: String,
    /// candidate SDP fragment
    pub candidate: String,
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(c: IceCandidate) -> Self {
        RTCIceCandidateInit {
            candidate: c.candidate,
            sdp_mid: Some(c.id),
            sdp_mline_index: Some(c.label),
            username_fragment: None,
        }
    }
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        IceCandidate {
            label: init.sdp_mline_index.unwrap_or_default(),
            id: init.sdp_mid.unwrap_or_default(),
            candidate: init.candidate,
        }
    }
}

/// Which side of the offer/answer exchange an SDP body belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Remote SDP waiting to be (or being) applied to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

/// ICE connection state as reported to the host
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl IceConnectionState {
    /// The peer is gone without having said `bye`
    pub fn is_peer_lost(self) -> bool {
        matches!(
            self,
            IceConnectionState::Disconnected | IceConnectionState::Failed
        )
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl IceConnectionState {
    /// `None` for the engine's unspecified placeholder state
    pub fn from_rtc(state: RTCIceConnectionState) -> Option<Self> {
        match state {
            RTCIceConnectionState::New => Some(IceConnectionState::New),
            RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
            RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
            RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
            RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
            RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
            RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
            _ => None,
        }
    }
}

/// ICE server entry handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub url: String,
    pub username: String,
    pub credential: String,
}
