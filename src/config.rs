// Bridge configuration
// Logging can only be switched off in development builds

use serde::{Deserialize, Serialize};

#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false; // release builds stay quiet unless RUST_LOG is set

#[cfg(debug_assertions)]
pub mod dev {
    // flip to false to silence logging in debug builds
    pub const ENABLE_LOGGING: bool = true;
    pub const DEFAULT_FILTER: &str = "callbridge_lib=debug,webrtc=warn";
}

#[cfg(not(debug_assertions))]
pub mod dev {
    pub const ENABLE_LOGGING: bool = false;
    pub const DEFAULT_FILTER: &str = "off";
}

/// Public STUN server placed first in every session's ICE list
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Aspect ratio assumed for a remote video until the renderer reports its size
pub const DEFAULT_ASPECT_RATIO: f64 = 640.0 / 480.0;

/// Label of the local media stream and its tracks
pub const LOCAL_STREAM_ID: &str = "ARDAMS";
pub const LOCAL_AUDIO_TRACK_ID: &str = "ARDAMSa0";
pub const LOCAL_VIDEO_TRACK_ID: &str = "ARDAMSv0";

/// Process-wide bridge settings
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    pub stun_server: String,
    pub sdp: SdpRewriteConfig,
    pub default_aspect_ratio: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            stun_server: DEFAULT_STUN_SERVER.into(),
            sdp: SdpRewriteConfig::default(),
            default_aspect_ratio: DEFAULT_ASPECT_RATIO,
        }
    }
}

/// Edits applied to every inbound offer/answer before it reaches the engine
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SdpRewriteConfig {
    /// `(codec, param)` pairs appended to the codec's fmtp line
    pub codec_params: Vec<(String, String)>,
    /// Codec moved to the front of the audio m= line
    pub preferred_audio_codec: Option<String>,
}

impl Default for SdpRewriteConfig {
    fn default() -> Self {
        Self {
            codec_params: vec![("opus/48000".into(), "stereo=1".into())],
            preferred_audio_codec: Some("opus/48000".into()),
        }
    }
}

/// Per-session configuration as sent by the host
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub is_initiator: bool,
    pub streams: StreamSelection,
    #[serde(default)]
    pub turn: TurnConfig,
}

/// Which local media a session sends (or needs captured)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSelection {
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub video: bool,
}

impl StreamSelection {
    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }

    pub fn union(self, other: StreamSelection) -> StreamSelection {
        StreamSelection {
            audio: self.audio || other.audio,
            video: self.video || other.video,
        }
    }

    /// Kinds in `self` that `other` does not select
    pub fn without(self, other: StreamSelection) -> StreamSelection {
        StreamSelection {
            audio: self.audio && !other.audio,
            video: self.video && !other.video,
        }
    }

    pub fn intersects(self, other: StreamSelection) -> bool {
        (self.audio && other.audio) || (self.video && other.video)
    }
}

/// TURN relay supplied by the host
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}
