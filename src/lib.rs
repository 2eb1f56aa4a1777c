pub mod config;
pub mod error;
pub mod layout;
pub mod logger;
pub mod peer;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod signaling;
pub mod utils;
pub mod video;

#[cfg(feature = "tauri-shell")]
mod commands;
#[cfg(feature = "tauri-shell")]
pub mod shell;

pub use config::{BridgeConfig, SessionConfig, StreamSelection, TurnConfig};
pub use error::{Error, Result};
pub use registry::SessionRegistry;
pub use runtime::{build_bridge, spawn_bridge, BridgeHandle, BridgeStatus};
pub use session::{DisconnectReason, Session, SessionState};
pub use signaling::{HostEvent, OutboundMessage, SignalMessage, SignalingBridge};
pub use video::{VideoSurface, VideoViewConfig, ViewLayout, ViewParams};

#[cfg(feature = "tauri-shell")]
pub use shell::run;
