//! Error types for the calling bridge

/// Result type alias using the bridge [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by session, registry and video-view operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected host configuration (zero-size container, missing view config)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Camera/microphone permission denied or no device available
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// Inbound signaling envelope could not be parsed
    #[error("Malformed signaling message: {0}")]
    MalformedMessage(String),

    /// Inbound signaling envelope carried a `type` we do not handle
    #[error("Unknown signaling message type: {0}")]
    UnknownMessageType(String),

    /// The engine refused a description, offer, answer or candidate
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// No session registered under the given key
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A session is already registered under the given key
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// Operation not allowed in the session's current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// The coordination task is gone
    #[error("Bridge is shut down")]
    Closed,

    /// JSON encoding/decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Errors that only cost the offending inbound message
    pub fn is_droppable_message(&self) -> bool {
        matches!(
            self,
            Error::MalformedMessage(_) | Error::UnknownMessageType(_)
        )
    }
}

impl From<webrtc::Error> for Error {
    fn from(err: webrtc::Error) -> Self {
        Error::Negotiation(err.to_string())
    }
}

#[cfg(feature = "tauri-shell")]
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
