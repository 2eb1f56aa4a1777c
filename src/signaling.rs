//! Signaling envelopes exchanged with the host transport.
//!
//! Wire format is a JSON object discriminated by `type`. Peer-to-peer
//! messages are [`SignalMessage`]; notifications meant for the host only
//! are [`HostEvent`].

use crate::error::{Error, Result};
use crate::peer::types::{IceCandidate, IceConnectionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message relayed between the two peers of a session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate(IceCandidate),
    Bye,
}

impl SignalMessage {
    /// Parses an inbound envelope.
    ///
    /// Unparseable input yields [`Error::MalformedMessage`]; a well-formed
    /// envelope with a `type` we do not accept yields
    /// [`Error::UnknownMessageType`].
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| Error::MalformedMessage(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedMessage("missing string field `type`".into()))?;

        match kind {
            "offer" | "answer" | "candidate" | "bye" => serde_json::from_value(value)
                .map_err(|e| Error::MalformedMessage(e.to_string())),
            other => Err(Error::UnknownMessageType(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::Candidate(_) => "candidate",
            SignalMessage::Bye => "bye",
        }
    }
}

/// Notification for the host application, never relayed to the peer
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum HostEvent {
    #[serde(rename = "__answered")]
    Answered,
    #[serde(rename = "__disconnected")]
    Disconnected,
    #[serde(rename = "__iceConnectionStateChange")]
    IceConnectionStateChange { state: IceConnectionState },
    #[serde(rename = "__set_session_key")]
    SetSessionKey {
        #[serde(rename = "sessionKey")]
        session_key: String,
    },
}

/// Anything a session emits through the bridge
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum OutboundMessage {
    Signal(SignalMessage),
    Host(HostEvent),
}

impl From<SignalMessage> for OutboundMessage {
    fn from(m: SignalMessage) -> Self {
        OutboundMessage::Signal(m)
    }
}

impl From<HostEvent> for OutboundMessage {
    fn from(e: HostEvent) -> Self {
        OutboundMessage::Host(e)
    }
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Host-supplied channel for outbound messages.
///
/// Delivery to the remote peer (for [`SignalMessage`]s) is the host's job;
/// it is assumed reliable and ordered.
pub trait SignalingBridge: Send + Sync {
    fn send(&self, session_key: &str, message: &OutboundMessage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_offer_and_candidate() {
        let offer = SignalMessage::parse(r#"{"type":"offer","sdp":"v=0\r\n"}"#).unwrap();
        assert_eq!(
            offer,
            SignalMessage::Offer {
                sdp: "v=0\r\n".into()
            }
        );

        let cand = SignalMessage::parse(
            r#"{"type":"candidate","label":0,"id":"audio","candidate":"candidate:1 1 udp 1 1.2.3.4 5 typ host"}"#,
        )
        .unwrap();
        match cand {
            SignalMessage::Candidate(c) => {
                assert_eq!(c.label, 0);
                assert_eq!(c.id, "audio");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(SignalMessage::parse(r#"{"type":"bye"}"#).unwrap(), SignalMessage::Bye);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            SignalMessage::parse("not json"),
            Err(Error::MalformedMessage(_))
        ));
        assert!(matches!(
            SignalMessage::parse(r#"{"sdp":"x"}"#),
            Err(Error::MalformedMessage(_))
        ));
        assert!(matches!(
            SignalMessage::parse(r#"{"type":"offer"}"#),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn host_only_types_are_unknown_inbound() {
        let err = SignalMessage::parse(r#"{"type":"__answered"}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownMessageType(t) if t == "__answered"));
        assert!(matches!(
            SignalMessage::parse(r#"{"type":"renegotiate"}"#),
            Err(Error::UnknownMessageType(_))
        ));
    }

    #[test]
    fn outbound_wire_shapes() {
        let bye = OutboundMessage::from(SignalMessage::Bye).to_json().unwrap();
        assert_eq!(bye, json!({ "type": "bye" }));

        let key = OutboundMessage::from(HostEvent::SetSessionKey {
            session_key: "abc".into(),
        })
        .to_json()
        .unwrap();
        assert_eq!(key, json!({ "type": "__set_session_key", "sessionKey": "abc" }));

        let ice = OutboundMessage::from(HostEvent::IceConnectionStateChange {
            state: IceConnectionState::Checking,
        })
        .to_json()
        .unwrap();
        assert_eq!(ice, json!({ "type": "__iceConnectionStateChange", "state": "checking" }));

        let cand = OutboundMessage::from(SignalMessage::Candidate(IceCandidate {
            label: 1,
            id: "video".into(),
            candidate: "c".into(),
        }))
        .to_json()
        .unwrap();
        assert_eq!(
            cand,
            json!({ "type": "candidate", "label": 1, "id": "video", "candidate": "c" })
        );
    }
}
