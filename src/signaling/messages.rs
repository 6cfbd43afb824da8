use serde::{Deserialize, Serialize};

use super::types::{Role, RoomId};

/// How the advisory `target`/`from` labels on routed messages are treated
/// on ingress. The labels are hints between the browsers; the server never
/// relies on them for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPolicy {
    /// Forward labels exactly as the sender set them.
    #[default]
    Passthrough,
    /// Clear both labels.
    Strip,
    /// Overwrite `from` with the sender's label and `target` with the
    /// peer's.
    Stamp,
}

impl LabelPolicy {
    /// Parse the `ROUTE_LABEL_POLICY` setting; unrecognized values fall
    /// back to passthrough.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "strip" => LabelPolicy::Strip,
            "stamp" => LabelPolicy::Stamp,
            _ => LabelPolicy::Passthrough,
        }
    }
}

/// Every message that can appear on the wire, discriminated by the `type`
/// field. Only `offer`, `answer`, `ice-candidate`, and `webrtc-connected`
/// are accepted from clients; the rest are server-originated and discarded
/// on ingress so clients cannot forge them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalMessage {
    #[serde(rename = "offer")]
    Offer {
        sdp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    #[serde(rename = "answer")]
    Answer {
        sdp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Flat `RTCIceCandidateInit` shape as the browsers emit it.
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        candidate: String,
        #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
        sdp_mline_index: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },

    /// Peer reports the direct link succeeded; signaling is over.
    #[serde(rename = "webrtc-connected")]
    WebRtcConnected,

    /// Server -> host, announces the allocated room id.
    #[serde(rename = "room-meta")]
    RoomMeta {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },

    #[serde(rename = "guest-joined")]
    GuestJoined,

    #[serde(rename = "guest-left")]
    GuestLeft,

    #[serde(rename = "host-left")]
    HostLeft,

    #[serde(rename = "room-closed")]
    RoomClosed,

    #[serde(rename = "error")]
    Error { message: String },

    /// Unrecognized `type` tag; always discarded by the dispatcher.
    #[serde(other)]
    Unknown,
}

impl SignalMessage {
    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::WebRtcConnected => "webrtc-connected",
            SignalMessage::RoomMeta { .. } => "room-meta",
            SignalMessage::GuestJoined => "guest-joined",
            SignalMessage::GuestLeft => "guest-left",
            SignalMessage::HostLeft => "host-left",
            SignalMessage::RoomClosed => "room-closed",
            SignalMessage::Error { .. } => "error",
            SignalMessage::Unknown => "unknown",
        }
    }

    /// Whether clients are allowed to send this message.
    pub fn client_sendable(&self) -> bool {
        matches!(
            self,
            SignalMessage::Offer { .. }
                | SignalMessage::Answer { .. }
                | SignalMessage::IceCandidate { .. }
                | SignalMessage::WebRtcConnected
        )
    }

    /// Apply the configured label policy before the message is routed.
    /// Only the three routable variants carry labels; everything else is
    /// untouched.
    pub fn relabel(&mut self, policy: LabelPolicy, sender: Role) {
        let (target, from) = match self {
            SignalMessage::Offer { target, from, .. }
            | SignalMessage::Answer { target, from, .. }
            | SignalMessage::IceCandidate { target, from, .. } => (target, from),
            _ => return,
        };
        match policy {
            LabelPolicy::Passthrough => {}
            LabelPolicy::Strip => {
                *target = None;
                *from = None;
            }
            LabelPolicy::Stamp => {
                *target = Some(sender.peer().wire_label().to_string());
                *from = Some(sender.wire_label().to_string());
            }
        }
    }
}
