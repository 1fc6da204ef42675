use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use watchroom_core::{MembershipId, Participant, Role, TransportId};

/// Identifies a room. Generated outside the session, usually by whoever creates the room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A control event on the signaling channel.
///
/// On the wire this is `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SignalMessage {
    #[serde(rename = "joinRoom")]
    JoinRoom(JoinRoomPayload),
    #[serde(rename = "userJoined")]
    UserJoined(MembershipPayload),
    #[serde(rename = "userLeft")]
    UserLeft(MembershipPayload),
    #[serde(rename = "sendMessage")]
    SendMessage(ChatPayload),
    #[serde(rename = "newMessage")]
    NewMessage(ChatPayload),
    #[serde(rename = "peer-id")]
    PeerId(PeerIdPayload),
    #[serde(rename = "videoStateChange")]
    VideoStateChange(VideoStatePayload),
    #[serde(rename = "videoSeekOperation")]
    VideoSeekOperation(SeekPayload),
    #[serde(rename = "streaming-status-update")]
    StreamingStatusUpdate(StreamingPayload),
    #[serde(rename = "streaming-status")]
    StreamingStatus(StreamingPayload),
    #[serde(rename = "heartbeat")]
    Heartbeat(HeartbeatPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub room_id: RoomId,
    pub participant_id: MembershipId,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPayload {
    pub roster: Vec<Participant>,
    pub changed_participant: Participant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub room_id: RoomId,
    pub text: String,
    pub author: String,
    /// Set by the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdPayload {
    pub room_id: RoomId,
    pub transport_id: TransportId,
    pub role: Role,
    pub participant_id: MembershipId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatePayload {
    pub room_id: RoomId,
    pub is_playing: bool,
    pub position_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekPayload {
    pub room_id: RoomId,
    pub position_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingPayload {
    pub room_id: RoomId,
    pub streaming: bool,
    #[serde(default)]
    pub media_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub room_id: RoomId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Malformed signaling message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl SignalMessage {
    pub fn decode(text: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "joinRoom",
            Self::UserJoined(_) => "userJoined",
            Self::UserLeft(_) => "userLeft",
            Self::SendMessage(_) => "sendMessage",
            Self::NewMessage(_) => "newMessage",
            Self::PeerId(_) => "peer-id",
            Self::VideoStateChange(_) => "videoStateChange",
            Self::VideoSeekOperation(_) => "videoSeekOperation",
            Self::StreamingStatusUpdate(_) => "streaming-status-update",
            Self::StreamingStatus(_) => "streaming-status",
            Self::Heartbeat(_) => "heartbeat",
        }
    }

    /// The room the message is addressed to, if it names one.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::JoinRoom(p) => Some(&p.room_id),
            Self::SendMessage(p) | Self::NewMessage(p) => Some(&p.room_id),
            Self::PeerId(p) => Some(&p.room_id),
            Self::VideoStateChange(p) => Some(&p.room_id),
            Self::VideoSeekOperation(p) => Some(&p.room_id),
            Self::StreamingStatusUpdate(p) | Self::StreamingStatus(p) => Some(&p.room_id),
            Self::Heartbeat(p) => Some(&p.room_id),
            Self::UserJoined(_) | Self::UserLeft(_) => None,
        }
    }
}
