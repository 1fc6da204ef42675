use watchroom_core::{
    ConnectionStatus, MembershipId, Participant, PeerLink, PlaybackState, Role, SessionStatus,
};

use crate::{ChatMessage, RoomId};

/// A snapshot of everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomView {
    pub room_id: RoomId,
    pub membership_id: MembershipId,
    pub role: Role,
    pub roster: Vec<Participant>,
    pub chat: Vec<ChatMessage>,
    pub transport: SessionStatus,
    pub streaming: bool,
    pub media_label: Option<String>,
    /// The authoritative state for the host, the last received one for viewers.
    pub playback: Option<PlaybackState>,
    /// Where playback is expected to be right now.
    pub position_seconds: Option<f64>,
    pub syncing: bool,
    /// Viewers only.
    pub connection: Option<ConnectionStatus>,
    pub playback_blocked: bool,
    pub diagnostic_available: bool,
    /// Host only.
    pub links: Vec<PeerLink>,
}
