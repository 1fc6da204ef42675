use crossbeam::channel::{Receiver, Sender};
use watchroom_core::{
    ConnectionStatus, LinkStatus, MembershipId, Participant, PlaybackState, Role, SessionStatus,
};

use crate::ChatMessage;

pub type EventSender = Sender<RoomEvent>;
pub type EventReceiver = Receiver<RoomEvent>;

/// Events emitted by a [crate::RoomSession] for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// The roster changed.
    RosterUpdated { roster: Vec<Participant> },
    /// A chat message was received, or a system message was written.
    ChatReceived { message: ChatMessage },
    /// The local participant's role differs from the one it asked for.
    RoleChanged { role: Role },
    /// The transport session changed state.
    TransportStatusChanged { status: SessionStatus },
    /// The host started or stopped streaming.
    StreamingChanged {
        streaming: bool,
        media_label: Option<String>,
    },
    /// The playback state changed.
    /// For the host this is the authoritative state, for viewers the host's last update.
    PlaybackUpdated { state: PlaybackState },
    /// The syncing indicator appeared or went away. Viewers only.
    SyncingChanged { syncing: bool },
    /// The viewer's connection to the stream changed.
    ConnectionStatusChanged { status: ConnectionStatus },
    /// Autoplay was blocked, the user has to click to play. Viewers only.
    PlaybackBlocked,
    /// Connecting takes too long, a manual re-check should be offered. Viewers only.
    DiagnosticAvailable,
    /// A link to a viewer changed status. Host only.
    LinkStatusChanged {
        remote: MembershipId,
        status: LinkStatus,
    },
}
