mod host;
mod session;
mod viewer;

use std::{fmt::Display, time::Instant};

pub use host::*;
pub use session::*;
pub use viewer::*;

use crate::{Id, MembershipId, TransportId};

pub type LinkId = Id<PeerLink>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The call was placed and no media or acknowledgement arrived yet.
    Connecting,
    /// Media is flowing.
    Streaming,
    /// The link is being torn down locally.
    Closing,
    /// The link ended normally.
    Closed,
    /// The link timed out or errored.
    Failed,
}

impl LinkStatus {
    /// Terminal links are removed from the active set.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };

        f.write_str(label)
    }
}

/// A directional media link between the host and one viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerLink {
    pub id: LinkId,
    /// True on the host's side of the link.
    pub host_side: bool,
    /// The member on the other end.
    pub remote: MembershipId,
    /// The transport identity the link was made with.
    pub transport_id: TransportId,
    pub status: LinkStatus,
    pub created_at: Instant,
    pub established_at: Option<Instant>,
    pub last_activity_at: Instant,
}

impl PeerLink {
    pub fn new(
        id: LinkId,
        host_side: bool,
        remote: MembershipId,
        transport_id: TransportId,
        now: Instant,
    ) -> Self {
        Self {
            id,
            host_side,
            remote,
            transport_id,
            status: LinkStatus::Connecting,
            created_at: now,
            established_at: None,
            last_activity_at: now,
        }
    }

    /// Marks media as flowing. Returns true if this established the link.
    fn mark_streaming(&mut self, now: Instant) -> bool {
        self.last_activity_at = now;

        if self.status == LinkStatus::Connecting {
            self.status = LinkStatus::Streaming;
            self.established_at = Some(now);
            return true;
        }

        false
    }
}
