use thiserror::Error;

use crate::{LinkId, SharedMediaSource, TransportId};

/// The point-to-point media transport.
///
/// Calls are directional, from the host to a viewer. Everything that happens
/// afterwards is reported back as a [TransportEvent].
pub trait PeerTransport
where
    Self: 'static + Send + Sync,
{
    /// Opens (or reopens) the transport session.
    /// A [TransportEvent::SessionOpened] follows once the session has an identity.
    fn open(&self) -> Result<(), TransportError>;

    /// Calls a remote transport identity, streaming the given source.
    fn call(
        &self,
        link_id: LinkId,
        remote: &TransportId,
        source: &SharedMediaSource,
    ) -> Result<(), TransportError>;

    /// Accepts an incoming call without sending a stream back.
    fn answer(&self, link_id: LinkId) -> Result<(), TransportError>;

    /// Closes a link. Unknown links are ignored.
    fn close(&self, link_id: LinkId);
}

/// Events reported by a [PeerTransport].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The session is ready and reachable under the given identity.
    SessionOpened { transport_id: TransportId },
    /// The session was lost. Every identity handed out before is invalid.
    SessionLost { reason: String },
    /// A remote peer is calling.
    IncomingCall { link_id: LinkId, from: TransportId },
    /// The first media arrived on a link, or the remote acknowledged the call.
    StreamReceived { link_id: LinkId },
    /// Media started flowing again after a stall.
    MediaResumed { link_id: LinkId },
    /// The remote side closed the link.
    LinkClosed { link_id: LinkId },
    /// The link failed.
    LinkError { link_id: LinkId, reason: String },
    /// The received stream could not start playing without a user gesture.
    PlaybackBlocked { link_id: LinkId },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("The transport session is not open")]
    SessionUnavailable,
    #[error("No peer is reachable as {0}")]
    UnknownPeer(TransportId),
    #[error("Link {0} does not exist")]
    UnknownLink(LinkId),
    #[error("Transport failure: {0}")]
    Other(String),
}
