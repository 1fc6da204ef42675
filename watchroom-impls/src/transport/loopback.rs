use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use log::{debug, info};
use parking_lot::Mutex;
use watchroom_core::{
    LinkId, MediaSource, PeerTransport, SharedMediaSource, TransportError, TransportEvent,
    TransportId,
};

use crate::random_string;

/// Receives the events of one [LoopbackTransport].
pub type TransportCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// An in-process network that connects [LoopbackTransport]s.
///
/// Media never actually flows, a link is considered streaming as soon as the
/// callee answers.
#[derive(Default)]
pub struct LoopbackNetwork {
    endpoints: DashMap<TransportId, Endpoint>,
    links: DashMap<LinkId, LoopbackLink>,
}

struct Endpoint {
    callback: TransportCallback,
    autoplay_blocked: bool,
}

#[derive(Debug, Clone)]
struct LoopbackLink {
    caller: TransportId,
    callee: TransportId,
    /// The label of the source that was called with.
    label: String,
    answered: bool,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a transport attached to this network.
    /// Events are delivered to the callback on the calling thread.
    pub fn transport<F>(self: &Arc<Self>, callback: F) -> LoopbackTransport
    where
        F: Fn(TransportEvent) + Send + Sync + 'static,
    {
        LoopbackTransport {
            network: self.clone(),
            callback: Arc::new(callback),
            current: Default::default(),
            autoplay_blocked: AtomicCell::new(false),
        }
    }

    /// The number of links that were called and not closed yet.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// The label of the source streamed over a link.
    pub fn link_label(&self, link_id: LinkId) -> Option<String> {
        self.links.get(&link_id).map(|l| l.label.clone())
    }

    fn emit(&self, to: &TransportId, event: TransportEvent) {
        // The guard must be gone before the callback runs, as it may call back into the network.
        let callback = self.endpoints.get(to).map(|e| e.callback.clone());

        match callback {
            Some(callback) => callback(event),
            None => debug!("Dropping {:?} for unreachable {}", event, to),
        }
    }

    fn is_autoplay_blocked(&self, transport_id: &TransportId) -> bool {
        self.endpoints
            .get(transport_id)
            .map(|e| e.autoplay_blocked)
            .unwrap_or_default()
    }

    /// Removes every link of an endpoint, returning the other ends.
    fn detach(&self, transport_id: &TransportId) -> Vec<(LinkId, TransportId)> {
        let affected: Vec<_> = self
            .links
            .iter()
            .filter_map(|entry| {
                let link = entry.value();

                if &link.caller == transport_id {
                    Some((*entry.key(), link.callee.clone()))
                } else if &link.callee == transport_id {
                    Some((*entry.key(), link.caller.clone()))
                } else {
                    None
                }
            })
            .collect();

        for (link_id, _) in &affected {
            self.links.remove(link_id);
        }

        affected
    }
}

/// Implements [PeerTransport] over a [LoopbackNetwork].
pub struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    callback: TransportCallback,
    current: Mutex<Option<TransportId>>,
    autoplay_blocked: AtomicCell<bool>,
}

impl LoopbackTransport {
    pub fn transport_id(&self) -> Option<TransportId> {
        self.current.lock().clone()
    }

    /// Makes received streams report [TransportEvent::PlaybackBlocked].
    pub fn set_autoplay_blocked(&self, blocked: bool) {
        self.autoplay_blocked.store(blocked);

        if let Some(id) = self.transport_id() {
            if let Some(mut endpoint) = self.network.endpoints.get_mut(&id) {
                endpoint.autoplay_blocked = blocked;
            }
        }
    }

    /// Simulates the session going away, for example after a network change.
    /// Every link of this transport errors on the other end.
    pub fn drop_session(&self, reason: &str) {
        let Some(id) = self.current.lock().take() else {
            return;
        };

        info!("Dropping loopback session {}: {}", id, reason);

        let affected = self.network.detach(&id);
        self.network.endpoints.remove(&id);

        for (link_id, other) in affected {
            self.network.emit(
                &other,
                TransportEvent::LinkError {
                    link_id,
                    reason: reason.to_string(),
                },
            );
        }

        (self.callback)(TransportEvent::SessionLost {
            reason: reason.to_string(),
        });
    }

    /// Simulates media flowing again on a link after a stall.
    pub fn resume_media(&self, link_id: LinkId) {
        let callee = self
            .network
            .links
            .get(&link_id)
            .filter(|l| l.answered)
            .map(|l| l.callee.clone());

        if let Some(callee) = callee {
            self.network
                .emit(&callee, TransportEvent::MediaResumed { link_id });
        }
    }

    fn require_session(&self) -> Result<TransportId, TransportError> {
        self.transport_id()
            .ok_or(TransportError::SessionUnavailable)
    }
}

impl PeerTransport for LoopbackTransport {
    fn open(&self) -> Result<(), TransportError> {
        let previous = self.current.lock().take();

        if let Some(previous) = previous {
            for (link_id, other) in self.network.detach(&previous) {
                self.network
                    .emit(&other, TransportEvent::LinkClosed { link_id });
            }

            self.network.endpoints.remove(&previous);
        }

        let transport_id = TransportId::new(random_string(16));

        self.network.endpoints.insert(
            transport_id.clone(),
            Endpoint {
                callback: self.callback.clone(),
                autoplay_blocked: self.autoplay_blocked.load(),
            },
        );

        *self.current.lock() = Some(transport_id.clone());
        (self.callback)(TransportEvent::SessionOpened { transport_id });

        Ok(())
    }

    fn call(
        &self,
        link_id: LinkId,
        remote: &TransportId,
        source: &SharedMediaSource,
    ) -> Result<(), TransportError> {
        let caller = self.require_session()?;

        if !self.network.endpoints.contains_key(remote) {
            return Err(TransportError::UnknownPeer(remote.clone()));
        }

        self.network.links.insert(
            link_id,
            LoopbackLink {
                caller: caller.clone(),
                callee: remote.clone(),
                label: source.label(),
                answered: false,
            },
        );

        self.network.emit(
            remote,
            TransportEvent::IncomingCall {
                link_id,
                from: caller,
            },
        );

        Ok(())
    }

    fn answer(&self, link_id: LinkId) -> Result<(), TransportError> {
        let callee = self.require_session()?;

        let caller = {
            let mut link = self
                .network
                .links
                .get_mut(&link_id)
                .filter(|l| l.callee == callee)
                .ok_or(TransportError::UnknownLink(link_id))?;

            link.answered = true;
            link.caller.clone()
        };

        self.network
            .emit(&caller, TransportEvent::StreamReceived { link_id });
        self.network
            .emit(&callee, TransportEvent::StreamReceived { link_id });

        if self.network.is_autoplay_blocked(&callee) {
            self.network
                .emit(&callee, TransportEvent::PlaybackBlocked { link_id });
        }

        Ok(())
    }

    fn close(&self, link_id: LinkId) {
        let Some((_, link)) = self.network.links.remove(&link_id) else {
            return;
        };

        let own = self.transport_id();
        let other = if own.as_ref() == Some(&link.caller) {
            link.callee
        } else {
            link.caller
        };

        self.network
            .emit(&other, TransportEvent::LinkClosed { link_id });
    }
}
