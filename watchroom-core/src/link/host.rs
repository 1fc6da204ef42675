use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use thiserror::Error;

use super::{LinkId, LinkStatus, PeerLink};
use crate::{Config, IdType, Introspect, MembershipId, SharedMediaSource, Timers, TransportId};

/// Something the transport should do on behalf of the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    /// Call the remote identity with the local media source.
    Call {
        link_id: LinkId,
        remote: TransportId,
    },
    /// Tear the link down.
    Close { link_id: LinkId },
}

/// Something the coordinator wants the room to know.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkNotice {
    StatusChanged {
        remote: MembershipId,
        link_id: LinkId,
        status: LinkStatus,
    },
    /// The link never started streaming. It is not retried automatically.
    TimedOut { remote: MembershipId },
    /// The link failed for another reason.
    Failed {
        remote: MembershipId,
        reason: String,
    },
    /// The viewer was dialed too often during this streaming session.
    AttemptsExhausted { remote: MembershipId },
}

/// The outcome of feeding something to a coordinator.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LinkReport {
    pub commands: Vec<LinkCommand>,
    pub notices: Vec<LinkNotice>,
}

impl LinkReport {
    pub fn merge(&mut self, other: LinkReport) {
        self.commands.extend(other.commands);
        self.notices.extend(other.notices);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.notices.is_empty()
    }

    fn status(&mut self, link: &PeerLink) {
        self.notices.push(LinkNotice::StatusChanged {
            remote: link.remote.clone(),
            link_id: link.id,
            status: link.status,
        });
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No media source is selected")]
    NoSource,
}

/// Manages the host's outbound links, one per viewer.
///
/// The coordinator owns the media source while streaming. It never talks to the
/// transport itself, it only returns [LinkCommand]s for the caller to carry out.
#[derive(Debug)]
pub struct HostLinks {
    link_timeout: Duration,
    max_attempts: u32,
    source: Option<SharedMediaSource>,
    streaming: bool,
    /// The active set. Terminal links are never kept here.
    links: HashMap<MembershipId, PeerLink>,
    /// How often each viewer was dialed during the current streaming session.
    attempts: HashMap<MembershipId, u32>,
    timers: Timers<LinkId>,
}

impl HostLinks {
    pub fn new(config: &Config) -> Self {
        Self {
            link_timeout: config.link_timeout(),
            max_attempts: config.max_link_attempts,
            source: None,
            streaming: false,
            links: Default::default(),
            attempts: Default::default(),
            timers: Timers::new(),
        }
    }

    pub fn set_source(&mut self, source: SharedMediaSource) {
        self.source = Some(source);
    }

    /// Read access to the media source, for local playback.
    pub fn source(&self) -> Option<&SharedMediaSource> {
        self.source.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Allows links to be created. Requires a media source.
    pub fn start_streaming(&mut self) -> Result<(), LinkError> {
        if self.source.is_none() {
            return Err(LinkError::NoSource);
        }

        self.streaming = true;
        self.attempts.clear();

        Ok(())
    }

    /// Closes every link and stops creating new ones.
    pub fn stop_streaming(&mut self) -> LinkReport {
        self.streaming = false;
        self.attempts.clear();

        let remotes: Vec<_> = self.links.keys().cloned().collect();
        let mut report = LinkReport::default();

        for remote in remotes {
            report.merge(self.close(&remote));
        }

        report
    }

    /// Dials a viewer, unless a live link to that identity already exists.
    ///
    /// A live link to a different identity is stale, and is failed before dialing the new one.
    pub fn connect(
        &mut self,
        remote: MembershipId,
        transport_id: TransportId,
        now: Instant,
    ) -> LinkReport {
        let mut report = LinkReport::default();

        if !self.streaming || self.source.is_none() {
            debug!("Not streaming, {} will be dialed later", remote);
            return report;
        }

        if let Some(existing) = self.links.get(&remote) {
            if existing.transport_id == transport_id {
                debug!("Already linked to {} as {}", remote, transport_id);
                return report;
            }

            report.merge(self.fail(&remote, "Stale transport identity", false));
        }

        let attempts = self.attempts.entry(remote.clone()).or_default();

        if *attempts >= self.max_attempts {
            if *attempts == self.max_attempts {
                warn!("Giving up on dialing {} after {} attempts", remote, attempts);

                *attempts += 1;
                report
                    .notices
                    .push(LinkNotice::AttemptsExhausted { remote });
            }

            return report;
        }

        *attempts += 1;

        let link = PeerLink::new(LinkId::new(), true, remote.clone(), transport_id.clone(), now);

        info!("Dialing {} as {} (link {})", remote, transport_id, link.id);

        self.timers.arm(link.id, now + self.link_timeout);

        report.commands.push(LinkCommand::Call {
            link_id: link.id,
            remote: transport_id,
        });
        report.status(&link);

        self.links.insert(remote, link);

        report
    }

    /// The remote acknowledged the call or media arrived.
    pub fn on_stream_received(&mut self, link_id: LinkId, now: Instant) -> LinkReport {
        let mut report = LinkReport::default();

        let Some(link) = self.links.values_mut().find(|l| l.id == link_id) else {
            debug!("Ignoring media on unknown link {}", link_id);
            return report;
        };

        if link.mark_streaming(now) {
            info!("Link {} to {} is streaming", link.id, link.remote);

            self.timers.cancel(&link.id);
            self.attempts.remove(&link.remote);
            report.status(link);
        }

        report
    }

    /// Records activity on a link, keeping it fresh.
    pub fn on_activity(&mut self, link_id: LinkId, now: Instant) -> LinkReport {
        self.on_stream_received(link_id, now)
    }

    /// The remote closed the link. This is a normal end of life.
    pub fn on_remote_closed(&mut self, link_id: LinkId) -> LinkReport {
        let mut report = LinkReport::default();

        let Some(remote) = self.remote_of(link_id) else {
            return report;
        };

        if let Some(mut link) = self.links.remove(&remote) {
            info!("Link {} to {} was closed by the remote", link.id, remote);

            self.timers.cancel(&link.id);
            link.status = LinkStatus::Closed;
            report.status(&link);
        }

        report
    }

    /// The link errored.
    pub fn on_link_error(&mut self, link_id: LinkId, reason: &str) -> LinkReport {
        match self.remote_of(link_id) {
            Some(remote) => self.fail(&remote, reason, false),
            None => LinkReport::default(),
        }
    }

    /// A viewer registered a new transport identity. Links bound to the old one are failed.
    pub fn identity_replaced(
        &mut self,
        remote: &MembershipId,
        previous: &TransportId,
    ) -> LinkReport {
        let is_stale = self
            .links
            .get(remote)
            .map(|l| &l.transport_id == previous)
            .unwrap_or_default();

        if !is_stale {
            return LinkReport::default();
        }

        self.fail(remote, "Transport identity changed", false)
    }

    /// A viewer left the room.
    pub fn remove_member(&mut self, remote: &MembershipId) -> LinkReport {
        self.attempts.remove(remote);
        self.close(remote)
    }

    /// The local transport session was lost, so every link is gone with it.
    pub fn invalidate_all(&mut self) -> LinkReport {
        let mut report = LinkReport::default();

        for (_, mut link) in self.links.drain() {
            link.status = LinkStatus::Failed;
            report.status(&link);
        }

        self.timers.clear();
        self.attempts.clear();

        report
    }

    /// Fails links that did not reach streaming in time.
    pub fn poll_timers(&mut self, now: Instant) -> LinkReport {
        let mut report = LinkReport::default();

        for link_id in self.timers.expire(now) {
            if let Some(remote) = self.remote_of(link_id) {
                report.merge(self.fail(&remote, "Timed out", true));
            }
        }

        report
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn link(&self, remote: &MembershipId) -> Option<&PeerLink> {
        self.links.get(remote)
    }

    /// The active links, oldest first.
    pub fn links(&self) -> Vec<PeerLink> {
        let mut links: Vec<_> = self.links.values().cloned().collect();
        links.sort_by_key(|l| l.created_at);

        links
    }

    pub fn remote_of(&self, link_id: LinkId) -> Option<MembershipId> {
        self.links
            .values()
            .find(|l| l.id == link_id)
            .map(|l| l.remote.clone())
    }

    fn close(&mut self, remote: &MembershipId) -> LinkReport {
        let mut report = LinkReport::default();

        if let Some(mut link) = self.links.remove(remote) {
            self.timers.cancel(&link.id);

            link.status = LinkStatus::Closing;
            report.status(&link);
            report.commands.push(LinkCommand::Close { link_id: link.id });

            link.status = LinkStatus::Closed;
            report.status(&link);
        }

        report
    }

    /// Moves a link to failed. A link leaves the active set here, so it can only fail once.
    fn fail(&mut self, remote: &MembershipId, reason: &str, timed_out: bool) -> LinkReport {
        let mut report = LinkReport::default();

        let Some(mut link) = self.links.remove(remote) else {
            return report;
        };

        warn!("Link {} to {} failed: {}", link.id, remote, reason);

        self.timers.cancel(&link.id);
        link.status = LinkStatus::Failed;

        report.commands.push(LinkCommand::Close { link_id: link.id });
        report.status(&link);

        report.notices.push(if timed_out {
            LinkNotice::TimedOut {
                remote: remote.clone(),
            }
        } else {
            LinkNotice::Failed {
                remote: remote.clone(),
                reason: reason.to_string(),
            }
        });

        report
    }
}

#[derive(Debug)]
pub struct LinkIntrospection {
    pub id: IdType,
    pub remote: String,
    pub transport_id: String,
    pub status: LinkStatus,
}

#[derive(Debug)]
pub struct HostLinksIntrospection {
    pub streaming: bool,
    pub source: Option<String>,
    pub links: Vec<LinkIntrospection>,
    pub pending_timers: usize,
}

impl Introspect<LinkIntrospection> for PeerLink {
    fn introspect(&self) -> LinkIntrospection {
        LinkIntrospection {
            id: self.id.value(),
            remote: self.remote.to_string(),
            transport_id: self.transport_id.to_string(),
            status: self.status,
        }
    }
}

impl Introspect<HostLinksIntrospection> for HostLinks {
    fn introspect(&self) -> HostLinksIntrospection {
        use crate::MediaSource;

        HostLinksIntrospection {
            streaming: self.streaming,
            source: self.source.as_ref().map(|s| s.label()),
            links: self.links().introspect(),
            pending_timers: self.timers.len(),
        }
    }
}
