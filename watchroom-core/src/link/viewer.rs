use std::{
    fmt::Display,
    time::{Duration, Instant},
};

use log::{info, warn};

use super::{LinkId, LinkStatus, PeerLink};
use crate::{Config, MembershipId, Timers, TransportId};

/// The viewer's connection to the host's stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// There is no stream to receive.
    #[default]
    Disconnected,
    /// The host is streaming and the link is being set up.
    Connecting,
    /// Media is flowing. Displayed as "ready".
    Streaming,
    /// The host jumped to a new point and the stream is catching up.
    Buffering,
    /// The link failed.
    ///
    /// Left by an explicit re-check, by a call answered from the host's confirmed
    /// identity, or when our own transport session comes back while the host is
    /// streaming. Timers and playback events never leave it.
    Error(String),
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Streaming => "ready",
            Self::Buffering => "buffering",
            Self::Error(_) => "error",
        }
    }
}

impl Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(reason) => write!(f, "error: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Something the transport or signaling channel should do for the viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    /// Accept the incoming call, without sending a stream back.
    Answer { link_id: LinkId },
    /// Close a link, including calls that were declined.
    Close { link_id: LinkId },
    /// Ask the host to dial again, by re-announcing our identity.
    RequestStream,
}

/// Something the viewer's presentation should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerNotice {
    StatusChanged(ConnectionStatus),
    /// Autoplay was blocked, a "click to play" affordance should be shown.
    PlaybackBlocked,
    /// Connecting is taking too long, a manual diagnostic action should be offered.
    DiagnosticAvailable,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ViewerReport {
    pub commands: Vec<ViewerCommand>,
    pub notices: Vec<ViewerNotice>,
}

impl ViewerReport {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.notices.is_empty()
    }
}

/// A call from an identity the host has not announced yet.
#[derive(Debug, Clone)]
struct HeldCall {
    link_id: LinkId,
    from: TransportId,
    host: MembershipId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewerTimer {
    Connecting,
}

/// The viewer side of the link coordinator: zero or one inbound link from the host.
#[derive(Debug, Clone)]
pub struct ViewerLink {
    connecting_timeout: Duration,
    status: ConnectionStatus,
    link: Option<PeerLink>,
    held_call: Option<HeldCall>,
    /// Whether the host announced that it is streaming.
    host_streaming: bool,
    playback_blocked: bool,
    diagnostic_available: bool,
    timers: Timers<ViewerTimer>,
}

impl ViewerLink {
    pub fn new(config: &Config) -> Self {
        Self {
            connecting_timeout: config.connecting_timeout(),
            status: ConnectionStatus::Disconnected,
            link: None,
            held_call: None,
            host_streaming: false,
            playback_blocked: false,
            diagnostic_available: false,
            timers: Timers::new(),
        }
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn link(&self) -> Option<&PeerLink> {
        self.link.as_ref()
    }

    pub fn is_playback_blocked(&self) -> bool {
        self.playback_blocked
    }

    pub fn is_diagnostic_available(&self) -> bool {
        self.diagnostic_available
    }

    pub fn is_host_streaming(&self) -> bool {
        self.host_streaming
    }

    /// The host announced that streaming started or stopped.
    pub fn stream_announced(&mut self, streaming: bool, now: Instant) -> ViewerReport {
        let mut report = ViewerReport::default();
        self.host_streaming = streaming;

        if streaming {
            if self.status == ConnectionStatus::Disconnected {
                self.begin_connecting(now, &mut report);
            }
        } else {
            self.drop_link(&mut report);
            self.set_status(ConnectionStatus::Disconnected, &mut report);
        }

        report
    }

    /// The host is calling.
    ///
    /// Calls are answered when they come from the host's current identity, or when
    /// that identity has not arrived yet, since the host is the only participant
    /// that ever dials. A call from any other identity is held until the host's
    /// next `peer-id` decides it, as the host may have reset its transport session.
    pub fn incoming_call(
        &mut self,
        link_id: LinkId,
        from: TransportId,
        host: Option<(&MembershipId, Option<&TransportId>)>,
        now: Instant,
    ) -> ViewerReport {
        let mut report = ViewerReport::default();

        match host {
            Some((host, Some(expected))) if expected != &from => {
                info!(
                    "Holding call from {}, the host was last seen as {}",
                    from, expected
                );

                self.release_held_call(&mut report);
                self.held_call = Some(HeldCall {
                    link_id,
                    from,
                    host: host.clone(),
                });
            }
            Some((host, _)) => self.answer(link_id, from, host.clone(), now, &mut report),
            None => {
                warn!("Declining call from {}, there is no host", from);
                report.commands.push(ViewerCommand::Close { link_id });
            }
        }

        report
    }

    /// The host announced its transport identity. A held call from it is answered,
    /// any other held call is declined.
    pub fn host_identity_announced(
        &mut self,
        transport_id: &TransportId,
        now: Instant,
    ) -> ViewerReport {
        let mut report = ViewerReport::default();

        match self.held_call.take() {
            Some(call) if &call.from == transport_id => {
                self.answer(call.link_id, call.from, call.host, now, &mut report)
            }
            Some(call) => {
                warn!("Declining call from {}, the host is {}", call.from, transport_id);
                report.commands.push(ViewerCommand::Close {
                    link_id: call.link_id,
                });
            }
            None => {}
        }

        report
    }

    /// The first media arrived on the inbound link.
    pub fn stream_received(&mut self, link_id: LinkId, now: Instant) -> ViewerReport {
        let mut report = ViewerReport::default();

        let Some(link) = self.link.as_mut().filter(|l| l.id == link_id) else {
            return report;
        };

        link.mark_streaming(now);

        self.timers.cancel(&ViewerTimer::Connecting);
        self.diagnostic_available = false;
        self.set_status(ConnectionStatus::Streaming, &mut report);

        report
    }

    /// Media flows again after buffering.
    pub fn media_resumed(&mut self, link_id: LinkId, now: Instant) -> ViewerReport {
        let is_current = self.link.as_ref().is_some_and(|l| l.id == link_id);

        match self.status {
            ConnectionStatus::Buffering | ConnectionStatus::Connecting if is_current => {
                self.stream_received(link_id, now)
            }
            _ => {
                if let Some(link) = self.link.as_mut().filter(|l| l.id == link_id) {
                    link.last_activity_at = now;
                }

                ViewerReport::default()
            }
        }
    }

    /// The host jumped to a new point. The stream will catch up by itself.
    pub fn seek_operation(&mut self) -> ViewerReport {
        let mut report = ViewerReport::default();

        if self.status == ConnectionStatus::Streaming {
            self.set_status(ConnectionStatus::Buffering, &mut report);
        }

        report
    }

    /// Autoplay was refused by the environment. Not an error.
    pub fn playback_blocked(&mut self, link_id: LinkId) -> ViewerReport {
        let mut report = ViewerReport::default();
        let is_current = self.link.as_ref().is_some_and(|l| l.id == link_id);

        if is_current && !self.playback_blocked {
            self.playback_blocked = true;
            report.notices.push(ViewerNotice::PlaybackBlocked);
        }

        report
    }

    /// The user clicked to play.
    pub fn resume_playback(&mut self) {
        self.playback_blocked = false;
    }

    /// The host closed the link.
    pub fn link_closed(&mut self, link_id: LinkId) -> ViewerReport {
        let mut report = ViewerReport::default();

        if self.held_call.as_ref().is_some_and(|c| c.link_id == link_id) {
            self.held_call = None;
        }

        if self.link.as_ref().is_some_and(|l| l.id == link_id) {
            self.link = None;
            self.playback_blocked = false;
            self.timers.clear();
            self.set_status(ConnectionStatus::Disconnected, &mut report);
        }

        report
    }

    /// The inbound link failed.
    pub fn link_error(&mut self, link_id: LinkId, reason: &str) -> ViewerReport {
        let mut report = ViewerReport::default();

        if self.link.as_ref().is_some_and(|l| l.id == link_id) {
            self.fail(reason, &mut report);
        }

        report
    }

    /// The transport session was lost, taking the link with it.
    pub fn transport_lost(&mut self, reason: &str) -> ViewerReport {
        let mut report = ViewerReport::default();

        self.release_held_call(&mut report);

        if self.link.is_some() || self.status != ConnectionStatus::Disconnected {
            self.fail(reason, &mut report);
        }

        report
    }

    /// The transport session is back under a new identity.
    pub fn transport_restored(&mut self, now: Instant) -> ViewerReport {
        let mut report = ViewerReport::default();

        if self.host_streaming && self.link.is_none() {
            self.begin_connecting(now, &mut report);
        }

        report
    }

    /// The user asked to check the connection again.
    pub fn recheck(&mut self, now: Instant) -> ViewerReport {
        let mut report = ViewerReport::default();

        match self.status {
            ConnectionStatus::Streaming | ConnectionStatus::Buffering => return report,
            ConnectionStatus::Disconnected if !self.host_streaming => return report,
            _ => {}
        }

        self.drop_link(&mut report);
        self.begin_connecting(now, &mut report);
        report.commands.push(ViewerCommand::RequestStream);

        report
    }

    pub fn poll_timers(&mut self, now: Instant) -> ViewerReport {
        let mut report = ViewerReport::default();

        for timer in self.timers.expire(now) {
            match timer {
                ViewerTimer::Connecting => {
                    if self.status == ConnectionStatus::Connecting && !self.diagnostic_available {
                        warn!("Still connecting to the host's stream, offering diagnostics");

                        self.diagnostic_available = true;
                        report.notices.push(ViewerNotice::DiagnosticAvailable);
                    }
                }
            }
        }

        report
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn answer(
        &mut self,
        link_id: LinkId,
        from: TransportId,
        host: MembershipId,
        now: Instant,
        report: &mut ViewerReport,
    ) {
        self.release_held_call(report);

        // A new call from the host replaces the previous link.
        if let Some(previous) = self.link.take() {
            report.commands.push(ViewerCommand::Close {
                link_id: previous.id,
            });
        }

        info!("Answering call from {} (link {})", from, link_id);

        self.link = Some(PeerLink::new(link_id, false, host, from, now));
        report.commands.push(ViewerCommand::Answer { link_id });

        if self.status != ConnectionStatus::Connecting {
            self.begin_connecting(now, report);
        }
    }

    fn release_held_call(&mut self, report: &mut ViewerReport) {
        if let Some(call) = self.held_call.take() {
            report.commands.push(ViewerCommand::Close {
                link_id: call.link_id,
            });
        }
    }

    fn begin_connecting(&mut self, now: Instant, report: &mut ViewerReport) {
        self.diagnostic_available = false;
        self.timers
            .arm(ViewerTimer::Connecting, now + self.connecting_timeout);
        self.set_status(ConnectionStatus::Connecting, report);
    }

    fn fail(&mut self, reason: &str, report: &mut ViewerReport) {
        warn!("Stream from the host failed: {}", reason);

        self.release_held_call(report);

        if let Some(mut link) = self.link.take() {
            link.status = LinkStatus::Failed;
            report.commands.push(ViewerCommand::Close { link_id: link.id });
        }

        self.timers.clear();
        self.set_status(ConnectionStatus::Error(reason.to_string()), report);
    }

    fn drop_link(&mut self, report: &mut ViewerReport) {
        self.release_held_call(report);

        if let Some(link) = self.link.take() {
            report.commands.push(ViewerCommand::Close { link_id: link.id });
        }

        self.playback_blocked = false;
        self.timers.clear();
    }

    fn set_status(&mut self, status: ConnectionStatus, report: &mut ViewerReport) {
        if self.status != status {
            self.status = status.clone();
            report.notices.push(ViewerNotice::StatusChanged(status));
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use super::*;

    fn statuses(report: &ViewerReport) -> Vec<ConnectionStatus> {
        report
            .notices
            .iter()
            .filter_map(|n| match n {
                ViewerNotice::StatusChanged(status) => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    fn connected_viewer(now: Instant) -> (ViewerLink, LinkId) {
        let mut viewer = ViewerLink::new(&Config::default());
        let link_id = LinkId::new();
        let host = MembershipId::from("host");
        let host_transport = TransportId::from("t1");

        viewer.stream_announced(true, now);
        viewer.incoming_call(link_id, "t1".into(), Some((&host, Some(&host_transport))), now);
        viewer.stream_received(link_id, now);

        (viewer, link_id)
    }

    #[test]
    fn test_connect_lifecycle() {
        let now = Instant::now();
        let mut viewer = ViewerLink::new(&Config::default());
        let host = MembershipId::from("host");
        let host_transport = TransportId::from("t1");
        let link_id = LinkId::new();

        let report = viewer.stream_announced(true, now);
        assert_eq!(statuses(&report), vec![ConnectionStatus::Connecting]);

        let report =
            viewer.incoming_call(link_id, "t1".into(), Some((&host, Some(&host_transport))), now);
        assert_eq!(report.commands, vec![ViewerCommand::Answer { link_id }]);
        assert!(statuses(&report).is_empty(), "already connecting");

        let report = viewer.stream_received(link_id, now);
        assert_eq!(statuses(&report), vec![ConnectionStatus::Streaming]);
        assert_eq!(viewer.status().label(), "ready");
        assert!(viewer.next_deadline().is_none(), "timeout was canceled");
    }

    #[test]
    fn test_declines_calls_from_others() {
        let now = Instant::now();
        let mut viewer = ViewerLink::new(&Config::default());
        let host = MembershipId::from("host");
        let host_transport = TransportId::from("t1");
        let link_id = LinkId::new();

        let report = viewer.incoming_call(
            link_id,
            "intruder".into(),
            Some((&host, Some(&host_transport))),
            now,
        );

        assert!(report.is_empty(), "the call waits for the host's identity");
        assert!(viewer.link().is_none());

        let report = viewer.host_identity_announced(&host_transport, now);
        assert_eq!(report.commands, vec![ViewerCommand::Close { link_id }]);
        assert!(viewer.link().is_none());

        let report = viewer.incoming_call(link_id, "t1".into(), None, now);
        assert_eq!(report.commands, vec![ViewerCommand::Close { link_id }], "no host");
    }

    #[test]
    fn test_answers_held_call_once_host_identity_arrives() {
        let now = Instant::now();
        let (mut viewer, link_id) = connected_viewer(now);
        let host = MembershipId::from("host");
        let old_transport = TransportId::from("t1");
        let new_transport = TransportId::from("t2");

        let report = viewer.transport_lost("network changed");
        assert_eq!(report.commands, vec![ViewerCommand::Close { link_id }]);
        assert!(matches!(viewer.status(), ConnectionStatus::Error(_)));

        let redial = LinkId::new();
        let report = viewer.incoming_call(
            redial,
            new_transport.clone(),
            Some((&host, Some(&old_transport))),
            now,
        );
        assert!(report.is_empty());

        let report = viewer.host_identity_announced(&new_transport, now);
        assert_eq!(report.commands, vec![ViewerCommand::Answer { link_id: redial }]);
        assert_eq!(statuses(&report), vec![ConnectionStatus::Connecting]);
        assert_eq!(viewer.link().map(|l| l.transport_id.clone()), Some(new_transport.clone()));

        let report = viewer.stream_received(redial, now);
        assert_eq!(statuses(&report), vec![ConnectionStatus::Streaming]);

        assert!(
            viewer.host_identity_announced(&new_transport, now).is_empty(),
            "nothing is held anymore"
        );
    }

    #[test]
    fn test_held_call_is_released_when_closed() {
        let now = Instant::now();
        let mut viewer = ViewerLink::new(&Config::default());
        let host = MembershipId::from("host");
        let old_transport = TransportId::from("t1");
        let link_id = LinkId::new();

        viewer.stream_announced(true, now);
        viewer.incoming_call(link_id, "t2".into(), Some((&host, Some(&old_transport))), now);

        assert!(viewer.link_closed(link_id).is_empty());
        assert!(viewer.host_identity_announced(&"t2".into(), now).is_empty());
        assert!(viewer.link().is_none());
    }

    #[test]
    fn test_accepts_host_without_known_identity() {
        let now = Instant::now();
        let mut viewer = ViewerLink::new(&Config::default());
        let host = MembershipId::from("host");
        let link_id = LinkId::new();

        let report = viewer.incoming_call(link_id, "t1".into(), Some((&host, None)), now);

        assert_eq!(report.commands, vec![ViewerCommand::Answer { link_id }]);
        assert_eq!(viewer.status(), &ConnectionStatus::Connecting);
    }

    #[test]
    fn test_seek_buffers_until_media_resumes() {
        let now = Instant::now();
        let (mut viewer, link_id) = connected_viewer(now);

        let report = viewer.seek_operation();
        assert_eq!(statuses(&report), vec![ConnectionStatus::Buffering]);

        let report = viewer.media_resumed(link_id, now + Duration::from_secs(1));
        assert_eq!(statuses(&report), vec![ConnectionStatus::Streaming]);
    }

    #[test]
    fn test_connecting_timeout_offers_diagnostics() {
        let now = Instant::now();
        let mut viewer = ViewerLink::new(&Config::default());

        viewer.stream_announced(true, now);

        assert!(viewer.poll_timers(now + Duration::from_secs(14)).is_empty());

        let report = viewer.poll_timers(now + Duration::from_secs(15));
        assert_eq!(report.notices, vec![ViewerNotice::DiagnosticAvailable]);
        assert_eq!(viewer.status(), &ConnectionStatus::Connecting, "not failed");
        assert!(viewer.is_diagnostic_available());
    }

    #[test]
    fn test_error_needs_recheck() {
        let now = Instant::now();
        let (mut viewer, link_id) = connected_viewer(now);

        let report = viewer.link_error(link_id, "ice failed");
        assert_eq!(report.commands, vec![ViewerCommand::Close { link_id }]);
        assert!(matches!(viewer.status(), ConnectionStatus::Error(_)));

        // Nothing automatic happens.
        assert!(viewer.poll_timers(now + Duration::from_secs(60)).is_empty());
        assert!(viewer.seek_operation().is_empty());

        let report = viewer.recheck(now + Duration::from_secs(61));
        assert_eq!(statuses(&report), vec![ConnectionStatus::Connecting]);
        assert!(report.commands.contains(&ViewerCommand::RequestStream));
    }

    #[test]
    fn test_error_is_left_by_host_redial() {
        let now = Instant::now();
        let (mut viewer, link_id) = connected_viewer(now);
        let host = MembershipId::from("host");
        let host_transport = TransportId::from("t1");

        viewer.link_error(link_id, "ice failed");
        assert!(matches!(viewer.status(), ConnectionStatus::Error(_)));

        // A call from someone else does not leave the error.
        let report = viewer.incoming_call(
            LinkId::new(),
            "intruder".into(),
            Some((&host, Some(&host_transport))),
            now,
        );
        assert!(statuses(&report).is_empty());
        assert!(matches!(viewer.status(), ConnectionStatus::Error(_)));

        let redial = LinkId::new();
        let report =
            viewer.incoming_call(redial, "t1".into(), Some((&host, Some(&host_transport))), now);

        assert_eq!(report.commands.last(), Some(&ViewerCommand::Answer { link_id: redial }));
        assert_eq!(statuses(&report), vec![ConnectionStatus::Connecting]);
    }

    #[test]
    fn test_playback_blocked_is_not_an_error() {
        let now = Instant::now();
        let (mut viewer, link_id) = connected_viewer(now);

        let report = viewer.playback_blocked(link_id);
        assert_eq!(report.notices, vec![ViewerNotice::PlaybackBlocked]);
        assert_eq!(viewer.status(), &ConnectionStatus::Streaming);
        assert!(viewer.is_playback_blocked());

        viewer.resume_playback();
        assert!(!viewer.is_playback_blocked());
    }

    #[test]
    fn test_stream_stopped() {
        let now = Instant::now();
        let (mut viewer, link_id) = connected_viewer(now);

        let report = viewer.stream_announced(false, now);

        assert_eq!(report.commands, vec![ViewerCommand::Close { link_id }]);
        assert_eq!(statuses(&report), vec![ConnectionStatus::Disconnected]);
        assert!(viewer.link().is_none());
    }

    #[test]
    fn test_transport_loss_and_restore() {
        let now = Instant::now();
        let (mut viewer, _) = connected_viewer(now);

        viewer.transport_lost("network changed");
        assert!(matches!(viewer.status(), ConnectionStatus::Error(_)));

        let report = viewer.transport_restored(now);
        assert_eq!(statuses(&report), vec![ConnectionStatus::Connecting]);
    }
}
