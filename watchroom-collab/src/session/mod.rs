mod error;
mod intent;
mod role;
mod view;

#[cfg(test)]
mod scenarios;

use std::{collections::VecDeque, time::Instant};

use chrono::Utc;
use log::{debug, info, warn};
use watchroom_core::{
    earliest, Config, IdentityMapper, Introspect, LinkCommand, LinkId, LinkNotice, LinkReport,
    MediaSource, MembershipId, MembershipRegistry, PeerTransport, Registration, Role,
    SessionStatus, SyncOutput, Timers, TransportEvent, TransportId, TransportSession,
    ViewerCommand, ViewerNotice, ViewerReport,
};

use crate::{
    ChatLog, ChatMessage, EventSender, HeartbeatPayload, JoinRoomPayload, MembershipPayload,
    PeerIdPayload, RoomEvent, RoomId, SeekPayload, SignalMessage, SignalingChannel,
    StreamingPayload, VideoStatePayload,
};

pub use error::*;
pub use intent::*;
pub use role::*;
pub use view::*;

/// Who the local participant is, and where it wants to be.
#[derive(Debug, Clone)]
pub struct LocalParticipant {
    pub room_id: RoomId,
    pub membership_id: MembershipId,
    pub display_name: String,
    /// The requested role. The relay may demote a host claim.
    pub role: Role,
}

impl LocalParticipant {
    fn validate(&self) -> Result<(), SessionError> {
        if self.membership_id.as_str().trim().is_empty() {
            return Err(SessionError::MissingParticipantId);
        }

        if self.display_name.trim().is_empty() {
            return Err(SessionError::MissingDisplayName);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTimer {
    Heartbeat,
    Resync,
}

/// The room synchronization core of one participant.
///
/// Everything that happens to the participant goes through one of the `handle_*`
/// functions or [RoomSession::tick], on a single thread of control. Failures of
/// links, the transport or signaling never escape, they become state and [RoomEvent]s.
pub struct RoomSession<S, T> {
    config: Config,
    local: LocalParticipant,
    signaling: S,
    transport: T,
    events: EventSender,

    registry: MembershipRegistry,
    mapper: IdentityMapper,
    chat: ChatLog,
    transport_session: TransportSession,
    role: RoleState,

    joined: bool,
    timers: Timers<SessionTimer>,
}

impl<S, T> RoomSession<S, T>
where
    S: SignalingChannel,
    T: PeerTransport,
{
    pub fn new(
        config: Config,
        local: LocalParticipant,
        signaling: S,
        transport: T,
        events: EventSender,
    ) -> Self {
        Self {
            role: RoleState::new(local.role, &config),
            transport_session: TransportSession::new(&config),
            config,
            local,
            signaling,
            transport,
            events,
            registry: MembershipRegistry::new(),
            mapper: IdentityMapper::new(),
            chat: ChatLog::new(),
            joined: false,
            timers: Timers::new(),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.local.room_id
    }

    pub fn membership_id(&self) -> &MembershipId {
        &self.local.membership_id
    }

    pub fn role(&self) -> Role {
        self.role.role()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport identity a member was last seen with.
    pub fn identity_of(&self, membership_id: &MembershipId) -> Option<&TransportId> {
        self.mapper.resolve(membership_id)
    }

    /// Announces the participant to the room and starts the transport session.
    pub fn join(&mut self, now: Instant) -> Result<(), SessionError> {
        self.local.validate()?;
        self.signaling.send(self.join_message())?;

        info!(
            "Joining room {} as {} ({})",
            self.local.room_id, self.local.display_name, self.local.role
        );

        self.joined = true;
        self.timers.arm(
            SessionTimer::Heartbeat,
            now + self.config.heartbeat_interval(),
        );

        if self.transport_session.begin() {
            self.open_transport(now);
        }

        Ok(())
    }

    /// The signaling channel reconnected. Membership and identity are announced again.
    pub fn signaling_reconnected(&mut self, now: Instant) {
        if !self.joined {
            return;
        }

        info!("Signaling reconnected, rejoining room {}", self.local.room_id);

        self.send(self.join_message());
        self.announce_identity();

        if let RoleState::Host(host) = &mut self.role {
            let state = host.sync.as_mut().map(|s| s.announce(now));

            self.announce_streaming();

            if let Some(state) = state {
                self.broadcast_sync(vec![SyncOutput::StateUpdate(state)]);
            }
        }
    }

    /// Dispatches a control event from the signaling channel.
    pub fn handle_signal(&mut self, message: SignalMessage, now: Instant) {
        if let Some(room_id) = message.room_id() {
            if room_id != &self.local.room_id {
                debug!("Ignoring {} for room {}", message.name(), room_id);
                return;
            }
        }

        match message {
            SignalMessage::UserJoined(payload) => self.on_user_joined(payload, now),
            SignalMessage::UserLeft(payload) => self.on_user_left(payload, now),
            SignalMessage::NewMessage(payload) => {
                let sent_at = payload.sent_at.unwrap_or_else(Utc::now);
                self.push_chat(ChatMessage::user(payload.author, payload.text, sent_at));
            }
            SignalMessage::PeerId(payload) => self.on_peer_id(payload, now),
            SignalMessage::VideoStateChange(payload) => self.on_video_state(payload, now),
            SignalMessage::VideoSeekOperation(payload) => {
                if let RoleState::Viewer(viewer) = &mut self.role {
                    debug!("Host jumped to {}s", payload.position_seconds);

                    let report = viewer.link.seek_operation();
                    self.apply_viewer_report(report);
                }
            }
            SignalMessage::StreamingStatus(payload) => self.on_streaming_status(payload, now),
            other => debug!("Ignoring outbound {} message", other.name()),
        }
    }

    /// Dispatches an event from the peer media transport.
    pub fn handle_transport(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::SessionOpened { transport_id } => {
                self.on_session_opened(transport_id, now)
            }
            TransportEvent::SessionLost { reason } => self.on_session_lost(&reason, now),
            TransportEvent::IncomingCall { link_id, from } => {
                self.on_incoming_call(link_id, from, now)
            }
            TransportEvent::StreamReceived { link_id } => match &mut self.role {
                RoleState::Host(host) => {
                    let report = host.links.on_stream_received(link_id, now);
                    self.apply_link_report(report);
                }
                RoleState::Viewer(viewer) => {
                    let report = viewer.link.stream_received(link_id, now);
                    self.apply_viewer_report(report);
                }
            },
            TransportEvent::MediaResumed { link_id } => match &mut self.role {
                RoleState::Host(host) => {
                    let report = host.links.on_activity(link_id, now);
                    self.apply_link_report(report);
                }
                RoleState::Viewer(viewer) => {
                    let report = viewer.link.media_resumed(link_id, now);
                    self.apply_viewer_report(report);
                }
            },
            TransportEvent::LinkClosed { link_id } => match &mut self.role {
                RoleState::Host(host) => {
                    let report = host.links.on_remote_closed(link_id);
                    self.apply_link_report(report);
                }
                RoleState::Viewer(viewer) => {
                    let report = viewer.link.link_closed(link_id);
                    self.apply_viewer_report(report);
                }
            },
            TransportEvent::LinkError { link_id, reason } => match &mut self.role {
                RoleState::Host(host) => {
                    let report = host.links.on_link_error(link_id, &reason);
                    self.apply_link_report(report);
                }
                RoleState::Viewer(viewer) => {
                    let report = viewer.link.link_error(link_id, &reason);
                    self.apply_viewer_report(report);
                }
            },
            TransportEvent::PlaybackBlocked { link_id } => {
                if let RoleState::Viewer(viewer) = &mut self.role {
                    let report = viewer.link.playback_blocked(link_id);
                    self.apply_viewer_report(report);
                }
            }
        }
    }

    /// Handles every timer that is due.
    pub fn tick(&mut self, now: Instant) {
        for timer in self.timers.expire(now) {
            match timer {
                SessionTimer::Heartbeat => {
                    self.send(SignalMessage::Heartbeat(HeartbeatPayload {
                        room_id: self.local.room_id.clone(),
                        timestamp: Utc::now(),
                    }));

                    self.timers.arm(
                        SessionTimer::Heartbeat,
                        now + self.config.heartbeat_interval(),
                    );
                }
                SessionTimer::Resync => self.resync(now),
            }
        }

        if self.transport_session.poll_timers(now) {
            self.open_transport(now);
        }

        match &mut self.role {
            RoleState::Host(host) => {
                let report = host.links.poll_timers(now);
                self.apply_link_report(report);
            }
            RoleState::Viewer(viewer) => {
                let syncing_cleared = viewer.sync.poll_timers(now);
                let report = viewer.link.poll_timers(now);

                if syncing_cleared {
                    self.emit(RoomEvent::SyncingChanged { syncing: false });
                }

                self.apply_viewer_report(report);
            }
        }
    }

    /// When [RoomSession::tick] should be called next.
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.timers.next_deadline(),
            self.transport_session.next_deadline(),
            self.role.next_deadline(),
        ])
    }

    /// Takes a snapshot of the room for rendering.
    pub fn view(&self, now: Instant) -> RoomView {
        let mut view = RoomView {
            room_id: self.local.room_id.clone(),
            membership_id: self.local.membership_id.clone(),
            role: self.role.role(),
            roster: self.registry.roster(),
            chat: self.chat.messages().to_vec(),
            transport: self.transport_session.status().clone(),
            streaming: false,
            media_label: None,
            playback: None,
            position_seconds: None,
            syncing: false,
            connection: None,
            playback_blocked: false,
            diagnostic_available: false,
            links: vec![],
        };

        match &self.role {
            RoleState::Host(host) => {
                let playback = host.sync.as_ref().map(|s| s.authoritative());

                view.streaming = host.links.is_streaming();
                view.media_label = host.links.source().map(|s| s.label());
                view.playback = playback;
                view.position_seconds = playback.map(|p| p.position_at(now));
                view.links = host.links.links();
            }
            RoleState::Viewer(viewer) => {
                view.streaming = viewer.link.is_host_streaming();
                view.media_label = viewer.media_label.clone();
                view.playback = viewer.sync.shadow();
                view.position_seconds = viewer.sync.extrapolated_position(now);
                view.syncing = viewer.sync.is_syncing();
                view.connection = Some(viewer.link.status().clone());
                view.playback_blocked = viewer.link.is_playback_blocked();
                view.diagnostic_available = viewer.link.is_diagnostic_available();
            }
        }

        view
    }

    fn on_user_joined(&mut self, payload: MembershipPayload, now: Instant) {
        let changed = payload.changed_participant;

        self.registry.reconcile(&payload.roster);
        self.forget_departed();

        self.emit(RoomEvent::RosterUpdated {
            roster: self.registry.roster(),
        });
        self.push_chat(ChatMessage::joined(&changed.display_name));

        if changed.membership_id == self.local.membership_id {
            self.sync_role();
            return;
        }

        if self.role.is_host() {
            // Late joiners learn the host's identity and the stream state.
            self.announce_identity();
            self.announce_streaming();

            if let Some(transport_id) = self.mapper.resolve(&changed.membership_id).cloned() {
                self.connect_viewers(vec![(changed.membership_id, transport_id)], now);
            }
        }
    }

    fn on_user_left(&mut self, payload: MembershipPayload, now: Instant) {
        let changed = payload.changed_participant;
        let was_host = self
            .registry
            .host()
            .is_some_and(|h| h.membership_id == changed.membership_id);

        self.registry.reconcile(&payload.roster);
        self.mapper.forget(&changed.membership_id);
        self.forget_departed();

        self.emit(RoomEvent::RosterUpdated {
            roster: self.registry.roster(),
        });
        self.push_chat(ChatMessage::left(&changed.display_name));

        if was_host {
            if let RoleState::Viewer(viewer) = &mut self.role {
                info!("The host left, the stream is over");

                viewer.sync.reset();
                viewer.media_label = None;

                let report = viewer.link.stream_announced(false, now);

                self.apply_viewer_report(report);
                self.emit(RoomEvent::StreamingChanged {
                    streaming: false,
                    media_label: None,
                });
            }
        }
    }

    fn on_peer_id(&mut self, payload: PeerIdPayload, now: Instant) {
        let remote = payload.participant_id;

        if remote == self.local.membership_id {
            return;
        }

        let registration = self
            .mapper
            .register(remote.clone(), payload.transport_id.clone());

        let host = match &mut self.role {
            RoleState::Host(host) => host,
            RoleState::Viewer(viewer) => {
                debug!("{} is reachable as {}", remote, payload.transport_id);

                let is_host = self
                    .registry
                    .host()
                    .is_some_and(|h| h.membership_id == remote);

                if is_host {
                    let report = viewer
                        .link
                        .host_identity_announced(&payload.transport_id, now);
                    self.apply_viewer_report(report);
                }

                return;
            }
        };

        if payload.role.is_host() {
            warn!("{} announced itself as a host, not dialing", remote);
            return;
        }

        let mut report = LinkReport::default();

        if let Registration::Replaced { previous } = &registration {
            report.merge(host.links.identity_replaced(&remote, previous));
        }

        report.merge(host.links.connect(remote, payload.transport_id, now));
        self.apply_link_report(report);
    }

    fn on_video_state(&mut self, payload: VideoStatePayload, now: Instant) {
        let RoleState::Viewer(viewer) = &mut self.role else {
            debug!("Ignoring a playback update as the host");
            return;
        };

        let was_syncing = viewer.sync.is_syncing();
        let state = viewer
            .sync
            .apply_update(payload.is_playing, payload.position_seconds, now);

        self.emit(RoomEvent::PlaybackUpdated { state });

        if !was_syncing {
            self.emit(RoomEvent::SyncingChanged { syncing: true });
        }
    }

    fn on_streaming_status(&mut self, payload: StreamingPayload, now: Instant) {
        let RoleState::Viewer(viewer) = &mut self.role else {
            return;
        };

        viewer.media_label = payload.media_label.clone();

        let report = viewer.link.stream_announced(payload.streaming, now);

        self.emit(RoomEvent::StreamingChanged {
            streaming: payload.streaming,
            media_label: payload.media_label,
        });
        self.apply_viewer_report(report);
    }

    fn on_session_opened(&mut self, transport_id: TransportId, now: Instant) {
        self.transport_session.opened(transport_id);
        self.emit_transport_status();
        self.announce_identity();

        if self.role.is_host() {
            let targets = self.known_viewers();
            self.connect_viewers(targets, now);
        } else if let RoleState::Viewer(viewer) = &mut self.role {
            let report = viewer.link.transport_restored(now);
            self.apply_viewer_report(report);
        }
    }

    fn on_session_lost(&mut self, reason: &str, now: Instant) {
        self.transport_session.lost(reason, now);
        self.emit_transport_status();

        match &mut self.role {
            RoleState::Host(host) => {
                debug!("Links before the reset: {:?}", host.links.introspect());

                let report = host.links.invalidate_all();
                self.apply_link_report(report);
            }
            RoleState::Viewer(viewer) => {
                let report = viewer.link.transport_lost(reason);
                self.apply_viewer_report(report);
            }
        }
    }

    fn on_incoming_call(&mut self, link_id: LinkId, from: TransportId, now: Instant) {
        match &mut self.role {
            RoleState::Host(_) => {
                warn!("Declining call {} from {}, the host only sends", link_id, from);
                self.transport.close(link_id);
            }
            RoleState::Viewer(viewer) => {
                let host = self
                    .registry
                    .host()
                    .map(|h| (&h.membership_id, self.mapper.resolve(&h.membership_id)));

                let report = viewer.link.incoming_call(link_id, from, host, now);
                self.apply_viewer_report(report);
            }
        }
    }

    /// Switches role if the relay demoted our host claim.
    fn sync_role(&mut self) {
        let Some(role) = self
            .registry
            .get(&self.local.membership_id)
            .map(|p| p.role)
        else {
            return;
        };

        if role == self.role.role() {
            return;
        }

        warn!("Joined room {} as {} instead of {}", self.local.room_id, role, self.role.role());

        self.role = RoleState::new(role, &self.config);
        self.timers.cancel(&SessionTimer::Resync);

        self.emit(RoomEvent::RoleChanged { role });
        self.announce_identity();
    }

    /// Drops identities and links of members that are no longer in the roster.
    fn forget_departed(&mut self) {
        let mut departed: Vec<_> = self
            .mapper
            .membership_ids()
            .into_iter()
            .filter(|id| !self.registry.contains(id))
            .collect();

        for id in &departed {
            self.mapper.forget(id);
        }

        let RoleState::Host(host) = &mut self.role else {
            return;
        };

        departed.extend(
            host.links
                .links()
                .into_iter()
                .map(|l| l.remote)
                .filter(|id| !self.registry.contains(id)),
        );
        departed.sort();
        departed.dedup();

        let mut report = LinkReport::default();

        for id in departed {
            report.merge(host.links.remove_member(&id));
        }

        self.apply_link_report(report);
    }

    fn known_viewers(&self) -> Vec<(MembershipId, TransportId)> {
        self.registry
            .viewers()
            .filter(|p| p.membership_id != self.local.membership_id)
            .filter_map(|p| {
                self.mapper
                    .resolve(&p.membership_id)
                    .map(|t| (p.membership_id.clone(), t.clone()))
            })
            .collect()
    }

    fn connect_viewers(&mut self, targets: Vec<(MembershipId, TransportId)>, now: Instant) {
        let RoleState::Host(host) = &mut self.role else {
            return;
        };

        let mut report = LinkReport::default();

        for (remote, transport_id) in targets {
            report.merge(host.links.connect(remote, transport_id, now));
        }

        self.apply_link_report(report);
    }

    fn resync(&mut self, now: Instant) {
        let RoleState::Host(host) = &mut self.role else {
            return;
        };

        let (Some(source), Some(sync)) = (host.links.source(), host.sync.as_mut()) else {
            return;
        };

        let outputs = sync.tick(source.position(), source.is_playing(), now);

        self.timers
            .arm(SessionTimer::Resync, now + self.config.resync_interval());
        self.broadcast_sync(outputs);
    }

    fn open_transport(&mut self, now: Instant) {
        self.emit_transport_status();

        if let Err(e) = self.transport.open() {
            self.transport_session.open_failed(&e.to_string(), now);
            self.emit_transport_status();
        }
    }

    fn apply_link_report(&mut self, report: LinkReport) {
        let mut pending = VecDeque::from([report]);

        while let Some(report) = pending.pop_front() {
            for command in report.commands {
                match command {
                    LinkCommand::Call { link_id, remote } => {
                        let RoleState::Host(host) = &mut self.role else {
                            continue;
                        };

                        let Some(source) = host.links.source().cloned() else {
                            continue;
                        };

                        if let Err(e) = self.transport.call(link_id, &remote, &source) {
                            pending.push_back(host.links.on_link_error(link_id, &e.to_string()));
                        }
                    }
                    LinkCommand::Close { link_id } => self.transport.close(link_id),
                }
            }

            for notice in report.notices {
                match notice {
                    LinkNotice::StatusChanged { remote, status, .. } => {
                        self.emit(RoomEvent::LinkStatusChanged { remote, status })
                    }
                    LinkNotice::TimedOut { remote } => {
                        let name = self.registry.display_name(&remote);
                        self.push_chat(ChatMessage::system(format!(
                            "Connection to {} timed out",
                            name
                        )));
                    }
                    LinkNotice::Failed { remote, reason } => {
                        debug!("Link to {} failed: {}", remote, reason);
                    }
                    LinkNotice::AttemptsExhausted { remote } => {
                        let name = self.registry.display_name(&remote);
                        self.push_chat(ChatMessage::system(format!(
                            "Could not connect to {}",
                            name
                        )));
                    }
                }
            }
        }
    }

    fn apply_viewer_report(&mut self, report: ViewerReport) {
        let mut pending = VecDeque::from([report]);

        while let Some(report) = pending.pop_front() {
            for command in report.commands {
                match command {
                    ViewerCommand::Answer { link_id } => {
                        if let Err(e) = self.transport.answer(link_id) {
                            if let RoleState::Viewer(viewer) = &mut self.role {
                                pending.push_back(viewer.link.link_error(link_id, &e.to_string()));
                            }
                        }
                    }
                    ViewerCommand::Close { link_id } => self.transport.close(link_id),
                    ViewerCommand::RequestStream => self.announce_identity(),
                }
            }

            for notice in report.notices {
                self.emit(match notice {
                    ViewerNotice::StatusChanged(status) => {
                        RoomEvent::ConnectionStatusChanged { status }
                    }
                    ViewerNotice::PlaybackBlocked => RoomEvent::PlaybackBlocked,
                    ViewerNotice::DiagnosticAvailable => RoomEvent::DiagnosticAvailable,
                });
            }
        }
    }

    /// Sends the outputs of the host's sync engine.
    fn broadcast_sync(&mut self, outputs: Vec<SyncOutput>) {
        for output in outputs {
            match output {
                SyncOutput::StateUpdate(state) => {
                    self.send(SignalMessage::VideoStateChange(VideoStatePayload {
                        room_id: self.local.room_id.clone(),
                        is_playing: state.is_playing,
                        position_seconds: state.position_seconds,
                    }));
                    self.emit(RoomEvent::PlaybackUpdated { state });
                }
                SyncOutput::SeekOperation { position_seconds } => {
                    self.send(SignalMessage::VideoSeekOperation(SeekPayload {
                        room_id: self.local.room_id.clone(),
                        position_seconds,
                    }));
                }
            }
        }
    }

    /// Tells the room which transport identity reaches us.
    fn announce_identity(&self) {
        if !self.joined {
            return;
        }

        let Some(transport_id) = self.transport_session.transport_id() else {
            return;
        };

        self.send(SignalMessage::PeerId(PeerIdPayload {
            room_id: self.local.room_id.clone(),
            transport_id: transport_id.clone(),
            role: self.role.role(),
            participant_id: self.local.membership_id.clone(),
        }));
    }

    /// Tells the room whether the host is streaming. Host only.
    fn announce_streaming(&self) {
        let RoleState::Host(host) = &self.role else {
            return;
        };

        if !self.joined {
            return;
        }

        self.send(SignalMessage::StreamingStatusUpdate(StreamingPayload {
            room_id: self.local.room_id.clone(),
            streaming: host.links.is_streaming(),
            media_label: host.links.source().map(|s| s.label()),
        }));
    }

    fn join_message(&self) -> SignalMessage {
        SignalMessage::JoinRoom(JoinRoomPayload {
            room_id: self.local.room_id.clone(),
            participant_id: self.local.membership_id.clone(),
            display_name: self.local.display_name.clone(),
            role: self.local.role,
        })
    }

    fn emit_transport_status(&mut self) {
        let status = self.transport_session.status().clone();

        if status == SessionStatus::Failed {
            self.push_chat(ChatMessage::system(
                "The media connection could not be restored, reload to try again",
            ));
        }

        self.emit(RoomEvent::TransportStatusChanged { status });
    }

    fn push_chat(&mut self, message: ChatMessage) {
        self.chat.push(message.clone());
        self.emit(RoomEvent::ChatReceived { message });
    }

    fn send(&self, message: SignalMessage) {
        let name = message.name();

        if let Err(e) = self.signaling.send(message) {
            warn!("Could not send {}: {}", name, e);
        }
    }

    fn emit(&self, event: RoomEvent) {
        if self.events.send(event).is_err() {
            debug!("No one is listening for room events");
        }
    }
}
