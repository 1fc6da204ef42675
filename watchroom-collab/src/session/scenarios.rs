//! Whole-room tests: several sessions talking through a relay room and a loopback network.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam::{
    atomic::AtomicCell,
    channel::{unbounded, Receiver, Sender},
};
use watchroom_core::{
    Config, ConnectionStatus, LinkStatus, MediaSource, MembershipId, Role, SessionStatus,
    SharedMediaSource, TransportEvent,
};
use watchroom_impls::{LoopbackNetwork, LoopbackTransport};

use crate::{LocalParticipant, RelayRoom, RoomEvent, RoomSession, SignalMessage, UserIntent};

/// A media source whose position is set by the test.
#[derive(Default)]
struct ScriptedSource {
    position: AtomicCell<f64>,
    playing: AtomicCell<bool>,
}

impl ScriptedSource {
    fn set_position(&self, position: f64) {
        self.position.store(position);
    }
}

impl MediaSource for ScriptedSource {
    fn label(&self) -> String {
        "movie.mp4".to_string()
    }

    fn position(&self) -> f64 {
        self.position.load()
    }

    fn is_playing(&self) -> bool {
        self.playing.load()
    }

    fn play(&self) {
        self.playing.store(true);
    }

    fn pause(&self) {
        self.playing.store(false);
    }

    fn seek(&self, position: f64) {
        self.position.store(position);
    }
}

struct Member {
    session: RoomSession<Sender<SignalMessage>, LoopbackTransport>,
    outbox: Receiver<SignalMessage>,
    transport_events: Receiver<TransportEvent>,
    events: Receiver<RoomEvent>,
}

struct Harness {
    network: Arc<LoopbackNetwork>,
    relay: RelayRoom<usize>,
    members: Vec<Member>,
    /// Every message a member sent, in order.
    sent: Vec<(usize, SignalMessage)>,
}

impl Harness {
    fn new() -> Self {
        Self {
            network: LoopbackNetwork::new(),
            relay: RelayRoom::new("R1".into()),
            members: vec![],
            sent: vec![],
        }
    }

    fn add(&mut self, id: &str, name: &str, role: Role) -> usize {
        let (signal_sender, outbox) = unbounded();
        let (transport_sender, transport_events) = unbounded();
        let (event_sender, events) = unbounded();

        let transport = self.network.transport(move |event| {
            let _ = transport_sender.send(event);
        });

        let session = RoomSession::new(
            Config::default(),
            LocalParticipant {
                room_id: "R1".into(),
                membership_id: id.into(),
                display_name: name.to_string(),
                role,
            },
            signal_sender,
            transport,
            event_sender,
        );

        self.members.push(Member {
            session,
            outbox,
            transport_events,
            events,
        });

        self.members.len() - 1
    }

    fn join(&mut self, index: usize, now: Instant) {
        self.members[index]
            .session
            .join(now)
            .expect("join succeeds");
        self.pump(now);
    }

    fn intent(&mut self, index: usize, intent: UserIntent, now: Instant) {
        self.members[index]
            .session
            .handle_intent(intent, now)
            .expect("intent is accepted");
        self.pump(now);
    }

    fn tick(&mut self, index: usize, now: Instant) {
        self.members[index].session.tick(now);
        self.pump(now);
    }

    /// Delivers signaling messages and transport events until nothing is left.
    fn pump(&mut self, now: Instant) {
        loop {
            let mut progressed = false;

            for index in 0..self.members.len() {
                let outgoing: Vec<_> = self.members[index].outbox.try_iter().collect();

                for message in outgoing {
                    progressed = true;
                    self.sent.push((index, message.clone()));

                    let deliveries = match message {
                        SignalMessage::JoinRoom(payload) => self
                            .relay
                            .join(index, payload, now)
                            .expect("join is accepted"),
                        other => self
                            .relay
                            .relay(&index, other, now)
                            .expect("message is relayed"),
                    };

                    for delivery in deliveries {
                        for to in delivery.to {
                            self.members[to]
                                .session
                                .handle_signal(delivery.message.clone(), now);
                        }
                    }
                }

                let events: Vec<_> = self.members[index].transport_events.try_iter().collect();

                for event in events {
                    progressed = true;
                    self.members[index].session.handle_transport(event, now);
                }
            }

            if !progressed {
                break;
            }
        }
    }

    fn events(&self, index: usize) -> Vec<RoomEvent> {
        self.members[index].events.try_iter().collect()
    }

    fn session(&self, index: usize) -> &RoomSession<Sender<SignalMessage>, LoopbackTransport> {
        &self.members[index].session
    }

    fn take_sent(&mut self) -> Vec<(usize, SignalMessage)> {
        std::mem::take(&mut self.sent)
    }
}

fn connection_statuses(events: &[RoomEvent]) -> Vec<ConnectionStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            RoomEvent::ConnectionStatusChanged { status } => Some(status.clone()),
            _ => None,
        })
        .collect()
}

fn link_statuses(events: &[RoomEvent]) -> Vec<LinkStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            RoomEvent::LinkStatusChanged { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

const HOST: usize = 0;
const VIEWER: usize = 1;

/// A host streaming to one viewer.
fn streaming_room(start: Instant) -> (Harness, Arc<ScriptedSource>) {
    let mut harness = Harness::new();

    harness.add("host", "Alice", Role::Host);
    harness.add("viewer", "Bob", Role::Viewer);

    harness.join(HOST, start);
    harness.join(VIEWER, start);

    let source = Arc::new(ScriptedSource::default());

    harness.intent(
        HOST,
        UserIntent::SelectMedia(SharedMediaSource::from(source.clone())),
        start,
    );
    harness.intent(HOST, UserIntent::StartStream, start);

    (harness, source)
}

#[test]
fn test_host_streams_to_viewer() {
    let start = Instant::now();
    let mut harness = Harness::new();

    harness.add("host", "Alice", Role::Host);
    harness.add("viewer", "Bob", Role::Viewer);

    harness.join(HOST, start);
    harness.join(VIEWER, start);

    let host_transport = harness
        .session(HOST)
        .transport()
        .transport_id()
        .expect("host transport is open");
    let viewer_transport = harness
        .session(VIEWER)
        .transport()
        .transport_id()
        .expect("viewer transport is open");

    let viewer_id = MembershipId::from("viewer");
    let host_id = MembershipId::from("host");

    assert_eq!(harness.session(HOST).identity_of(&viewer_id), Some(&viewer_transport));
    assert_eq!(harness.session(VIEWER).identity_of(&host_id), Some(&host_transport));
    assert_eq!(harness.session(HOST).view(start).roster.len(), 2);

    harness.events(HOST);
    harness.events(VIEWER);

    harness.intent(
        HOST,
        UserIntent::SelectMedia(SharedMediaSource::new(ScriptedSource::default())),
        start,
    );
    harness.intent(HOST, UserIntent::StartStream, start);

    assert_eq!(
        link_statuses(&harness.events(HOST)),
        vec![LinkStatus::Connecting, LinkStatus::Streaming],
        "the link is created connecting and streams on the first frame"
    );

    let host_view = harness.session(HOST).view(start);
    assert_eq!(host_view.links.len(), 1);
    assert_eq!(host_view.links[0].transport_id, viewer_transport);
    assert_eq!(host_view.links[0].status, LinkStatus::Streaming);

    let viewer_events = harness.events(VIEWER);
    assert_eq!(
        connection_statuses(&viewer_events),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Streaming]
    );
    assert!(viewer_events.contains(&RoomEvent::StreamingChanged {
        streaming: true,
        media_label: Some("movie.mp4".to_string())
    }));

    let viewer_view = harness.session(VIEWER).view(start);
    assert_eq!(
        viewer_view.connection.map(|c| c.label()),
        Some("ready"),
        "streaming is displayed as ready"
    );
    assert!(viewer_view.streaming);
}

#[test]
fn test_playback_updates_and_seek() {
    let start = Instant::now();
    let (mut harness, source) = streaming_room(start);

    harness.take_sent();
    harness.events(VIEWER);

    let play_at = start + Duration::from_secs(7);
    source.set_position(42.);
    harness.intent(HOST, UserIntent::Play, play_at);

    // The resync tick comes three seconds later.
    let tick_at = start + Duration::from_secs(10);
    source.set_position(44.9);
    harness.tick(HOST, tick_at);

    let updates: Vec<_> = harness
        .take_sent()
        .into_iter()
        .filter_map(|(from, m)| match m {
            SignalMessage::VideoStateChange(p) if from == HOST => Some(p),
            _ => None,
        })
        .collect();

    assert_eq!(updates.len(), 1, "the second update is suppressed");
    assert!(updates[0].is_playing);
    assert_eq!(updates[0].position_seconds, 42.);

    let shadow = harness
        .session(VIEWER)
        .view(tick_at)
        .playback
        .expect("viewer has a shadow");
    assert_eq!(shadow.position_seconds, 42.);

    let seek_at = start + Duration::from_secs(11);
    harness.intent(HOST, UserIntent::Seek { to: 120. }, seek_at);

    let sent = harness.take_sent();
    assert!(sent.iter().any(|(_, m)| matches!(
        m,
        SignalMessage::VideoStateChange(p) if p.position_seconds == 120.
    )));
    assert!(sent.iter().any(|(_, m)| matches!(
        m,
        SignalMessage::VideoSeekOperation(p) if p.position_seconds == 120.
    )));

    let link_id = harness.session(HOST).view(seek_at).links[0].id;
    harness.members[HOST].session.transport().resume_media(link_id);
    harness.pump(seek_at);

    let statuses = connection_statuses(&harness.events(VIEWER));
    assert_eq!(
        statuses,
        vec![ConnectionStatus::Buffering, ConnectionStatus::Streaming],
        "the viewer buffers until media resumes"
    );
}

#[test]
fn test_viewer_reconnects_with_new_identity() {
    let start = Instant::now();
    let (mut harness, _source) = streaming_room(start);

    let viewer_id = MembershipId::from("viewer");
    let old_transport = harness
        .session(VIEWER)
        .transport()
        .transport_id()
        .expect("viewer transport is open");
    let old_link = harness.session(HOST).view(start).links[0].id;

    harness.events(HOST);
    harness.events(VIEWER);

    harness.members[VIEWER]
        .session
        .transport()
        .drop_session("network changed");

    // The host's transport has not noticed yet.
    harness.members[HOST].transport_events.try_iter().for_each(drop);
    harness.pump(start);

    assert!(matches!(
        harness.session(VIEWER).view(start).connection,
        Some(ConnectionStatus::Error(_))
    ));

    // The transport session is reopened after the backoff.
    let retry_at = start + Duration::from_secs(3);
    harness.tick(VIEWER, retry_at);

    let new_transport = harness
        .session(VIEWER)
        .transport()
        .transport_id()
        .expect("viewer transport reopened");

    assert_ne!(new_transport, old_transport);
    assert_eq!(
        harness.session(HOST).identity_of(&viewer_id),
        Some(&new_transport),
        "the mapper resolves the new identity"
    );

    let host_events = harness.events(HOST);
    assert!(host_events.contains(&RoomEvent::LinkStatusChanged {
        remote: viewer_id.clone(),
        status: LinkStatus::Failed,
    }));

    let links = harness.session(HOST).view(retry_at).links;
    assert_eq!(links.len(), 1);
    assert_ne!(links[0].id, old_link, "the stale link is gone");
    assert_eq!(links[0].transport_id, new_transport, "the stale id is not dialed");
    assert_eq!(links[0].status, LinkStatus::Streaming);

    assert_eq!(
        harness.session(VIEWER).view(retry_at).connection,
        Some(ConnectionStatus::Streaming)
    );
}

#[test]
fn test_late_joiner_receives_stream() {
    let start = Instant::now();
    let (mut harness, _source) = streaming_room(start);

    let late = harness.add("late", "Carol", Role::Viewer);
    harness.join(late, start);

    let view = harness.session(late).view(start);

    assert!(view.streaming, "the host re-announces the stream");
    assert_eq!(view.connection, Some(ConnectionStatus::Streaming));
    assert_eq!(harness.session(HOST).view(start).links.len(), 2);
}

#[test]
fn test_second_host_is_demoted() {
    let start = Instant::now();
    let mut harness = Harness::new();

    harness.add("host", "Alice", Role::Host);
    let other = harness.add("other", "Carol", Role::Host);

    harness.join(HOST, start);
    harness.join(other, start);

    assert_eq!(harness.session(other).role(), Role::Viewer);
    assert!(harness
        .events(other)
        .contains(&RoomEvent::RoleChanged { role: Role::Viewer }));
    assert_eq!(harness.session(HOST).role(), Role::Host);
}

#[test]
fn test_chat_and_membership_messages() {
    let start = Instant::now();
    let (mut harness, _source) = streaming_room(start);

    harness.intent(
        VIEWER,
        UserIntent::SendChat {
            text: "hello".to_string(),
        },
        start,
    );

    for index in [HOST, VIEWER] {
        let chat = harness.session(index).view(start).chat;
        let last = chat.last().expect("chat has messages");

        assert_eq!(last.text, "hello");
        assert_eq!(last.author, "Bob");
        assert!(!last.is_system);
    }

    let host_chat = harness.session(HOST).view(start).chat;
    assert!(host_chat
        .iter()
        .any(|m| m.is_system && m.text == "Bob has joined the room"));

    let deliveries = harness.relay.disconnect(&HOST);
    for delivery in deliveries {
        for to in delivery.to {
            harness.members[to]
                .session
                .handle_signal(delivery.message.clone(), start);
        }
    }
    harness.pump(start);

    let view = harness.session(VIEWER).view(start);
    assert!(view
        .chat
        .iter()
        .any(|m| m.is_system && m.text == "Alice has left the room"));
    assert!(!view.streaming, "the stream ends with the host");
    assert_eq!(view.connection, Some(ConnectionStatus::Disconnected));
    assert_eq!(view.roster.len(), 1);
}

#[test]
fn test_link_timeout_is_reported_once() {
    let start = Instant::now();
    let mut harness = Harness::new();

    harness.add("host", "Alice", Role::Host);
    harness.add("viewer", "Bob", Role::Viewer);

    harness.join(HOST, start);
    harness.join(VIEWER, start);

    // The viewer never answers.
    harness.intent(
        HOST,
        UserIntent::SelectMedia(SharedMediaSource::new(ScriptedSource::default())),
        start,
    );
    harness.members[HOST]
        .session
        .handle_intent(UserIntent::StartStream, start)
        .expect("stream starts");
    harness.members[VIEWER].transport_events.try_iter().for_each(drop);
    harness.events(HOST);

    let timeout_at = start + Duration::from_secs(30);
    harness.tick(HOST, timeout_at);
    harness.tick(HOST, timeout_at + Duration::from_secs(1));

    let events = harness.events(HOST);
    let timeouts = events
        .iter()
        .filter(|e| matches!(e, RoomEvent::ChatReceived { message } if message.text.contains("timed out")))
        .count();

    assert_eq!(timeouts, 1, "the timeout is reported exactly once");
    assert!(harness.session(HOST).view(timeout_at).links.is_empty());
}

#[test]
fn test_host_redials_after_transport_loss() {
    let start = Instant::now();
    let (mut harness, _source) = streaming_room(start);

    let host_id = MembershipId::from("host");
    let viewer_transport = harness
        .session(VIEWER)
        .transport()
        .transport_id()
        .expect("viewer transport is open");

    harness.members[HOST]
        .session
        .transport()
        .drop_session("network changed");
    harness.pump(start);

    assert!(matches!(
        harness.session(VIEWER).view(start).connection,
        Some(ConnectionStatus::Error(_))
    ));
    assert!(harness.session(HOST).view(start).links.is_empty());

    harness.events(VIEWER);

    // The host calls from its new identity before its peer-id reaches the viewer.
    let retry_at = start + Duration::from_secs(3);
    harness.tick(HOST, retry_at);

    let host_transport = harness
        .session(HOST)
        .transport()
        .transport_id()
        .expect("host transport reopened");

    assert_eq!(
        harness.session(VIEWER).identity_of(&host_id),
        Some(&host_transport)
    );

    let links = harness.session(HOST).view(retry_at).links;
    assert_eq!(links.len(), 1, "the viewer is dialed again");
    assert_eq!(links[0].transport_id, viewer_transport);
    assert_eq!(links[0].status, LinkStatus::Streaming);

    assert_eq!(
        connection_statuses(&harness.events(VIEWER)),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Streaming]
    );
    assert_eq!(harness.network.link_count(), 1);
}

#[test]
fn test_signaling_reconnect_announces_again() {
    let start = Instant::now();
    let (mut harness, source) = streaming_room(start);

    source.set_position(12.);
    harness.intent(HOST, UserIntent::Play, start);
    harness.take_sent();

    let reconnect_at = start + Duration::from_secs(1);

    harness.members[HOST].session.signaling_reconnected(reconnect_at);
    harness.members[VIEWER].session.signaling_reconnected(reconnect_at);
    harness.pump(reconnect_at);

    let sent = harness.take_sent();
    let sent_by = |index: usize| -> Vec<&'static str> {
        sent.iter()
            .filter(|(from, _)| *from == index)
            .map(|(_, m)| m.name())
            .collect()
    };

    let host_sent = sent_by(HOST);
    for name in ["joinRoom", "peer-id", "streaming-status-update", "videoStateChange"] {
        assert!(host_sent.contains(&name), "the host sends {} again", name);
    }

    let viewer_sent = sent_by(VIEWER);
    for name in ["joinRoom", "peer-id"] {
        assert!(viewer_sent.contains(&name), "the viewer sends {} again", name);
    }

    assert!(sent.iter().any(|(from, m)| *from == HOST
        && matches!(m, SignalMessage::VideoStateChange(p) if p.is_playing)));

    assert_eq!(harness.session(HOST).view(reconnect_at).roster.len(), 2);
    assert_eq!(harness.session(HOST).view(reconnect_at).links.len(), 1);
    assert_eq!(
        harness.session(VIEWER).view(reconnect_at).connection,
        Some(ConnectionStatus::Streaming),
        "rejoining keeps the stream"
    );
}

#[test]
fn test_transport_gives_up_and_asks_for_reload() {
    let start = Instant::now();
    let mut harness = Harness::new();

    let viewer = harness.add("viewer", "Bob", Role::Viewer);
    harness.join(viewer, start);

    harness.members[viewer]
        .session
        .transport()
        .drop_session("network changed");
    harness.pump(start);

    let mut now = start;

    // Every reopened session is lost before it finishes opening.
    for _ in 0..5 {
        now += Duration::from_secs(3);

        let member = &mut harness.members[viewer];
        member.session.tick(now);
        member.transport_events.try_iter().for_each(drop);
        member.session.handle_transport(
            TransportEvent::SessionLost {
                reason: "unreachable".to_string(),
            },
            now,
        );
    }

    assert_eq!(harness.session(viewer).view(now).transport, SessionStatus::Failed);

    let events = harness.events(viewer);
    assert!(events.contains(&RoomEvent::TransportStatusChanged {
        status: SessionStatus::Failed
    }));

    let reloads = events
        .iter()
        .filter(|e| {
            matches!(e, RoomEvent::ChatReceived { message }
                if message.is_system && message.text.contains("reload"))
        })
        .count();
    assert_eq!(reloads, 1, "the persistent error is reported once");

    harness.members[viewer].session.tick(now + Duration::from_secs(60));
    assert_eq!(
        harness.session(viewer).view(now).transport,
        SessionStatus::Failed,
        "no further automatic attempts"
    );

    harness.intent(viewer, UserIntent::RetryTransport, now);

    let transport_id = harness
        .session(viewer)
        .transport()
        .transport_id()
        .expect("transport reopened");
    assert_eq!(
        harness.session(viewer).view(now).transport,
        SessionStatus::Open(transport_id),
        "a manual retry starts over"
    );
}

#[test]
fn test_blocked_autoplay_is_not_an_error() {
    let start = Instant::now();
    let mut harness = Harness::new();

    harness.add("host", "Alice", Role::Host);
    harness.add("viewer", "Bob", Role::Viewer);

    harness.join(HOST, start);
    harness.join(VIEWER, start);

    harness.members[VIEWER]
        .session
        .transport()
        .set_autoplay_blocked(true);
    harness.events(VIEWER);

    harness.intent(
        HOST,
        UserIntent::SelectMedia(SharedMediaSource::new(ScriptedSource::default())),
        start,
    );
    harness.intent(HOST, UserIntent::StartStream, start);

    let events = harness.events(VIEWER);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, RoomEvent::PlaybackBlocked))
            .count(),
        1
    );

    let view = harness.session(VIEWER).view(start);
    assert!(view.playback_blocked, "a click to play is offered");
    assert_eq!(view.connection, Some(ConnectionStatus::Streaming));

    harness.intent(VIEWER, UserIntent::ResumePlayback, start);
    assert!(!harness.session(VIEWER).view(start).playback_blocked);
}
