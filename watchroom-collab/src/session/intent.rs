use std::time::Instant;

use log::info;
use watchroom_core::{
    sanitize_seconds, HostSync, MediaSource, PeerTransport, SharedMediaSource, SyncOutput,
};

use super::{RoleState, RoomSession, SessionError, SessionTimer};
use crate::{ChatPayload, RoomEvent, SignalMessage, SignalingChannel};

/// Something the user asked for in the presentation layer.
#[derive(Debug, Clone)]
pub enum UserIntent {
    /// The host picked a video to stream.
    SelectMedia(SharedMediaSource),
    StartStream,
    StopStream,
    Play,
    Pause,
    /// Jump to a position, in seconds.
    Seek { to: f64 },
    SendChat { text: String },
    /// The viewer asked to check the connection to the stream again.
    Recheck,
    /// The viewer clicked to play after autoplay was blocked.
    ResumePlayback,
    /// Try the transport session again after every automatic attempt failed.
    RetryTransport,
}

impl<S, T> RoomSession<S, T>
where
    S: SignalingChannel,
    T: PeerTransport,
{
    /// Applies a user intent. Rejected intents change nothing.
    pub fn handle_intent(&mut self, intent: UserIntent, now: Instant) -> Result<(), SessionError> {
        match intent {
            UserIntent::SelectMedia(source) => self.select_media(source, now),
            UserIntent::StartStream => self.start_stream(now),
            UserIntent::StopStream => self.stop_stream(),
            UserIntent::Play => self.control_playback(now, |source, sync, now| {
                source.play();
                sync.play(source.position(), now)
            }),
            UserIntent::Pause => self.control_playback(now, |source, sync, now| {
                source.pause();
                sync.pause(source.position(), now)
            }),
            UserIntent::Seek { to } => self.control_playback(now, |source, sync, now| {
                let is_playing = source.is_playing();

                source.seek(sanitize_seconds(to));
                sync.seek(source.position(), is_playing, now)
            }),
            UserIntent::SendChat { text } => self.send_chat(text),
            UserIntent::Recheck => {
                let RoleState::Viewer(viewer) = &mut self.role else {
                    return Err(SessionError::NotViewer);
                };

                let report = viewer.link.recheck(now);
                self.apply_viewer_report(report);

                Ok(())
            }
            UserIntent::ResumePlayback => {
                let RoleState::Viewer(viewer) = &mut self.role else {
                    return Err(SessionError::NotViewer);
                };

                viewer.link.resume_playback();
                Ok(())
            }
            UserIntent::RetryTransport => {
                if self.transport_session.retry_manually() {
                    self.open_transport(now);
                }

                Ok(())
            }
        }
    }

    fn select_media(&mut self, source: SharedMediaSource, now: Instant) -> Result<(), SessionError> {
        let RoleState::Host(host) = &mut self.role else {
            return Err(SessionError::NotHost);
        };

        if host.links.is_streaming() {
            return Err(SessionError::AlreadyStreaming);
        }

        info!("Selected {} for streaming", source.label());

        let sync = HostSync::new(&self.config, now);
        let state = sync.authoritative();

        host.links.set_source(source);
        host.sync = Some(sync);

        self.timers
            .arm(SessionTimer::Resync, now + self.config.resync_interval());
        self.emit(RoomEvent::PlaybackUpdated { state });

        Ok(())
    }

    fn start_stream(&mut self, now: Instant) -> Result<(), SessionError> {
        if !self.joined {
            return Err(SessionError::NotJoined);
        }

        let RoleState::Host(host) = &mut self.role else {
            return Err(SessionError::NotHost);
        };

        host.links
            .start_streaming()
            .map_err(|_| SessionError::NoMediaSource)?;

        let state = host.sync.as_mut().map(|s| s.announce(now));

        info!("Started streaming to room {}", self.local.room_id);

        self.announce_streaming();

        if let Some(state) = state {
            self.broadcast_sync(vec![SyncOutput::StateUpdate(state)]);
        }

        let targets = self.known_viewers();
        self.connect_viewers(targets, now);

        Ok(())
    }

    fn stop_stream(&mut self) -> Result<(), SessionError> {
        let RoleState::Host(host) = &mut self.role else {
            return Err(SessionError::NotHost);
        };

        let report = host.links.stop_streaming();

        info!("Stopped streaming to room {}", self.local.room_id);

        self.apply_link_report(report);
        self.announce_streaming();

        Ok(())
    }

    /// Applies a play, pause or seek to the media source, and then to the sync engine.
    fn control_playback<F>(&mut self, now: Instant, control: F) -> Result<(), SessionError>
    where
        F: FnOnce(&SharedMediaSource, &mut HostSync, Instant) -> Vec<SyncOutput>,
    {
        let RoleState::Host(host) = &mut self.role else {
            return Err(SessionError::NotHost);
        };

        let (Some(source), Some(sync)) = (host.links.source(), host.sync.as_mut()) else {
            return Err(SessionError::NoMediaSource);
        };

        let outputs = control(source, sync, now);
        self.broadcast_sync(outputs);

        Ok(())
    }

    fn send_chat(&mut self, text: String) -> Result<(), SessionError> {
        if !self.joined {
            return Err(SessionError::NotJoined);
        }

        let text = text.trim();

        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        // The relay echoes the message back to everyone, including us.
        self.signaling
            .send(SignalMessage::SendMessage(ChatPayload {
                room_id: self.local.room_id.clone(),
                text: text.to_string(),
                author: self.local.display_name.clone(),
                sent_at: None,
            }))?;

        Ok(())
    }
}
