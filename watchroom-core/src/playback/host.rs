use std::time::Instant;

use log::debug;

use super::{PlaybackState, SyncOutput};
use crate::{sanitize_seconds, Config};

/// The authoritative, host side of playback synchronization.
///
/// Every local change is observed here, and the engine decides what needs to be
/// broadcast. Updates are suppressed while the state stays within the drift
/// tolerance of the last broadcast one, which bounds the update volume.
#[derive(Debug, Clone)]
pub struct HostSync {
    drift_tolerance: f64,
    seek_threshold: f64,
    /// The last state observed from the local media.
    local: PlaybackState,
    /// The last state that was broadcast.
    last_emitted: Option<PlaybackState>,
}

impl HostSync {
    /// Creates the engine for a freshly available media handle, paused at the start.
    pub fn new(config: &Config, now: Instant) -> Self {
        Self {
            drift_tolerance: config.drift_tolerance_in_seconds,
            seek_threshold: config.seek_threshold_in_seconds,
            local: PlaybackState::paused_at_start(now),
            last_emitted: None,
        }
    }

    /// The current authoritative state.
    pub fn authoritative(&self) -> PlaybackState {
        self.local
    }

    pub fn last_emitted(&self) -> Option<PlaybackState> {
        self.last_emitted
    }

    /// The host started playing at `position`.
    pub fn play(&mut self, position: f64, now: Instant) -> Vec<SyncOutput> {
        self.observe(PlaybackState::new(true, position, now))
            .into_iter()
            .map(SyncOutput::StateUpdate)
            .collect()
    }

    /// The host paused at `position`.
    pub fn pause(&mut self, position: f64, now: Instant) -> Vec<SyncOutput> {
        self.observe(PlaybackState::new(false, position, now))
            .into_iter()
            .map(SyncOutput::StateUpdate)
            .collect()
    }

    /// The host jumped to `position`.
    ///
    /// A seek always produces a state update. If the jump, measured from where
    /// playback was expected to be, exceeds the seek threshold, a seek operation follows it.
    pub fn seek(&mut self, position: f64, is_playing: bool, now: Instant) -> Vec<SyncOutput> {
        let position = sanitize_seconds(position);
        let expected = self.local.position_at(now);
        let jump = (position - expected).abs();

        let state = PlaybackState::new(is_playing, position, now);
        self.local = state;
        self.last_emitted = Some(state);

        let mut outputs = vec![SyncOutput::StateUpdate(state)];

        if jump > self.seek_threshold {
            outputs.push(SyncOutput::SeekOperation {
                position_seconds: position,
            });
        }

        outputs
    }

    /// The periodic resync tick, with the current local media state.
    pub fn tick(&mut self, position: f64, is_playing: bool, now: Instant) -> Vec<SyncOutput> {
        self.observe(PlaybackState::new(is_playing, position, now))
            .into_iter()
            .map(SyncOutput::StateUpdate)
            .collect()
    }

    /// Forces the current state out, regardless of thresholds.
    /// Used when the stream starts and after the signaling channel reconnects.
    pub fn announce(&mut self, now: Instant) -> PlaybackState {
        let state = PlaybackState::new(
            self.local.is_playing,
            self.local.position_at(now),
            now,
        );

        self.local = state;
        self.last_emitted = Some(state);

        state
    }

    fn observe(&mut self, state: PlaybackState) -> Option<PlaybackState> {
        self.local = state;

        let should_emit = match &self.last_emitted {
            None => true,
            Some(last) => last.differs_from(&state, self.drift_tolerance),
        };

        if !should_emit {
            debug!(
                "Suppressed playback update at {:.1}s, within tolerance",
                state.position_seconds
            );
            return None;
        }

        self.last_emitted = Some(state);
        Some(state)
    }
}
