use std::time::{Duration, Instant};

use super::PlaybackState;
use crate::{Config, Timers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewerSyncTimer {
    SyncingIndicator,
}

/// The follower side of playback synchronization.
///
/// The shadow state is replaced wholesale by every update from the host and
/// never corrected locally. The viewer's real position is driven by its live
/// media link, so the shadow is mostly informational.
#[derive(Debug, Clone)]
pub struct ViewerSync {
    syncing_window: Duration,
    shadow: Option<PlaybackState>,
    timers: Timers<ViewerSyncTimer>,
}

impl ViewerSync {
    pub fn new(config: &Config) -> Self {
        Self {
            syncing_window: config.syncing_indicator(),
            shadow: None,
            timers: Timers::new(),
        }
    }

    /// Applies an update from the host and shows the syncing indicator.
    pub fn apply_update(
        &mut self,
        is_playing: bool,
        position_seconds: f64,
        now: Instant,
    ) -> PlaybackState {
        let state = PlaybackState::new(is_playing, position_seconds, now);

        self.shadow = Some(state);
        self.timers
            .arm(ViewerSyncTimer::SyncingIndicator, now + self.syncing_window);

        state
    }

    /// The last update received from the host, exactly as received.
    pub fn shadow(&self) -> Option<PlaybackState> {
        self.shadow
    }

    pub fn is_syncing(&self) -> bool {
        self.timers.is_armed(&ViewerSyncTimer::SyncingIndicator)
    }

    /// Where the host is expected to be at `now`.
    pub fn extrapolated_position(&self, now: Instant) -> Option<f64> {
        self.shadow.map(|s| s.position_at(now))
    }

    /// How far ahead (positive) or behind (negative) the local playback is from the host.
    pub fn drift(&self, local_position: f64, now: Instant) -> Option<f64> {
        self.extrapolated_position(now)
            .map(|expected| crate::sanitize_seconds(local_position) - expected)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Handles expired timers. Returns true if the syncing indicator went away.
    pub fn poll_timers(&mut self, now: Instant) -> bool {
        self.timers
            .expire(now)
            .contains(&ViewerSyncTimer::SyncingIndicator)
    }

    /// Forgets the shadow, for when the host goes away.
    pub fn reset(&mut self) {
        self.shadow = None;
        self.timers.clear();
    }
}
