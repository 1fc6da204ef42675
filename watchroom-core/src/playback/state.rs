use std::time::Instant;

use crate::{sanitize_seconds, seconds_between};

/// A snapshot of playback: whether it is playing, and where, as observed at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Always finite and non-negative.
    pub position_seconds: f64,
    pub observed_at: Instant,
}

impl PlaybackState {
    pub fn new(is_playing: bool, position_seconds: f64, observed_at: Instant) -> Self {
        Self {
            is_playing,
            position_seconds: sanitize_seconds(position_seconds),
            observed_at,
        }
    }

    /// The state a media handle starts in.
    pub fn paused_at_start(observed_at: Instant) -> Self {
        Self::new(false, 0., observed_at)
    }

    /// Returns the position this state implies at `now`.
    pub fn position_at(&self, now: Instant) -> f64 {
        if self.is_playing {
            self.position_seconds + seconds_between(self.observed_at, now)
        } else {
            self.position_seconds
        }
    }

    /// Returns true if `other` should be broadcast given this was the last broadcast state.
    pub fn differs_from(&self, other: &PlaybackState, tolerance_in_seconds: f64) -> bool {
        self.is_playing != other.is_playing
            || (self.position_seconds - other.position_seconds).abs() > tolerance_in_seconds
    }
}
