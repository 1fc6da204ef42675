mod host;
mod state;
mod viewer;

pub use host::*;
pub use state::*;
pub use viewer::*;

/// Messages the host side of the sync engine wants broadcast, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutput {
    /// The regular playback state update.
    StateUpdate(PlaybackState),
    /// The host jumped to a new point, viewers should expect rebuffering.
    SeekOperation { position_seconds: f64 },
}
