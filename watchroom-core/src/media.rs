use std::{fmt::Debug, sync::Arc};

/// A local media handle the host streams from.
///
/// The session treats it as opaque. The presentation layer may read it for
/// local playback, but play, pause and seek must go through the session so
/// that every change is reflected in the synchronized playback state.
pub trait MediaSource
where
    Self: 'static + Send + Sync,
{
    /// A human readable label, usually the file name.
    fn label(&self) -> String;

    /// The current playback position, in seconds.
    fn position(&self) -> f64;

    fn is_playing(&self) -> bool;

    fn play(&self);

    fn pause(&self);

    /// Moves the playback position, in seconds.
    fn seek(&self, position: f64);
}

/// [MediaSource] trait object.
#[derive(Clone)]
pub struct SharedMediaSource(Arc<dyn MediaSource>);

impl SharedMediaSource {
    pub fn new<T>(source: T) -> Self
    where
        T: MediaSource,
    {
        SharedMediaSource(Arc::new(source))
    }
}

impl<T> From<Arc<T>> for SharedMediaSource
where
    T: MediaSource,
{
    fn from(value: Arc<T>) -> Self {
        SharedMediaSource(value)
    }
}

impl MediaSource for SharedMediaSource {
    fn label(&self) -> String {
        self.0.label()
    }

    fn position(&self) -> f64 {
        self.0.position()
    }

    fn is_playing(&self) -> bool {
        self.0.is_playing()
    }

    fn play(&self) {
        self.0.play()
    }

    fn pause(&self) {
        self.0.pause()
    }

    fn seek(&self, position: f64) {
        self.0.seek(position)
    }
}

impl Debug for SharedMediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedMediaSource")
            .field(&self.0.label())
            .finish()
    }
}
