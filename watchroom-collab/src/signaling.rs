use thiserror::Error;

use crate::SignalMessage;

/// Delivers control events to the other participants of a room.
///
/// Delivery is ordered per sender and at least once. Reconnecting is up to the
/// implementation, the session is told about it through
/// [crate::RoomSession::signaling_reconnected].
pub trait SignalingChannel
where
    Self: 'static + Send + Sync,
{
    fn send(&self, message: SignalMessage) -> Result<(), SignalingError>;
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("The signaling channel is closed")]
    Closed,
    #[error("Signaling failed: {0}")]
    Other(String),
}

impl SignalingChannel for crossbeam::channel::Sender<SignalMessage> {
    fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        crossbeam::channel::Sender::send(self, message).map_err(|_| SignalingError::Closed)
    }
}

impl SignalingChannel for tokio::sync::mpsc::UnboundedSender<SignalMessage> {
    fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        tokio::sync::mpsc::UnboundedSender::send(self, message)
            .map_err(|_| SignalingError::Closed)
    }
}
