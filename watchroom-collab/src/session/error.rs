use thiserror::Error;

use crate::SignalingError;

/// Errors returned for user intents and joining.
/// Nothing is changed and nothing is sent when one of these is returned.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A display name is required")]
    MissingDisplayName,
    #[error("A participant id is required")]
    MissingParticipantId,
    #[error("Join the room first")]
    NotJoined,
    #[error("Select a video first")]
    NoMediaSource,
    #[error("Stop the stream before selecting another video")]
    AlreadyStreaming,
    #[error("Only the host can do this")]
    NotHost,
    #[error("Only viewers can do this")]
    NotViewer,
    #[error("Chat messages cannot be empty")]
    EmptyMessage,
    #[error(transparent)]
    Signaling(#[from] SignalingError),
}
