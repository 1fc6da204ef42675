use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::HubError;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    #[error("Invalid signaling message: {0}")]
    InvalidMessage(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<HubError> for ServerError {
    fn from(value: HubError) -> Self {
        match value {
            HubError::UnknownRoom(room_id) => Self::NotFound {
                resource: "room",
                identifier: room_id.to_string(),
            },
            HubError::Message(e) => Self::InvalidMessage(e.to_string()),
            e => Self::Unknown(e.to_string()),
        }
    }
}
