use axum::{
    extract::{Path, State},
    routing::get,
    Json,
};
use watchroom_collab::RoomId;

use crate::{context::ServerContext, errors::ServerResult, HubError, RoomSummary, Router};

/// Lists the live rooms.
async fn list_rooms(State(context): State<ServerContext>) -> Json<Vec<RoomSummary>> {
    Json(context.hub.rooms())
}

async fn room(
    State(context): State<ServerContext>,
    Path(room_id): Path<String>,
) -> ServerResult<Json<RoomSummary>> {
    let room_id = RoomId::new(room_id);

    let room = context
        .hub
        .room(&room_id)
        .ok_or(HubError::UnknownRoom(room_id))?;

    Ok(Json(room))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms))
        .route("/:room_id", get(room))
}
