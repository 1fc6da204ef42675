use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use tokio::sync::mpsc::unbounded_channel;

use crate::{context::ServerContext, RelayHub, Router};

async fn socket(
    ws: WebSocketUpgrade,
    State(context): State<ServerContext>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, context.hub))
}

/// Feeds text frames to the hub and writes whatever it routes back.
async fn handle_socket(socket: WebSocket, hub: Arc<RelayHub>) {
    let (mut outgoing, mut incoming) = socket.split();
    let (outbox, mut pending) = unbounded_channel::<String>();

    let connection = hub.connect(outbox);
    info!("Signaling connection {} opened", connection);

    let writer = tokio::spawn(async move {
        while let Some(text) = pending.recv().await {
            if outgoing.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = incoming.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Err(e) = hub.handle(connection, &text) {
                    warn!("Rejected message from {}: {}", connection, e);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Signaling connection {} failed: {}", connection, e);
                break;
            }
        }
    }

    hub.disconnect(connection);
    writer.abort();

    info!("Signaling connection {} closed", connection);
}

pub fn router() -> Router {
    Router::new().route("/", get(socket))
}
