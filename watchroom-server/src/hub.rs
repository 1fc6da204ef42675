use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::mpsc::UnboundedSender, time::interval};
use watchroom_collab::{Delivery, MessageError, RelayError, RelayRoom, RoomId, SignalMessage};
use watchroom_core::{Config, Id, Participant};

pub type ConnectionId = Id<Connection>;

/// A websocket attached to the hub.
pub struct Connection {
    outbox: UnboundedSender<String>,
    room_id: Option<RoomId>,
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("The connection has not joined a room")]
    NotJoined,
    #[error("Room {0} does not exist")]
    UnknownRoom(RoomId),
}

/// A live room, as listed by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub member_count: usize,
    pub host: Option<Participant>,
}

/// Routes signaling messages between the connections of every room.
pub struct RelayHub {
    member_expiry: Duration,
    sweep_interval: Duration,
    rooms: DashMap<RoomId, Mutex<RelayRoom<ConnectionId>>>,
    connections: DashMap<ConnectionId, Connection>,
}

impl RelayHub {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            member_expiry: config.member_expiry(),
            sweep_interval: config.heartbeat_interval(),
            rooms: Default::default(),
            connections: Default::default(),
        })
    }

    /// Registers a connection. Messages for it are pushed to `outbox`, already encoded.
    pub fn connect(&self, outbox: UnboundedSender<String>) -> ConnectionId {
        let id = ConnectionId::new();

        self.connections.insert(
            id,
            Connection {
                outbox,
                room_id: None,
            },
        );

        debug!("Connection {} opened", id);
        id
    }

    /// Handles a text frame from a connection.
    pub fn handle(&self, connection: ConnectionId, text: &str) -> Result<(), HubError> {
        let message = SignalMessage::decode(text)?;
        let now = Instant::now();

        let deliveries = match message {
            SignalMessage::JoinRoom(payload) => {
                let room_id = payload.room_id.clone();

                if let Some(previous) = self.room_of(connection).filter(|r| r != &room_id) {
                    self.leave_room(connection, &previous);
                }

                let joined = self
                    .rooms
                    .entry(room_id.clone())
                    .or_insert_with(|| {
                        info!("Room {} was created", room_id);
                        Mutex::new(RelayRoom::new(room_id.clone()))
                    })
                    .lock()
                    .join(connection, payload, now);

                // A rejected join must not leave a room behind.
                let deliveries = match joined {
                    Ok(deliveries) => deliveries,
                    Err(e) => {
                        self.drop_empty_rooms();
                        return Err(e.into());
                    }
                };

                if let Some(mut entry) = self.connections.get_mut(&connection) {
                    entry.room_id = Some(room_id);
                }

                deliveries
            }
            other => {
                let room_id = self.room_of(connection).ok_or(HubError::NotJoined)?;
                let room = self
                    .rooms
                    .get(&room_id)
                    .ok_or_else(|| HubError::UnknownRoom(room_id.clone()))?;

                let deliveries = room.lock().relay(&connection, other, now)?;
                deliveries
            }
        };

        self.deliver(deliveries);
        Ok(())
    }

    /// A connection went away. Its member leaves the room.
    pub fn disconnect(&self, connection: ConnectionId) {
        if let Some(room_id) = self.room_of(connection) {
            self.leave_room(connection, &room_id);
        }

        self.connections.remove(&connection);
        debug!("Connection {} closed", connection);
    }

    /// Removes members that stopped sending heartbeats.
    pub fn expire(&self, now: Instant) {
        let mut deliveries = vec![];

        for room in self.rooms.iter() {
            deliveries.extend(room.lock().expire(now, self.member_expiry));
        }

        self.deliver(deliveries);
        self.drop_empty_rooms();
    }

    pub fn rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<_> = self
            .rooms
            .iter()
            .map(|entry| summarize(&entry.lock()))
            .collect();

        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }

    pub fn room(&self, room_id: &RoomId) -> Option<RoomSummary> {
        self.rooms.get(room_id).map(|entry| summarize(&entry.lock()))
    }

    fn room_of(&self, connection: ConnectionId) -> Option<RoomId> {
        self.connections
            .get(&connection)
            .and_then(|c| c.room_id.clone())
    }

    fn leave_room(&self, connection: ConnectionId, room_id: &RoomId) {
        let deliveries = self
            .rooms
            .get(room_id)
            .map(|room| room.lock().disconnect(&connection))
            .unwrap_or_default();

        if let Some(mut entry) = self.connections.get_mut(&connection) {
            entry.room_id = None;
        }

        self.deliver(deliveries);
        self.drop_empty_rooms();
    }

    fn drop_empty_rooms(&self) {
        self.rooms.retain(|room_id, room| {
            let is_empty = room.get_mut().is_empty();

            if is_empty {
                info!("Room {} is empty and was dropped", room_id);
            }

            !is_empty
        });
    }

    fn deliver(&self, deliveries: Vec<Delivery<ConnectionId>>) {
        for delivery in deliveries {
            let text = match delivery.message.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Could not encode {}: {}", delivery.message.name(), e);
                    continue;
                }
            };

            for to in delivery.to {
                let Some(connection) = self.connections.get(&to) else {
                    continue;
                };

                if connection.outbox.send(text.clone()).is_err() {
                    debug!("Connection {} is closing, dropping message", to);
                }
            }
        }
    }
}

fn summarize(room: &RelayRoom<ConnectionId>) -> RoomSummary {
    RoomSummary {
        room_id: room.id().clone(),
        member_count: room.len(),
        host: room.host().cloned(),
    }
}

/// Periodically expires silent members.
pub async fn sweep_expired(hub: Arc<RelayHub>) {
    let mut ticker = interval(hub.sweep_interval);

    loop {
        ticker.tick().await;
        hub.expire(Instant::now());
    }
}
