use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    time::{Duration, Instant},
};

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;
use watchroom_core::{MembershipId, MembershipRegistry, Participant};

use crate::{ChatPayload, JoinRoomPayload, MembershipPayload, RoomId, SignalMessage};

/// A message to deliver to a set of connections.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<C> {
    pub to: Vec<C>,
    pub message: SignalMessage,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Message for room {actual} was sent to room {expected}")]
    WrongRoom { expected: RoomId, actual: RoomId },
    #[error("Invalid join: {0}")]
    InvalidJoin(&'static str),
    #[error("The connection has not joined the room")]
    NotJoined,
    #[error("{0} messages are not accepted from participants")]
    Unexpected(&'static str),
}

struct RelayMember<C> {
    connection: C,
    last_seen: Instant,
}

/// The server side of a room: fans signaling messages out to the members.
///
/// `C` identifies a connection. The room never talks to connections itself,
/// it returns [Delivery]s for the caller to carry out.
pub struct RelayRoom<C> {
    id: RoomId,
    registry: MembershipRegistry,
    members: HashMap<MembershipId, RelayMember<C>>,
}

impl<C> RelayRoom<C>
where
    C: Clone + PartialEq + Eq + Hash + Debug,
{
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            registry: MembershipRegistry::new(),
            members: Default::default(),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn roster(&self) -> Vec<Participant> {
        self.registry.roster()
    }

    pub fn host(&self) -> Option<&Participant> {
        self.registry.host()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// The member a connection joined as.
    pub fn member_of(&self, connection: &C) -> Option<&MembershipId> {
        self.members
            .iter()
            .find(|(_, m)| &m.connection == connection)
            .map(|(id, _)| id)
    }

    /// Adds a member, or moves it to a new connection if it joins again.
    pub fn join(
        &mut self,
        connection: C,
        payload: JoinRoomPayload,
        now: Instant,
    ) -> Result<Vec<Delivery<C>>, RelayError> {
        self.check_room(&payload.room_id)?;

        if payload.participant_id.as_str().trim().is_empty() {
            return Err(RelayError::InvalidJoin("a participant id is required"));
        }

        if payload.display_name.trim().is_empty() {
            return Err(RelayError::InvalidJoin("a display name is required"));
        }

        // A connection can only hold one membership.
        let mut deliveries = match self.member_of(&connection).cloned() {
            Some(previous) if previous != payload.participant_id => self.leave(&previous),
            _ => vec![],
        };

        let change = self.registry.join(Participant::new(
            payload.participant_id.clone(),
            payload.display_name,
            payload.role,
        ));

        info!(
            "{} joined room {} as {}",
            change.participant.display_name, self.id, change.participant.role
        );

        self.members.insert(
            payload.participant_id,
            RelayMember {
                connection,
                last_seen: now,
            },
        );

        deliveries.push(Delivery {
            to: self.connections(),
            message: SignalMessage::UserJoined(MembershipPayload {
                roster: change.roster,
                changed_participant: change.participant,
            }),
        });

        Ok(deliveries)
    }

    /// Removes a member. Unknown members are ignored.
    pub fn leave(&mut self, membership_id: &MembershipId) -> Vec<Delivery<C>> {
        self.members.remove(membership_id);

        let Some(change) = self.registry.leave(membership_id) else {
            return vec![];
        };

        info!("{} left room {}", change.participant.display_name, self.id);

        let to = self.connections();

        if to.is_empty() {
            return vec![];
        }

        vec![Delivery {
            to,
            message: SignalMessage::UserLeft(MembershipPayload {
                roster: change.roster,
                changed_participant: change.participant,
            }),
        }]
    }

    /// A connection went away.
    pub fn disconnect(&mut self, connection: &C) -> Vec<Delivery<C>> {
        match self.member_of(connection).cloned() {
            Some(membership_id) => self.leave(&membership_id),
            None => vec![],
        }
    }

    /// Routes a message from a member.
    pub fn relay(
        &mut self,
        from: &C,
        message: SignalMessage,
        now: Instant,
    ) -> Result<Vec<Delivery<C>>, RelayError> {
        if let Some(room_id) = message.room_id() {
            self.check_room(room_id)?;
        }

        let sender = self.member_of(from).cloned().ok_or(RelayError::NotJoined)?;

        if let Some(member) = self.members.get_mut(&sender) {
            member.last_seen = now;
        }

        let is_host = self
            .registry
            .get(&sender)
            .is_some_and(|p| p.is_host());

        let deliveries = match message {
            SignalMessage::SendMessage(payload) => vec![Delivery {
                to: self.connections(),
                message: SignalMessage::NewMessage(ChatPayload {
                    author: self.registry.display_name(&sender),
                    sent_at: Some(Utc::now()),
                    ..payload
                }),
            }],
            SignalMessage::PeerId(mut payload) => {
                // Identities are always announced for the sender, with its actual role.
                payload.participant_id = sender.clone();
                payload.role = self
                    .registry
                    .get(&sender)
                    .map(|p| p.role)
                    .unwrap_or_default();

                self.others(from, SignalMessage::PeerId(payload))
            }
            SignalMessage::VideoStateChange(_) | SignalMessage::VideoSeekOperation(_)
                if !is_host =>
            {
                warn!("Dropping {} from {}, who is not the host", message.name(), sender);
                vec![]
            }
            SignalMessage::VideoStateChange(_) | SignalMessage::VideoSeekOperation(_) => {
                self.others(from, message)
            }
            SignalMessage::StreamingStatusUpdate(_) if !is_host => {
                warn!("Dropping {} from {}, who is not the host", message.name(), sender);
                vec![]
            }
            SignalMessage::StreamingStatusUpdate(payload) => {
                self.others(from, SignalMessage::StreamingStatus(payload))
            }
            SignalMessage::Heartbeat(_) => {
                debug!("Heartbeat from {}", sender);
                vec![]
            }
            other => return Err(RelayError::Unexpected(other.name())),
        };

        Ok(deliveries)
    }

    /// The members that have not been heard from within `expiry`.
    pub fn stale_members(&self, now: Instant, expiry: Duration) -> Vec<MembershipId> {
        self.members
            .iter()
            .filter(|(_, m)| now.saturating_duration_since(m.last_seen) >= expiry)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Removes the members that have not been heard from within `expiry`.
    pub fn expire(&mut self, now: Instant, expiry: Duration) -> Vec<Delivery<C>> {
        let mut deliveries = vec![];

        for membership_id in self.stale_members(now, expiry) {
            warn!("{} timed out in room {}", membership_id, self.id);
            deliveries.extend(self.leave(&membership_id));
        }

        deliveries
    }

    fn check_room(&self, room_id: &RoomId) -> Result<(), RelayError> {
        if room_id != &self.id {
            return Err(RelayError::WrongRoom {
                expected: self.id.clone(),
                actual: room_id.clone(),
            });
        }

        Ok(())
    }

    /// Every connection, in roster order.
    fn connections(&self) -> Vec<C> {
        self.registry
            .roster()
            .iter()
            .filter_map(|p| self.members.get(&p.membership_id))
            .map(|m| m.connection.clone())
            .collect()
    }

    fn others(&self, from: &C, message: SignalMessage) -> Vec<Delivery<C>> {
        let to: Vec<_> = self
            .connections()
            .into_iter()
            .filter(|c| c != from)
            .collect();

        if to.is_empty() {
            return vec![];
        }

        vec![Delivery { to, message }]
    }
}
