use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::protocol::ServerEvent;
use crate::{RoomId, UserId};

/// Outbound queue of one live connection.
pub type OutboundSender = mpsc::Sender<Arc<ServerEvent>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("User {user_id} is already in room {room_id}")]
    AlreadyInRoom { user_id: UserId, room_id: RoomId },
    #[error("User {user_id} is not in room {room_id}")]
    NotInRoom { user_id: UserId, room_id: RoomId },
    #[error("User {0} has no live connection")]
    Unreachable(UserId),
    #[error("Outbound queue for user {0} is full")]
    Lagging(UserId),
}

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<RoomId, HashSet<UserId>>,
    /// Reverse index enforcing one room per user.
    membership: HashMap<UserId, RoomId>,
}

/// Room membership plus the outbound queue of every live connection.
///
/// Payloads are shared `Arc`s, so a result serialized for a language group is
/// built once no matter how many recipients it has.
#[derive(Default)]
pub struct RoomChannel {
    connections: DashMap<UserId, OutboundSender>,
    rooms: Mutex<RoomTable>,
}

impl RoomChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a user's outbound queue. A newer connection replaces an older one.
    pub fn attach(&self, user_id: UserId, sender: OutboundSender) {
        if self.connections.insert(user_id.clone(), sender).is_some() {
            debug!(%user_id, "Replaced existing outbound connection");
        }
    }

    /// Unbinds the queue, but only if it is still the one given (a reconnect
    /// may already have attached a new queue under the same user).
    pub fn detach(&self, user_id: &UserId, sender: &OutboundSender) {
        self.connections
            .remove_if(user_id, |_, current| current.same_channel(sender));
    }

    pub fn join(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), ChannelError> {
        let mut table = self.rooms.lock();
        if let Some(current) = table.membership.get(user_id) {
            return Err(ChannelError::AlreadyInRoom {
                user_id: user_id.clone(),
                room_id: current.clone(),
            });
        }
        table.membership.insert(user_id.clone(), room_id.clone());
        let members = table.rooms.entry(room_id.clone()).or_default();
        members.insert(user_id.clone());
        let count = members.len();
        drop(table);

        info!(%user_id, %room_id, participants = count, "Joined room");
        Ok(())
    }

    /// Removes the user; the room is destroyed when its last member leaves.
    pub fn leave(&self, user_id: &UserId, room_id: &RoomId) -> Result<(), ChannelError> {
        let mut table = self.rooms.lock();
        if table.membership.get(user_id) != Some(room_id) {
            return Err(ChannelError::NotInRoom {
                user_id: user_id.clone(),
                room_id: room_id.clone(),
            });
        }
        table.membership.remove(user_id);
        let mut emptied = false;
        if let Some(members) = table.rooms.get_mut(room_id) {
            members.remove(user_id);
            emptied = members.is_empty();
        }
        if emptied {
            table.rooms.remove(room_id);
        }
        drop(table);

        info!(%user_id, %room_id, room_closed = emptied, "Left room");
        Ok(())
    }

    /// Queues a payload for one user without waiting.
    pub fn send(&self, user_id: &UserId, payload: Arc<ServerEvent>) -> Result<(), ChannelError> {
        let sender = self
            .connections
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ChannelError::Unreachable(user_id.clone()))?;

        match sender.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(%user_id, "Outbound queue full, dropping message");
                Err(ChannelError::Lagging(user_id.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(ChannelError::Unreachable(user_id.clone())),
        }
    }

    /// Sends to every member of the room except `excluding`. Each failure is
    /// reported for its recipient; delivery to the others proceeds.
    ///
    /// Room-wide entry point for the embedding application (announcements,
    /// moderation notices). Translation results never go through here: they
    /// are addressed to the recipient set resolved when the transcript
    /// arrived, not to whoever is in the room when the call returns.
    pub fn broadcast(
        &self,
        room_id: &RoomId,
        payload: Arc<ServerEvent>,
        excluding: Option<&UserId>,
    ) -> Vec<(UserId, ChannelError)> {
        let failures: Vec<_> = self
            .participants(room_id)
            .into_iter()
            .filter(|user_id| Some(user_id) != excluding)
            .filter_map(|user_id| {
                self.send(&user_id, payload.clone())
                    .err()
                    .map(|e| (user_id, e))
            })
            .collect();

        if !failures.is_empty() {
            debug!(%room_id, failed = failures.len(), "Broadcast partially delivered");
        }
        failures
    }

    pub fn participants(&self, room_id: &RoomId) -> Vec<UserId> {
        let table = self.rooms.lock();
        let mut members: Vec<UserId> = table
            .rooms
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn room_of(&self, user_id: &UserId) -> Option<RoomId> {
        self.rooms.lock().membership.get(user_id).cloned()
    }

    pub fn has_room(&self, room_id: &RoomId) -> bool {
        self.rooms.lock().rooms.contains_key(room_id)
    }

    pub fn is_connected(&self, user_id: &UserId) -> bool {
        self.connections
            .get(user_id)
            .is_some_and(|sender| !sender.is_closed())
    }
}
