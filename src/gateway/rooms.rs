//! Room naming and in-process membership.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::bus::RoomMessage;

/// A broadcast scope a connection can join.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Team(String),
    User(String),
    Collection(String),
}

impl Room {
    pub fn team(id: impl Into<String>) -> Self {
        Room::Team(id.into())
    }

    pub fn user(id: impl Into<String>) -> Self {
        Room::User(id.into())
    }

    pub fn collection(id: impl Into<String>) -> Self {
        Room::Collection(id.into())
    }

    /// Wire name of the room, shared with producers and other processes.
    pub fn name(&self) -> String {
        match self {
            Room::Team(id) => format!("team-{id}"),
            Room::User(id) => format!("user-{id}"),
            Room::Collection(id) => format!("collection-{id}"),
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Per-connection handle held by the membership map.
struct Member {
    sender: mpsc::UnboundedSender<Arc<RoomMessage>>,
    rooms: HashSet<String>,
}

/// Which local connections belong to which rooms.
///
/// Membership lives only in this process. The bus replicates room messages
/// between processes and each process delivers to its own members, so no
/// shared connection table exists anywhere.
pub struct RoomMembership {
    members: DashMap<String, Member>,
    rooms: DashMap<String, HashSet<String>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a connection's outbound channel. Must precede any `join`.
    pub fn register(&self, connection_id: &str, sender: mpsc::UnboundedSender<Arc<RoomMessage>>) {
        self.members.insert(
            connection_id.to_string(),
            Member {
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// Add a connection to a room. Returns false if the connection is
    /// unknown or already a member.
    pub fn join(&self, connection_id: &str, room: &Room) -> bool {
        let name = room.name();
        let newly_joined = {
            let Some(mut member) = self.members.get_mut(connection_id) else {
                return false;
            };
            member.rooms.insert(name.clone())
        };
        if !newly_joined {
            return false;
        }
        self.rooms
            .entry(name)
            .or_default()
            .insert(connection_id.to_string());
        true
    }

    /// Remove a connection from a room. Returns false if it was not a
    /// member.
    pub fn leave(&self, connection_id: &str, room: &Room) -> bool {
        let name = room.name();
        let was_member = {
            let Some(mut member) = self.members.get_mut(connection_id) else {
                return false;
            };
            member.rooms.remove(&name)
        };
        if !was_member {
            return false;
        }
        self.remove_from_room(&name, connection_id);
        true
    }

    /// Drop a connection and strip it from every room it joined.
    pub fn deregister(&self, connection_id: &str) {
        let Some((_, member)) = self.members.remove(connection_id) else {
            return;
        };
        for name in member.rooms {
            self.remove_from_room(&name, connection_id);
        }
    }

    /// Send a room message to every local member. Returns the delivery
    /// count. Best effort: members whose channel has closed are skipped and
    /// cleaned up on disconnect.
    pub fn deliver(&self, message: Arc<RoomMessage>) -> usize {
        let ids: Vec<String> = match self.rooms.get(&message.room) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for id in ids {
            if let Some(member) = self.members.get(&id) {
                if member.sender.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Room names the connection is currently joined to.
    pub fn rooms_of(&self, connection_id: &str) -> HashSet<String> {
        self.members
            .get(connection_id)
            .map(|m| m.rooms.clone())
            .unwrap_or_default()
    }

    pub fn is_member(&self, connection_id: &str, room: &Room) -> bool {
        self.members
            .get(connection_id)
            .map(|m| m.rooms.contains(&room.name()))
            .unwrap_or(false)
    }

    /// Connection ids of the local members of a room.
    pub fn members_of(&self, room: &Room) -> Vec<String> {
        self.rooms
            .get(&room.name())
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of local members in a room.
    pub fn room_size(&self, room: &Room) -> usize {
        self.rooms.get(&room.name()).map(|ids| ids.len()).unwrap_or(0)
    }

    fn remove_from_room(&self, name: &str, connection_id: &str) {
        let now_empty = match self.rooms.get_mut(name) {
            Some(mut ids) => {
                ids.remove(connection_id);
                ids.is_empty()
            }
            None => false,
        };
        // Rooms exist only while they have members.
        if now_empty {
            self.rooms.remove_if(name, |_, ids| ids.is_empty());
        }
    }
}
