//! Registry binding live WebSocket connections to sessions and roles.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::session::is_reserved_team_id;

/// Role a connection declared when joining a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Regular player attached to a team.
    Player,
    /// Session administrator; never placed on a team.
    Admin,
    /// Read-only observer; never placed on a team.
    Spectator,
}

impl ConnectionRole {
    /// Derive the role from the join payload's admin flag and declared team.
    pub fn from_join(is_admin: bool, team_id: Option<&str>) -> Self {
        if is_admin {
            Self::Admin
        } else if team_id.is_none_or(is_reserved_team_id) {
            Self::Spectator
        } else {
            Self::Player
        }
    }
}

/// Handle used to push messages to one connected client.
#[derive(Clone)]
pub struct ConnectionBinding {
    /// Connection identifier, allocated per socket.
    pub id: Uuid,
    /// Full identifier of the session this connection is routed to.
    pub session_id: String,
    /// Declared role.
    pub role: ConnectionRole,
    /// Display name announced on join.
    pub player_name: String,
    /// Declared team, when the role is `Player`.
    pub team_id: Option<String>,
    /// Outbound channel feeding the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Ephemeral connection-to-session bindings, destroyed on disconnect.
#[derive(Default)]
pub struct ConnectionRegistry {
    bindings: DashMap<Uuid, ConnectionBinding>,
}

impl ConnectionRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace, on idempotent re-join) a connection's binding.
    pub fn bind(&self, binding: ConnectionBinding) {
        self.bindings.insert(binding.id, binding);
    }

    /// Look up one connection's binding.
    pub fn get(&self, connection_id: Uuid) -> Option<ConnectionBinding> {
        self.bindings
            .get(&connection_id)
            .map(|entry| entry.value().clone())
    }

    /// Drop a connection's binding; called when the socket closes.
    pub fn remove(&self, connection_id: Uuid) {
        self.bindings.remove(&connection_id);
    }

    /// Senders for every connection currently routed to `session_id`.
    pub fn room_senders(&self, session_id: &str) -> Vec<(Uuid, mpsc::UnboundedSender<Message>)> {
        self.bindings
            .iter()
            .filter(|entry| entry.value().session_id == session_id)
            .map(|entry| (entry.value().id, entry.value().tx.clone()))
            .collect()
    }

    /// Whether `connection_id` is currently routed to `session_id`.
    pub fn is_in_room(&self, connection_id: Uuid, session_id: &str) -> bool {
        self.bindings
            .get(&connection_id)
            .is_some_and(|entry| entry.value().session_id == session_id)
    }

    /// Number of live connections across all sessions.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no connection is currently bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
