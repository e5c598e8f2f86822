use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use uuid::Uuid;

use sous_core::protocol::ServerEvent;
use sous_core::session::Session;

/// Per-socket identifier, shared with the client for log correlation only.
pub type ConnectionId = Uuid;

/// Channel feeding a connection's write task.
pub type ClientSender = mpsc::UnboundedSender<Message>;

/// A connection that has created or joined a session.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    pub user_id: String,
    pub session_id: String,
    pub username: String,
    pub sender: ClientSender,
}

/// Hub-wide shared state: the session store and the client registry.
///
/// The session map takes a coarse lock; each session's interior is guarded
/// by its own mutex, so mutations to one session are totally ordered while
/// distinct sessions proceed in parallel.
pub struct HubState {
    session_ttl: Duration,

    /// Authoritative sessions (sessionId → session under its own lock).
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,

    /// Registered connections (connectionId → identity + event sender).
    clients: RwLock<HashMap<ConnectionId, RegisteredClient>>,

    /// One active connection per user (userId → connectionId).
    user_connections: RwLock<HashMap<String, ConnectionId>>,
}

impl HubState {
    pub fn new(session_ttl: Duration) -> Self {
        Self {
            session_ttl,
            sessions: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            user_connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    // --- Session store ---

    /// Look up a live session. A session idle past the TTL is treated as
    /// absent and eagerly removed.
    pub async fn resolve_session(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        let handle = self.sessions.read().await.get(session_id).cloned()?;
        let expired = handle.lock().await.is_expired(self.session_ttl);
        if expired {
            self.sessions.write().await.remove(session_id);
            debug!("Dropped expired session {session_id} on lookup");
            return None;
        }
        Some(handle)
    }

    pub async fn insert_session(&self, session: Session) -> Arc<Mutex<Session>> {
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        handle
    }

    pub async fn remove_session(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.write().await.remove(session_id)
    }

    /// Drop every session idle past the TTL, returning the reaped ids.
    pub async fn take_expired_sessions(&self) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let candidates: Vec<(String, Arc<Mutex<Session>>)> = sessions
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        let mut expired = Vec::new();
        for (id, handle) in candidates {
            if handle.lock().await.is_expired(self.session_ttl) {
                sessions.remove(&id);
                expired.push(id);
            }
        }
        expired
    }

    // --- Client registry ---

    /// Bind a connection to a user and session. Any prior connection held by
    /// the same user is dropped from the registry (host rejoin).
    pub async fn register(
        &self,
        conn_id: ConnectionId,
        user_id: &str,
        session_id: &str,
        username: &str,
        sender: ClientSender,
    ) {
        let mut clients = self.clients.write().await;
        let mut user_conns = self.user_connections.write().await;
        if let Some(prev) = user_conns.insert(user_id.to_owned(), conn_id) {
            if prev != conn_id {
                clients.remove(&prev);
                debug!("Replaced connection {prev} for user {user_id}");
            }
        }
        clients.insert(
            conn_id,
            RegisteredClient {
                user_id: user_id.to_owned(),
                session_id: session_id.to_owned(),
                username: username.to_owned(),
                sender,
            },
        );
    }

    pub async fn connection_for_user(&self, user_id: &str) -> Option<ConnectionId> {
        self.user_connections.read().await.get(user_id).copied()
    }

    /// Identity of a registered connection, if any.
    pub async fn client(&self, conn_id: &ConnectionId) -> Option<RegisteredClient> {
        self.clients.read().await.get(conn_id).cloned()
    }

    /// Drop a connection's registry entries. The user mapping is only
    /// cleared while it still points at this connection, so a host rejoin
    /// that already replaced it is left alone.
    pub async fn unregister(&self, conn_id: &ConnectionId) -> Option<RegisteredClient> {
        let mut clients = self.clients.write().await;
        let removed = clients.remove(conn_id)?;
        let mut user_conns = self.user_connections.write().await;
        if user_conns.get(&removed.user_id) == Some(conn_id) {
            user_conns.remove(&removed.user_id);
        }
        Some(removed)
    }

    /// Remove every registry entry bound to a session, returning the removed
    /// clients so the caller can close their connections.
    pub async fn purge_session(&self, session_id: &str) -> Vec<RegisteredClient> {
        let mut clients = self.clients.write().await;
        let mut user_conns = self.user_connections.write().await;
        let ids: Vec<ConnectionId> = clients
            .iter()
            .filter(|(_, c)| c.session_id == session_id)
            .map(|(id, _)| *id)
            .collect();

        let mut purged = Vec::new();
        for id in ids {
            if let Some(client) = clients.remove(&id) {
                if user_conns.get(&client.user_id) == Some(&id) {
                    user_conns.remove(&client.user_id);
                }
                purged.push(client);
            }
        }
        purged
    }

    // --- Broadcaster ---

    /// Fan an event out to every registered connection in a session,
    /// optionally excluding one user. The target list is snapshotted under
    /// the registry lock; sends happen outside it. A failed send never
    /// fails the originating command.
    pub async fn broadcast_to_session(
        &self,
        session_id: &str,
        event: &ServerEvent,
        exclude_user: Option<&str>,
    ) {
        let Ok(json) = serde_json::to_string(event) else {
            debug!("Dropping unserializable event");
            return;
        };

        let targets: Vec<(String, ClientSender)> = {
            let clients = self.clients.read().await;
            clients
                .values()
                .filter(|c| c.session_id == session_id)
                .filter(|c| exclude_user != Some(c.user_id.as_str()))
                .map(|c| (c.user_id.clone(), c.sender.clone()))
                .collect()
        };

        for (user_id, sender) in targets {
            if sender.send(Message::Text(json.clone())).is_err() {
                debug!("Skipping broadcast to {user_id} (connection gone)");
            }
        }
    }
}

/// Serialize and enqueue a single event on one connection.
pub fn send_event(sender: &ClientSender, event: &ServerEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = sender.send(Message::Text(json));
    }
}
