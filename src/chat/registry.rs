/// Connection registry: every live connection and who it is logged in as.
///
/// Shared by all connection tasks and the server console. Always accessed
/// through [`SharedRegistry`]; callers that broadcast hold the write lock
/// so every recipient sees broadcasts in one global order.
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use super::transport::Outbound;

/// Opaque handle the transport assigns to each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One accepted connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    /// Set once the handshake is accepted; never changed afterwards.
    pub login_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    /// Whether this connection may send and receive chat.
    pub fn is_authorized(&self) -> bool {
        self.login_id.is_some()
    }

    /// Queue a line. Returns `false` if the connection is already gone.
    pub fn send(&self, line: &str) -> bool {
        self.tx.send(Outbound::Line(line.to_owned())).is_ok()
    }

    /// Queue a close after anything already queued.
    pub fn close(&self) -> bool {
        self.tx.send(Outbound::Close).is_ok()
    }
}

/// Why a handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("connection is already logged in as {0}")]
    AlreadyLoggedIn(String),
    #[error("login ID {0} is already in use")]
    LoginIdInUse(String),
    #[error("no such connection: {0}")]
    UnknownConnection(ConnectionId),
}

#[derive(Debug, Default)]
pub struct Registry {
    connections: BTreeMap<ConnectionId, Connection>,
}

/// Shared, thread-safe registry.
pub type SharedRegistry = Arc<RwLock<Registry>>;

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Add a freshly accepted, not yet authorized connection.
    pub fn register(&mut self, id: ConnectionId, addr: SocketAddr, tx: mpsc::UnboundedSender<Outbound>) {
        self.connections.insert(
            id,
            Connection {
                id,
                addr,
                login_id: None,
                connected_at: Utc::now(),
                tx,
            },
        );
    }

    /// Attach `login_id` to a connection.
    ///
    /// Refused if the connection already has an ID or another connection
    /// is logged in under the same one. A refusal changes nothing.
    pub fn authorize(&mut self, id: ConnectionId, login_id: &str) -> Result<(), HandshakeError> {
        if self
            .connections
            .values()
            .any(|c| c.id != id && c.login_id.as_deref() == Some(login_id))
        {
            return Err(HandshakeError::LoginIdInUse(login_id.to_owned()));
        }

        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(HandshakeError::UnknownConnection(id))?;

        if let Some(existing) = &conn.login_id {
            return Err(HandshakeError::AlreadyLoggedIn(existing.clone()));
        }

        conn.login_id = Some(login_id.to_owned());
        Ok(())
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn login_id(&self, id: ConnectionId) -> Option<&str> {
        self.connections.get(&id)?.login_id.as_deref()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Live connections, logged in or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send `line` to every authorized connection.
    ///
    /// A failed send is logged and skipped. Returns how many recipients
    /// the line was queued for.
    pub fn broadcast(&self, line: &str) -> usize {
        let mut delivered = 0;
        for conn in self.connections.values().filter(|c| c.is_authorized()) {
            if conn.send(line) {
                delivered += 1;
            } else {
                warn!(conn = %conn.id, "broadcast to closed connection dropped");
            }
        }
        delivered
    }

    /// Send `line` to one connection, authorized or not.
    pub fn send_to(&self, id: ConnectionId, line: &str) -> bool {
        self.connections.get(&id).is_some_and(|c| c.send(line))
    }

    /// Ask one connection to close.
    pub fn close(&self, id: ConnectionId) -> bool {
        self.connections.get(&id).is_some_and(|c| c.close())
    }

    /// Ask every connection to close. Returns how many were asked.
    pub fn close_all(&self) -> usize {
        self.connections.values().filter(|c| c.close()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn join(registry: &mut Registry, n: u64) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId(n);
        registry.register(id, addr(), tx);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[test]
    fn new_connections_are_unauthorized() {
        let mut registry = Registry::new();
        let (id, _rx) = join(&mut registry, 1);
        assert!(registry.contains(id));
        assert_eq!(registry.login_id(id), None);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn authorize_sets_login_id_once() {
        let mut registry = Registry::new();
        let (id, _rx) = join(&mut registry, 1);

        registry.authorize(id, "alice").unwrap();
        assert_eq!(registry.login_id(id), Some("alice"));

        assert_eq!(
            registry.authorize(id, "mallory"),
            Err(HandshakeError::AlreadyLoggedIn("alice".into()))
        );
        assert_eq!(registry.login_id(id), Some("alice"));
    }

    #[test]
    fn login_ids_are_unique_among_authorized() {
        let mut registry = Registry::new();
        let (first, _rx1) = join(&mut registry, 1);
        let (second, _rx2) = join(&mut registry, 2);

        registry.authorize(first, "alice").unwrap();
        assert_eq!(
            registry.authorize(second, "alice"),
            Err(HandshakeError::LoginIdInUse("alice".into()))
        );
        assert_eq!(registry.login_id(second), None);

        // Free again once the first holder leaves.
        registry.remove(first);
        registry.authorize(second, "alice").unwrap();
    }

    #[test]
    fn authorize_unknown_connection() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.authorize(ConnectionId(9), "ghost"),
            Err(HandshakeError::UnknownConnection(ConnectionId(9)))
        );
    }

    #[test]
    fn broadcast_skips_unauthorized() {
        let mut registry = Registry::new();
        let (alice, mut alice_rx) = join(&mut registry, 1);
        let (_anon, mut anon_rx) = join(&mut registry, 2);
        registry.authorize(alice, "alice").unwrap();

        assert_eq!(registry.broadcast("hello"), 1);
        assert_eq!(drain(&mut alice_rx), vec![Outbound::Line("hello".into())]);
        assert_eq!(drain(&mut anon_rx), vec![]);
    }

    #[test]
    fn broadcast_survives_dead_recipient() {
        let mut registry = Registry::new();
        let (alice, alice_rx) = join(&mut registry, 1);
        let (bob, mut bob_rx) = join(&mut registry, 2);
        registry.authorize(alice, "alice").unwrap();
        registry.authorize(bob, "bob").unwrap();

        drop(alice_rx);
        assert_eq!(registry.broadcast("still there?"), 1);
        assert_eq!(drain(&mut bob_rx), vec![Outbound::Line("still there?".into())]);
    }

    #[test]
    fn close_all_reaches_everyone() {
        let mut registry = Registry::new();
        let (alice, mut alice_rx) = join(&mut registry, 1);
        let (_anon, mut anon_rx) = join(&mut registry, 2);
        registry.authorize(alice, "alice").unwrap();

        assert_eq!(registry.close_all(), 2);
        assert_eq!(drain(&mut alice_rx), vec![Outbound::Close]);
        assert_eq!(drain(&mut anon_rx), vec![Outbound::Close]);
    }

    #[test]
    fn remove_forgets_connection() {
        let mut registry = Registry::new();
        let (id, _rx) = join(&mut registry, 1);
        registry.authorize(id, "alice").unwrap();

        let gone = registry.remove(id).unwrap();
        assert_eq!(gone.login_id.as_deref(), Some("alice"));
        assert!(!registry.contains(id));
        assert_eq!(registry.connection_count(), 0);
        assert!(!registry.send_to(id, "anyone?"));
    }
}
