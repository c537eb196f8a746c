//! In-memory connection registry.
//!
//! Tracks every open WebSocket session and the identity each one has
//! registered, making the registry the single source of truth for who is
//! currently reachable.  It is an explicitly owned object constructed at
//! startup and handed to every handler; there is no ambient global state.
//!
//! Liveness is purely in-memory: the registry is rebuilt from registrations
//! each session.  The durable `users` table only records the last-known
//! connection id for a separate historical retrieval path.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use courier_shared::protocol::ServerEvent;
use courier_shared::types::Identity;

/// Process-unique id assigned to every accepted connection.
pub type ConnectionId = Uuid;

/// A live connection: its id plus the channel frames are written through.
///
/// Cheap to clone; sends are fire-and-forget.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Enqueue an event for delivery.  Returns `false` if the connection's
    /// writer has already gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Default)]
struct RegistryInner {
    /// Every open session, registered or not.  Broadcasts go to all of them.
    sessions: HashMap<ConnectionId, ConnectionHandle>,
    /// Identity -> live handle.  Exactly one per identity; a later
    /// registration overwrites the earlier handle (last-registered-wins).
    by_identity: HashMap<Identity, ConnectionHandle>,
    /// Connection id -> identity.  Secondary index so disconnect is a map
    /// lookup instead of a scan over `by_identity`.
    by_connection: HashMap<ConnectionId, Identity>,
}

/// Process-wide directory of live connections.
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Track a newly accepted session.  Called before any registration.
    pub async fn attach_session(&self, handle: ConnectionHandle) {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(handle.id(), handle);
    }

    /// Stop tracking a closed session.
    pub async fn detach_session(&self, id: ConnectionId) {
        let mut inner = self.inner.write().await;
        inner.sessions.remove(&id);
    }

    /// Bind an identity to a connection.  Always succeeds.
    ///
    /// A later registration for the same identity overwrites the earlier
    /// handle, and a connection re-registering under a new identity drops
    /// its previous binding.
    pub async fn register(&self, identity: &str, handle: ConnectionHandle) {
        let mut inner = self.inner.write().await;

        // This connection may already carry a different identity.
        if let Some(previous) = inner.by_connection.remove(&handle.id()) {
            inner.by_identity.remove(&previous);
        }

        // The identity may already be bound to a different connection;
        // last-registered-wins, so evict the stale reverse entry.
        if let Some(stale) = inner.by_identity.insert(identity.to_string(), handle.clone()) {
            inner.by_connection.remove(&stale.id());
        }

        inner.by_connection.insert(handle.id(), identity.to_string());

        debug!(identity = %identity, connection = %handle.id(), "identity registered");
    }

    /// Remove whatever identity the given connection registered.
    ///
    /// Idempotent: unknown connections are a no-op.  Returns the identity
    /// that was removed, if any.
    pub async fn unregister_by_connection(&self, id: ConnectionId) -> Option<Identity> {
        let mut inner = self.inner.write().await;

        let identity = inner.by_connection.remove(&id)?;

        // Only drop the identity binding if it still points at this
        // connection; a concurrent re-registration may have won already.
        if inner
            .by_identity
            .get(&identity)
            .is_some_and(|h| h.id() == id)
        {
            inner.by_identity.remove(&identity);
        }

        debug!(identity = %identity, connection = %id, "identity unregistered");
        Some(identity)
    }

    /// Look up the live handle for an identity.  Absence means "not
    /// currently reachable", not an error.
    pub async fn lookup(&self, identity: &str) -> Option<ConnectionHandle> {
        let inner = self.inner.read().await;
        inner.by_identity.get(identity).cloned()
    }

    /// The set of currently reachable identities, sorted for stable output.
    pub async fn online(&self) -> Vec<Identity> {
        let inner = self.inner.read().await;
        let mut identities: Vec<Identity> = inner.by_identity.keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Send an event to every open session, registered or not.
    pub async fn broadcast(&self, event: ServerEvent) {
        let inner = self.inner.read().await;
        for handle in inner.sessions.values() {
            handle.send(event.clone());
        }
    }

    /// Broadcast the current online-set to every session.  Called after
    /// every registration and disconnect.
    pub async fn broadcast_online(&self) {
        let online = self.online().await;
        self.broadcast(ServerEvent::OnlineUsers(online)).await;
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    #[tokio::test]
    async fn register_is_last_wins() {
        let registry = Registry::new();
        let (first, _rx1) = test_handle();
        let (second, mut rx2) = test_handle();

        registry.register("a@x.com", first.clone()).await;
        registry.register("a@x.com", second.clone()).await;

        let handle = registry.lookup("a@x.com").await.unwrap();
        assert_eq!(handle.id(), second.id());

        handle.send(ServerEvent::OnlineUsers(vec![]));
        assert!(rx2.try_recv().is_ok());

        // The stale connection no longer maps to the identity.
        assert!(registry.unregister_by_connection(first.id()).await.is_none());
        assert_eq!(registry.online().await, vec!["a@x.com".to_string()]);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = Registry::new();
        let (handle, _rx) = test_handle();

        registry.register("a@x.com", handle.clone()).await;

        assert_eq!(
            registry.unregister_by_connection(handle.id()).await,
            Some("a@x.com".to_string())
        );
        assert_eq!(registry.unregister_by_connection(handle.id()).await, None);
        assert_eq!(registry.unregister_by_connection(Uuid::new_v4()).await, None);

        assert!(registry.online().await.is_empty());
    }

    #[tokio::test]
    async fn online_reflects_live_handles() {
        let registry = Registry::new();
        let (a, _rxa) = test_handle();
        let (b, _rxb) = test_handle();

        registry.register("b@x.com", b.clone()).await;
        registry.register("a@x.com", a.clone()).await;
        assert_eq!(
            registry.online().await,
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );

        registry.unregister_by_connection(a.id()).await;
        assert_eq!(registry.online().await, vec!["b@x.com".to_string()]);
    }

    #[tokio::test]
    async fn reregistering_connection_drops_old_identity() {
        let registry = Registry::new();
        let (handle, _rx) = test_handle();

        registry.register("a@x.com", handle.clone()).await;
        registry.register("b@x.com", handle.clone()).await;

        assert!(registry.lookup("a@x.com").await.is_none());
        assert!(registry.lookup("b@x.com").await.is_some());
        assert_eq!(registry.online().await, vec!["b@x.com".to_string()]);
    }

    #[tokio::test]
    async fn broadcast_reaches_unregistered_sessions() {
        let registry = Registry::new();
        let (registered, mut rx1) = test_handle();
        let (anonymous, mut rx2) = test_handle();

        registry.attach_session(registered.clone()).await;
        registry.attach_session(anonymous.clone()).await;
        registry.register("a@x.com", registered).await;

        registry.broadcast_online().await;

        assert_eq!(
            rx1.try_recv().unwrap(),
            ServerEvent::OnlineUsers(vec!["a@x.com".to_string()])
        );
        assert_eq!(
            rx2.try_recv().unwrap(),
            ServerEvent::OnlineUsers(vec!["a@x.com".to_string()])
        );
    }
}
