//! Connection registry: the single authority over live connections.
//!
//! DESIGN
//! ======
//! Live connections are kept in a `HashMap<Uuid, Connection>` behind one
//! `tokio::sync::RwLock`. Mutations take the write lock, everything else reads.
//! Each entry owns the sending half of the connection's outbound queue, so a
//! snapshot taken under the read lock is enough to deliver to every recipient
//! without touching the map again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, mpsc};
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use packets::Packet;

use super::ack::ErrorCode;

/// Sending half of a connection's bounded outbound packet queue.
pub type Outbox = mpsc::Sender<Packet>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection already registered: {0}")]
    Duplicate(Uuid),
    #[error("unknown connection: {0}")]
    Unknown(Uuid),
}

impl ErrorCode for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Duplicate(_) => "E_DUPLICATE_CONNECTION",
            Self::Unknown(_) => "E_UNKNOWN_CONNECTION",
        }
    }
}

/// One live connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: Uuid,
    /// Name stamped on this connection's messages as `client`.
    pub client_identity: String,
    pub connected_at: Instant,
    pub outbox: Outbox,
}

#[derive(Clone, Default)]
pub struct Registry {
    live: Arc<RwLock<HashMap<Uuid, Connection>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if `connection_id` is already live.
    /// The existing entry is left untouched.
    pub async fn register(
        &self,
        connection_id: Uuid,
        client_identity: impl Into<String>,
        outbox: Outbox,
    ) -> Result<(), RegistryError> {
        let mut live = self.live.write().await;
        if live.contains_key(&connection_id) {
            return Err(RegistryError::Duplicate(connection_id));
        }
        let client_identity = client_identity.into();
        info!(%connection_id, client = %client_identity, live = live.len() + 1, "registry: connection registered");
        live.insert(
            connection_id,
            Connection { connection_id, client_identity, connected_at: Instant::now(), outbox },
        );
        Ok(())
    }

    /// Remove a connection. Returns whether an entry was removed; removing an
    /// absent id is a no-op.
    pub async fn unregister(&self, connection_id: Uuid) -> bool {
        let mut live = self.live.write().await;
        let Some(conn) = live.remove(&connection_id) else {
            return false;
        };
        info!(
            %connection_id,
            live = live.len(),
            connected_for_ms = conn.connected_at.elapsed().as_millis(),
            "registry: connection unregistered"
        );
        true
    }

    /// Snapshot of live connection ids.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn list_live(&self) -> HashSet<Uuid> {
        self.live.read().await.keys().copied().collect()
    }

    /// Identity of a live connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unknown`] if the connection is not live.
    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn identity_of(&self, connection_id: Uuid) -> Result<String, RegistryError> {
        self.live
            .read()
            .await
            .get(&connection_id)
            .map(|c| c.client_identity.clone())
            .ok_or(RegistryError::Unknown(connection_id))
    }

    pub async fn len(&self) -> usize {
        self.live.read().await.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub async fn is_empty(&self) -> bool {
        self.live.read().await.is_empty()
    }

    /// Hold the read lock so several lookups see the same state.
    pub(crate) async fn snapshot(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Connection>> {
        self.live.read().await
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
