//! Per-connection lifecycle: `Connecting -> Connected -> Disconnected`.
//!
//! ARCHITECTURE
//! ============
//! A websocket opens in `Connecting` (engine handshake done, namespace CONNECT
//! pending). The namespace CONNECT registers the connection and moves it to
//! `Connected`. Transport close, client DISCONNECT, or heartbeat timeout move
//! it to `Disconnected`, which is terminal: the registry entry is removed and
//! nothing moves it back.
//!
//! Message handling asks [`Session::connected`] for the live socket, so a
//! message outside `Connected` is rejected instead of mishandled.

use std::fmt::Write;

use rand::Rng;
use serde_json::Value;
use uuid::Uuid;

use super::ack::ErrorCode;
use super::registry::{Outbox, Registry, RegistryError};

/// Longest accepted client name, in characters.
pub const MAX_IDENTITY_CHARS: usize = 64;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a random 10-byte hex session id (20 chars, like Socket.IO's).
#[must_use]
pub fn generate_sid() -> String {
    let bytes: [u8; 10] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("not connected (state: {0})")]
    NotConnected(&'static str),
    #[error("socket already connected")]
    AlreadyConnected,
    #[error("connection is closed")]
    Closed,
}

impl ErrorCode for StateError {
    fn error_code(&self) -> &'static str {
        "E_INVALID_STATE"
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("invalid client name: {0}")]
    InvalidIdentity(&'static str),
}

impl ErrorCode for HandshakeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::State(e) => e.error_code(),
            Self::Registry(e) => e.error_code(),
            Self::InvalidIdentity(_) => "E_INVALID_IDENTITY",
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

/// A socket that completed the namespace handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    pub connection_id: Uuid,
    /// Public id sent back in the CONNECT reply.
    pub socket_id: String,
    pub client_identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected(SocketInfo),
    Disconnected,
}

impl ConnectionState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected(_) => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug)]
pub struct Session {
    engine_sid: String,
    state: ConnectionState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self { engine_sid: generate_sid(), state: ConnectionState::Connecting }
    }

    #[must_use]
    pub fn engine_sid(&self) -> &str {
        &self.engine_sid
    }

    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// `Connecting -> Connected`. Registers the connection.
    ///
    /// # Errors
    ///
    /// - [`StateError::AlreadyConnected`] / [`StateError::Closed`] outside `Connecting`.
    /// - [`RegistryError::Duplicate`] if the registry rejects the id.
    pub async fn connect(
        &mut self,
        registry: &Registry,
        client_identity: Option<String>,
        outbox: Outbox,
    ) -> Result<SocketInfo, HandshakeError> {
        match self.state {
            ConnectionState::Connecting => {}
            ConnectionState::Connected(_) => return Err(StateError::AlreadyConnected.into()),
            ConnectionState::Disconnected => return Err(StateError::Closed.into()),
        }

        let connection_id = Uuid::new_v4();
        let socket_id = generate_sid();
        let client_identity = client_identity.unwrap_or_else(|| socket_id.clone());
        registry
            .register(connection_id, client_identity.clone(), outbox)
            .await?;

        let info = SocketInfo { connection_id, socket_id, client_identity };
        self.state = ConnectionState::Connected(info.clone());
        Ok(info)
    }

    /// The live socket, if the session is `Connected`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotConnected`] naming the current state otherwise.
    pub fn connected(&self) -> Result<&SocketInfo, StateError> {
        match &self.state {
            ConnectionState::Connected(info) => Ok(info),
            other => Err(StateError::NotConnected(other.name())),
        }
    }

    /// Any state `-> Disconnected`. Unregisters if the socket was connected and
    /// returns it. Calling again is a no-op.
    pub async fn disconnect(&mut self, registry: &Registry) -> Option<SocketInfo> {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Disconnected);
        let ConnectionState::Connected(info) = previous else {
            return None;
        };
        registry.unregister(info.connection_id).await;
        Some(info)
    }
}

/// Client name from the CONNECT auth object, if one was offered.
///
/// # Errors
///
/// Returns [`HandshakeError::InvalidIdentity`] if `name` is present but not a
/// non-blank string of at most [`MAX_IDENTITY_CHARS`] characters.
pub fn identity_from_auth(auth: Option<&Value>) -> Result<Option<String>, HandshakeError> {
    let Some(name) = auth.and_then(|a| a.get("name")) else {
        return Ok(None);
    };
    let Some(name) = name.as_str() else {
        return Err(HandshakeError::InvalidIdentity("name must be a string"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(HandshakeError::InvalidIdentity("name must not be empty"));
    }
    if name.chars().count() > MAX_IDENTITY_CHARS {
        return Err(HandshakeError::InvalidIdentity("name too long"));
    }
    Ok(Some(name.to_owned()))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
