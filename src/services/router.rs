//! Fan-out router: stamps server metadata and computes the delivery set.
//!
//! DESIGN
//! ======
//! `route` takes one registry read lock for both the sender identity lookup
//! and the recipient snapshot, so a delivery set never mixes registry states.
//! The router only computes; pushing to recipients belongs to the websocket
//! dispatch layer.
//!
//! Public messages go to every live connection including the sender. Private
//! messages go to the sender only: the payload has no target field.
//!
//! Timestamps come from the wall clock but never move backwards: each stamp is
//! the max of "now" and the previous stamp.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

use super::registry::{Connection, Outbox, Registry, RegistryError};
use super::validator::MessagePayload;

// =============================================================================
// TYPES
// =============================================================================

/// Outbound `message` event body. Immutable once stamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub client: String,
    pub content: String,
    pub public: bool,
}

impl MessageResponse {
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "timestamp": self.timestamp,
            "client": self.client,
            "content": self.content,
            "public": self.public,
        })
    }
}

/// One recipient captured in a delivery snapshot.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub connection_id: Uuid,
    pub outbox: Outbox,
}

impl From<&Connection> for Recipient {
    fn from(conn: &Connection) -> Self {
        Self { connection_id: conn.connection_id, outbox: conn.outbox.clone() }
    }
}

/// Recipients of one message, as of the moment it was routed.
#[derive(Debug, Clone, Default)]
pub struct DeliverySet {
    recipients: Vec<Recipient>,
}

impl DeliverySet {
    #[cfg(test)]
    #[must_use]
    pub fn connection_ids(&self) -> std::collections::HashSet<Uuid> {
        self.recipients.iter().map(|r| r.connection_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Routed {
    pub response: MessageResponse,
    pub delivery: DeliverySet,
}

// =============================================================================
// ROUTER
// =============================================================================

#[derive(Clone)]
pub struct FanoutRouter {
    registry: Registry,
    last_stamp_ms: Arc<AtomicI64>,
}

impl FanoutRouter {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self { registry, last_stamp_ms: Arc::new(AtomicI64::new(0)) }
    }

    /// Stamp `payload` and compute who receives it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unknown`] if the sender is no longer live.
    pub async fn route(&self, sender: Uuid, payload: MessagePayload) -> Result<Routed, RegistryError> {
        self.route_at(sender, payload, now_ms()).await
    }

    /// Internal: route with an explicit wall-clock reading (for testing).
    pub(crate) async fn route_at(
        &self,
        sender: Uuid,
        payload: MessagePayload,
        now_ms: i64,
    ) -> Result<Routed, RegistryError> {
        let live = self.registry.snapshot().await;
        let Some(origin) = live.get(&sender) else {
            return Err(RegistryError::Unknown(sender));
        };

        let recipients = if payload.public {
            live.values().map(Recipient::from).collect()
        } else {
            vec![Recipient::from(origin)]
        };

        let response = MessageResponse {
            id: Uuid::new_v4().to_string(),
            timestamp: format_timestamp(self.stamp(now_ms)),
            client: origin.client_identity.clone(),
            content: payload.content,
            public: payload.public,
        };

        Ok(Routed { response, delivery: DeliverySet { recipients } })
    }

    fn stamp(&self, now_ms: i64) -> i64 {
        let previous = self.last_stamp_ms.fetch_max(now_ms, Ordering::SeqCst);
        previous.max(now_ms)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

/// RFC 3339 rendering of epoch millis, always with three fractional digits.
/// Falls back to the raw millis if the value is outside the representable range.
fn format_timestamp(ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|dt| {
            dt.format(format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
            ))
            .ok()
        })
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
