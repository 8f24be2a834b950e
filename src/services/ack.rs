//! Delivery acknowledgment back to the sending connection.
//!
//! DESIGN
//! ======
//! Socket.IO acks are addressed by the ack id the client attached to its
//! event. An ack is only ever written to the sender's own outbox, after the
//! fan-out pushes, so the sender observes its echo before the callback fires.
//!
//! - Success: ack with no arguments (`undefined` in the client callback).
//! - Failure: ack with one `{message, code}` object.
//!
//! A sender that disconnected before its ack is written simply loses the ack.

use serde_json::{Value, json};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use packets::Packet;

use super::registry::Outbox;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code carried in ack error objects.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("message could not be queued for the sender")]
    RecipientUnreachable(Uuid),
}

impl ErrorCode for DeliveryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::RecipientUnreachable(_) => "E_RECIPIENT_UNREACHABLE",
        }
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ValidationFailed,
    InvalidState,
    RateLimited,
    RecipientUnreachable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: FailureReason,
    pub code: &'static str,
    pub message: String,
}

impl Failure {
    #[must_use]
    pub fn from_error(reason: FailureReason, err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { reason, code: err.error_code(), message: err.to_string() }
    }

    /// Error object handed to the client callback.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({ "message": self.message, "code": self.code })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(Failure),
}

// =============================================================================
// DELIVERY REPORT
// =============================================================================

/// Why a push to one recipient failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unreachable {
    /// The recipient's task is gone (disconnected after the snapshot).
    Closed,
    /// The recipient's outbox is full.
    Full,
}

impl<T> From<&TrySendError<T>> for Unreachable {
    fn from(err: &TrySendError<T>) -> Self {
        match err {
            TrySendError::Closed(_) => Self::Closed,
            TrySendError::Full(_) => Self::Full,
        }
    }
}

/// Result of pushing one message to every recipient in its delivery set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<Uuid>,
    pub unreachable: Vec<(Uuid, Unreachable)>,
}

impl DeliveryReport {
    /// Partial failures still count as success as long as the sender's own
    /// echo was queued.
    #[must_use]
    pub fn outcome(&self, sender: Uuid) -> Outcome {
        if self.delivered.contains(&sender) {
            Outcome::Success
        } else {
            Outcome::Failure(Failure::from_error(
                FailureReason::RecipientUnreachable,
                &DeliveryError::RecipientUnreachable(sender),
            ))
        }
    }
}

// =============================================================================
// ACKNOWLEDGE
// =============================================================================

/// What happened to an acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDelivery {
    Sent,
    /// The client emitted without a callback.
    NotRequested,
    /// The sender's outbox is closed or full.
    Dropped,
}

/// Send exactly one acknowledgment to the originating connection.
pub fn acknowledge(outbox: &Outbox, ack_id: Option<u64>, outcome: &Outcome) -> AckDelivery {
    let Some(ack_id) = ack_id else {
        if let Outcome::Failure(failure) = outcome {
            debug!(reason = ?failure.reason, code = failure.code, message = %failure.message, "ack: failure without callback");
        }
        return AckDelivery::NotRequested;
    };

    let args = match outcome {
        Outcome::Success => Vec::new(),
        Outcome::Failure(failure) => vec![failure.to_value()],
    };

    match outbox.try_send(Packet::ack(ack_id, args)) {
        Ok(()) => AckDelivery::Sent,
        Err(TrySendError::Closed(_)) => {
            debug!(ack_id, "ack: sender gone, dropping");
            AckDelivery::Dropped
        }
        Err(TrySendError::Full(_)) => {
            warn!(ack_id, "ack: sender outbox full, dropping");
            AckDelivery::Dropped
        }
    }
}

#[cfg(test)]
#[path = "ack_test.rs"]
mod tests;
