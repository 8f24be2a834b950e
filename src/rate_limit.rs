//! In-memory rate limiting for relayed messages.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<Uuid, VecDeque<Instant>>`.
//! Two limits are enforced before a message is routed:
//! - Per-connection: `per_connection_limit` messages per window
//! - Global: `global_limit` messages per window across all connections
//!
//! A rejected message is not recorded, so it does not eat into the window.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::RateLimitConfig;
use crate::services::ack::ErrorCode;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum RateLimitError {
    #[error("per-connection rate limit exceeded (max {limit} messages/{window_secs}s)")]
    PerConnectionExceeded { limit: usize, window_secs: u64 },
    #[error("global rate limit exceeded (max {limit} messages/{window_secs}s)")]
    GlobalExceeded { limit: usize, window_secs: u64 },
}

impl ErrorCode for RateLimitError {
    fn error_code(&self) -> &'static str {
        "E_RATE_LIMITED"
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
    config: RateLimitConfig,
}

#[derive(Default)]
struct RateLimiterInner {
    /// Per-connection message timestamps.
    connection_messages: HashMap<Uuid, VecDeque<Instant>>,
    /// Global message timestamps.
    global_messages: VecDeque<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self { inner: Arc::new(Mutex::new(RateLimiterInner::default())), config }
    }

    /// Check both per-connection and global limits, then record the message.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] naming whichever limit is exhausted.
    pub fn check_and_record(&self, connection_id: Uuid) -> Result<(), RateLimitError> {
        self.check_and_record_at(connection_id, Instant::now())
    }

    /// Internal: check + record with explicit timestamp (for testing).
    fn check_and_record_at(&self, connection_id: Uuid, now: Instant) -> Result<(), RateLimitError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let cfg = self.config;

        // Global window first; `history` below holds the guard mutably.
        prune_window(&mut inner.global_messages, now, cfg.global_window);
        if inner.global_messages.len() >= cfg.global_limit {
            return Err(RateLimitError::GlobalExceeded {
                limit: cfg.global_limit,
                window_secs: cfg.global_window.as_secs(),
            });
        }

        let history = inner.connection_messages.entry(connection_id).or_default();
        prune_window(history, now, cfg.per_connection_window);
        if history.len() >= cfg.per_connection_limit {
            return Err(RateLimitError::PerConnectionExceeded {
                limit: cfg.per_connection_limit,
                window_secs: cfg.per_connection_window.as_secs(),
            });
        }

        history.push_back(now);
        inner.global_messages.push_back(now);

        Ok(())
    }

    /// Drop a connection's history once it disconnects.
    pub fn forget(&self, connection_id: Uuid) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.connection_messages.remove(&connection_id);
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
