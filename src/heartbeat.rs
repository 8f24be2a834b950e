//! Engine heartbeat: server pings, client must pong before the deadline.
//!
//! Pure state: the websocket loop sleeps until [`Heartbeat::next_wakeup`] and
//! then calls [`Heartbeat::poll`]. A missed pong is the idle timeout that moves
//! a connection to `Disconnected`.

use tokio::time::{Duration, Instant};

use crate::config::HeartbeatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// Send a ping now.
    Ping,
    /// The pong deadline passed.
    TimedOut,
    /// Nothing due yet.
    Idle,
}

#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    next_ping: Instant,
    pong_deadline: Option<Instant>,
}

impl Heartbeat {
    #[must_use]
    pub fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            interval: config.ping_interval,
            timeout: config.ping_timeout,
            next_ping: now + config.ping_interval,
            pong_deadline: None,
        }
    }

    /// Earliest instant at which [`Self::poll`] can return something other than `Idle`.
    #[must_use]
    pub fn next_wakeup(&self) -> Instant {
        match self.pong_deadline {
            Some(deadline) => deadline.min(self.next_ping),
            None => self.next_ping,
        }
    }

    pub fn poll(&mut self, now: Instant) -> Beat {
        if let Some(deadline) = self.pong_deadline {
            if now >= deadline {
                return Beat::TimedOut;
            }
        }
        if now >= self.next_ping {
            // An outstanding deadline is kept, not extended.
            self.pong_deadline.get_or_insert(now + self.timeout);
            self.next_ping = now + self.interval;
            return Beat::Ping;
        }
        Beat::Idle
    }

    pub fn on_pong(&mut self) {
        self.pong_deadline = None;
    }

    #[must_use]
    pub fn awaiting_pong(&self) -> bool {
        self.pong_deadline.is_some()
    }
}

#[cfg(test)]
#[path = "heartbeat_test.rs"]
mod tests;
