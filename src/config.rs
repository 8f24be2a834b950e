//! Relay configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 4096;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1_000_000;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;
pub const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 20_000;

pub const DEFAULT_PER_CONNECTION_LIMIT: usize = 30;
pub const DEFAULT_PER_CONNECTION_WINDOW_SECS: u64 = 10;
pub const DEFAULT_GLOBAL_LIMIT: usize = 1000;
pub const DEFAULT_GLOBAL_WINDOW_SECS: u64 = 1;

/// Upper bound for heartbeat timings; larger values would overflow deadline
/// arithmetic on `Instant`.
pub const MAX_HEARTBEAT_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error("{var} must be at most {max}")]
    TooLarge { var: &'static str, max: u64 },
    #[error("RELAY_MAX_CONTENT_BYTES ({content}) exceeds RELAY_MAX_PAYLOAD_BYTES ({payload})")]
    ContentExceedsPayload { content: usize, payload: usize },
}

/// Heartbeat timings advertised in the engine handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

/// Sliding-window message limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_connection_limit: usize,
    pub per_connection_window: Duration,
    pub global_limit: usize,
    pub global_window: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
    /// Upper bound on `content`, in UTF-8 bytes.
    pub max_content_bytes: usize,
    /// Upper bound on a single websocket text frame.
    pub max_payload_bytes: usize,
    /// Bounded queue size for each connection's outbound packets.
    pub outbox_capacity: usize,
    pub heartbeat: HeartbeatConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            heartbeat: HeartbeatConfig {
                ping_interval: Duration::from_millis(DEFAULT_PING_INTERVAL_MS),
                ping_timeout: Duration::from_millis(DEFAULT_PING_TIMEOUT_MS),
            },
            rate_limit: RateLimitConfig {
                per_connection_limit: DEFAULT_PER_CONNECTION_LIMIT,
                per_connection_window: Duration::from_secs(DEFAULT_PER_CONNECTION_WINDOW_SECS),
                global_limit: DEFAULT_GLOBAL_LIMIT,
                global_window: Duration::from_secs(DEFAULT_GLOBAL_WINDOW_SECS),
            },
        }
    }
}

impl RelayConfig {
    /// Build typed relay config from environment variables.
    ///
    /// Every variable is optional:
    /// - `PORT`: default 3000
    /// - `RELAY_MAX_CONTENT_BYTES`: default 4096
    /// - `RELAY_MAX_PAYLOAD_BYTES`: default 1000000
    /// - `RELAY_OUTBOX_CAPACITY`: default 256
    /// - `RELAY_PING_INTERVAL_MS` / `RELAY_PING_TIMEOUT_MS`: default 25000 / 20000
    /// - `RELAY_RATE_LIMIT_PER_CONNECTION` / `..._WINDOW_SECS`: default 30 / 10
    /// - `RELAY_RATE_LIMIT_GLOBAL` / `..._WINDOW_SECS`: default 1000 / 1
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but does not parse, if a
    /// size or interval is zero, if a heartbeat timing exceeds
    /// [`MAX_HEARTBEAT_MS`], or if the content limit exceeds the payload limit.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = parse_var(&lookup, "PORT", DEFAULT_PORT)?;
        let max_content_bytes = parse_nonzero(&lookup, "RELAY_MAX_CONTENT_BYTES", DEFAULT_MAX_CONTENT_BYTES)?;
        let max_payload_bytes = parse_nonzero(&lookup, "RELAY_MAX_PAYLOAD_BYTES", DEFAULT_MAX_PAYLOAD_BYTES)?;
        let outbox_capacity = parse_nonzero(&lookup, "RELAY_OUTBOX_CAPACITY", DEFAULT_OUTBOX_CAPACITY)?;

        let heartbeat = HeartbeatConfig {
            ping_interval: parse_heartbeat_ms(&lookup, "RELAY_PING_INTERVAL_MS", DEFAULT_PING_INTERVAL_MS)?,
            ping_timeout: parse_heartbeat_ms(&lookup, "RELAY_PING_TIMEOUT_MS", DEFAULT_PING_TIMEOUT_MS)?,
        };
        if max_content_bytes > max_payload_bytes {
            return Err(ConfigError::ContentExceedsPayload { content: max_content_bytes, payload: max_payload_bytes });
        }

        let rate_limit = RateLimitConfig {
            per_connection_limit: parse_nonzero(
                &lookup,
                "RELAY_RATE_LIMIT_PER_CONNECTION",
                DEFAULT_PER_CONNECTION_LIMIT,
            )?,
            per_connection_window: Duration::from_secs(parse_nonzero(
                &lookup,
                "RELAY_RATE_LIMIT_PER_CONNECTION_WINDOW_SECS",
                DEFAULT_PER_CONNECTION_WINDOW_SECS,
            )?),
            global_limit: parse_nonzero(&lookup, "RELAY_RATE_LIMIT_GLOBAL", DEFAULT_GLOBAL_LIMIT)?,
            global_window: Duration::from_secs(parse_nonzero(
                &lookup,
                "RELAY_RATE_LIMIT_GLOBAL_WINDOW_SECS",
                DEFAULT_GLOBAL_WINDOW_SECS,
            )?),
        };

        Ok(Self { port, max_content_bytes, max_payload_bytes, outbox_capacity, heartbeat, rate_limit })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { var, value: raw })
}

fn parse_nonzero<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let value = parse_var(lookup, var, default)?;
    if value == T::default() {
        return Err(ConfigError::Zero { var });
    }
    Ok(value)
}

fn parse_heartbeat_ms(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let ms = parse_nonzero(lookup, var, default)?;
    if ms > MAX_HEARTBEAT_MS {
        return Err(ConfigError::TooLarge { var, max: MAX_HEARTBEAT_MS });
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
