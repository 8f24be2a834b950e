//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the relay config, the connection registry, the fan-out router (which
//! shares the registry), and the message rate limiter. Everything is
//! in-memory; nothing survives a restart.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::rate_limit::RateLimiter;
use crate::services::registry::Registry;
use crate::services::router::FanoutRouter;

/// Shared application state. Clone is required by Axum, so all inner fields
/// are Arc-wrapped or cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub registry: Registry,
    pub router: FanoutRouter,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        let registry = Registry::new();
        let router = FanoutRouter::new(registry.clone());
        let rate_limiter = RateLimiter::new(config.rate_limit);
        Self { config: Arc::new(config), registry, router, rate_limiter }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
