//! Relay core services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! Leaves first: `registry` and `validator` depend on nothing, `router` reads
//! the registry, `ack` reports outcomes, and `session` drives one
//! connection's lifecycle against the registry. The websocket route composes
//! them and owns every outbound push.

pub mod ack;
pub mod registry;
pub mod router;
pub mod session;
pub mod validator;
