//! WebSocket handler: Socket.IO relay over one websocket per client.
//!
//! DESIGN
//! ======
//! The upgrade handler checks the Engine.IO handshake query, then each socket
//! runs one task with a `select!` loop over:
//! - Incoming client text → engine decode → socket packet dispatch
//! - Packets queued on the connection's outbox → encode → websocket
//! - Heartbeat timer → ping, or close on a missed pong
//!
//! One task per connection means a sender's messages are validated, routed
//! and pushed strictly in arrival order. Pushes go into each recipient's
//! bounded outbox with `try_send`, so a slow or vanished recipient never
//! blocks the sender or the other recipients.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send engine `open` with heartbeat timings
//! 2. Namespace CONNECT → register → reply CONNECT with the socket id
//! 3. `message` events → validate → route → fan out → ack the sender
//! 4. Close, DISCONNECT or heartbeat timeout → unregister

use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use packets::{DEFAULT_NAMESPACE, EnginePacket, Handshake, Packet, PacketType};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::heartbeat::{Beat, Heartbeat};
use crate::services::ack::{self, DeliveryReport, Failure, FailureReason, Outcome, Unreachable};
use crate::services::registry::Outbox;
use crate::services::router::Routed;
use crate::services::session::{self, HandshakeError, Session};
use crate::services::validator::{self, ValidationError};
use crate::state::AppState;

/// The one event name the relay accepts and emits.
pub const MESSAGE_EVENT: &str = "message";

const ENGINE_PROTOCOL: &str = "4";
const WEBSOCKET_TRANSPORT: &str = "websocket";

// =============================================================================
// UPGRADE
// =============================================================================

/// Engine.IO handshake query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "EIO")]
    pub eio: Option<String>,
    pub transport: Option<String>,
    pub sid: Option<String>,
}

/// Engine.IO handshake rejections, answered with HTTP 400 and a
/// `{code, message}` body the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRejection {
    TransportUnknown,
    SessionIdUnknown,
    BadRequest,
    UnsupportedProtocolVersion,
}

impl EngineRejection {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::TransportUnknown => 0,
            Self::SessionIdUnknown => 1,
            Self::BadRequest => 3,
            Self::UnsupportedProtocolVersion => 5,
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::TransportUnknown => "Transport unknown",
            Self::SessionIdUnknown => "Session ID unknown",
            Self::BadRequest => "Bad request",
            Self::UnsupportedProtocolVersion => "Unsupported protocol version",
        }
    }
}

impl IntoResponse for EngineRejection {
    fn into_response(self) -> Response {
        let body = json!({ "code": self.code(), "message": self.message() });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Only fresh websocket sessions speaking Engine.IO v4 are accepted; there is
/// no polling transport to resume, so any `sid` is unknown.
///
/// # Errors
///
/// Returns the [`EngineRejection`] to answer the upgrade request with.
pub fn check_handshake(query: &HandshakeQuery) -> Result<(), EngineRejection> {
    if query.transport.as_deref() != Some(WEBSOCKET_TRANSPORT) {
        return Err(EngineRejection::TransportUnknown);
    }
    if query.sid.is_some() {
        return Err(EngineRejection::SessionIdUnknown);
    }
    if query.eio.as_deref() != Some(ENGINE_PROTOCOL) {
        return Err(EngineRejection::UnsupportedProtocolVersion);
    }
    Ok(())
}

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(rejection) = check_handshake(&query) {
        debug!(?query, code = rejection.code(), "ws: handshake rejected");
        return rejection.into_response();
    }
    let ws = match ws {
        Ok(ws) => ws,
        Err(e) => {
            debug!(error = %e, "ws: not a websocket upgrade");
            return EngineRejection::BadRequest.into_response();
        }
    };

    let max = state.config.max_payload_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Whether the socket loop keeps running after an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let mut session = Session::new();
    let (client_tx, mut client_rx) = mpsc::channel::<Packet>(state.config.outbox_capacity);

    let open = EnginePacket::Open(handshake(&state, session.engine_sid()));
    if send_engine(&mut socket, &open).await.is_err() {
        return;
    }
    info!(engine_sid = %session.engine_sid(), "ws: transport opened");

    let mut heartbeat = Heartbeat::new(state.config.heartbeat, Instant::now());
    let mut reason = "transport closed";

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let flow = process_inbound_text(&state, &mut session, &mut heartbeat, &client_tx, text.as_str()).await;
                        if flow == Flow::Close {
                            reason = "engine close";
                            break;
                        }
                    }
                    Message::Binary(_) => {
                        warn!(engine_sid = %session.engine_sid(), "ws: binary frame ignored");
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(packet) = client_rx.recv() => {
                if send_engine(&mut socket, &EnginePacket::message(&packet)).await.is_err() {
                    reason = "send failed";
                    break;
                }
            }
            () = tokio::time::sleep_until(heartbeat.next_wakeup()) => {
                match heartbeat.poll(Instant::now()) {
                    Beat::Ping => {
                        debug!(engine_sid = %session.engine_sid(), "ws: ping");
                        if send_engine(&mut socket, &EnginePacket::Ping(String::new())).await.is_err() {
                            reason = "send failed";
                            break;
                        }
                    }
                    Beat::TimedOut => {
                        debug!(engine_sid = %session.engine_sid(), "ws: pong deadline missed");
                        reason = "ping timeout";
                        break;
                    }
                    Beat::Idle => {}
                }
            }
        }
    }

    close_session(&state, &mut session, reason).await;
    info!(engine_sid = %session.engine_sid(), reason, "ws: transport closed");
}

fn handshake(state: &AppState, sid: &str) -> Handshake {
    let heartbeat = state.config.heartbeat;
    Handshake {
        sid: sid.to_owned(),
        upgrades: Vec::new(),
        ping_interval: millis(heartbeat.ping_interval),
        ping_timeout: millis(heartbeat.ping_timeout),
        max_payload: u64::try_from(state.config.max_payload_bytes).unwrap_or(u64::MAX),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Move the session to `Disconnected` and drop its rate-limit history.
async fn close_session(state: &AppState, session: &mut Session, reason: &str) {
    if let Some(socket) = session.disconnect(&state.registry).await {
        state.rate_limiter.forget(socket.connection_id);
        info!(
            connection_id = %socket.connection_id,
            socket_id = %socket.socket_id,
            reason,
            "ws: socket disconnected"
        );
    }
}

// =============================================================================
// INBOUND DISPATCH
// =============================================================================

/// Parse and process one inbound text frame.
///
/// Everything the connection sends back (CONNECT replies, echoes, acks) goes
/// through `outbox`, the same queue peers push into, so transport concerns
/// stay in [`run_ws`] and tests can drive dispatch with plain channels.
async fn process_inbound_text(
    state: &AppState,
    session: &mut Session,
    heartbeat: &mut Heartbeat,
    outbox: &Outbox,
    text: &str,
) -> Flow {
    let packet = match packets::decode_engine(text) {
        Ok(p) => p,
        Err(e) => {
            warn!(engine_sid = %session.engine_sid(), error = %e, "ws: invalid engine packet");
            return Flow::Continue;
        }
    };

    match packet {
        EnginePacket::Message(body) => handle_socket_packet(state, session, outbox, &body).await,
        EnginePacket::Pong(_) => {
            if !heartbeat.awaiting_pong() {
                debug!(engine_sid = %session.engine_sid(), "ws: pong without outstanding ping");
            }
            heartbeat.on_pong();
            Flow::Continue
        }
        EnginePacket::Close => Flow::Close,
        EnginePacket::Ping(_) | EnginePacket::Noop => Flow::Continue,
        EnginePacket::Open(_) | EnginePacket::Upgrade => {
            warn!(engine_sid = %session.engine_sid(), "ws: unexpected engine packet from client");
            Flow::Continue
        }
    }
}

async fn handle_socket_packet(state: &AppState, session: &mut Session, outbox: &Outbox, body: &str) -> Flow {
    let packet = match packets::decode_packet(body) {
        Ok(p) => p,
        Err(e) => {
            warn!(engine_sid = %session.engine_sid(), error = %e, "ws: invalid socket packet");
            return Flow::Continue;
        }
    };

    if packet.namespace != DEFAULT_NAMESPACE {
        if packet.kind == PacketType::Connect {
            push(outbox, Packet::connect_error(&packet.namespace, "Invalid namespace"));
        } else {
            debug!(namespace = %packet.namespace, "ws: packet for unknown namespace ignored");
        }
        return Flow::Continue;
    }

    match packet.kind {
        PacketType::Connect => handle_connect(state, session, outbox, packet.data.as_ref()).await,
        PacketType::Disconnect => {
            close_session(state, session, "client namespace disconnect").await;
            Flow::Continue
        }
        PacketType::Event => {
            handle_event(state, session, outbox, &packet).await;
            Flow::Continue
        }
        PacketType::Ack => {
            debug!(ack_id = ?packet.ack_id, "ws: unsolicited client ack ignored");
            Flow::Continue
        }
        PacketType::ConnectError | PacketType::BinaryEvent | PacketType::BinaryAck => {
            warn!(kind = ?packet.kind, "ws: unsupported packet from client");
            Flow::Continue
        }
    }
}

// =============================================================================
// CONNECT
// =============================================================================

async fn handle_connect(state: &AppState, session: &mut Session, outbox: &Outbox, auth: Option<&Value>) -> Flow {
    let identity = match session::identity_from_auth(auth) {
        Ok(identity) => identity,
        Err(e) => {
            info!(engine_sid = %session.engine_sid(), error = %e, "ws: connect rejected");
            push(outbox, Packet::connect_error(DEFAULT_NAMESPACE, e.to_string()));
            return Flow::Continue;
        }
    };

    match session.connect(&state.registry, identity, outbox.clone()).await {
        Ok(socket) => {
            info!(
                connection_id = %socket.connection_id,
                socket_id = %socket.socket_id,
                client = %socket.client_identity,
                "ws: socket connected"
            );
            push(outbox, Packet::connect(&socket.socket_id));
            Flow::Continue
        }
        Err(HandshakeError::Registry(e)) => {
            error!(engine_sid = %session.engine_sid(), error = %e, "ws: registration failed");
            push(outbox, Packet::connect_error(DEFAULT_NAMESPACE, e.to_string()));
            Flow::Close
        }
        Err(e) => {
            warn!(engine_sid = %session.engine_sid(), state = session.state().name(), error = %e, "ws: connect rejected");
            push(outbox, Packet::connect_error(DEFAULT_NAMESPACE, e.to_string()));
            Flow::Continue
        }
    }
}

// =============================================================================
// MESSAGE RELAY
// =============================================================================

async fn handle_event(state: &AppState, session: &Session, outbox: &Outbox, packet: &Packet) {
    let event = packet.event_name().unwrap_or_default();
    let outcome = if event == MESSAGE_EVENT {
        relay_message(state, session, packet.args().first()).await
    } else {
        warn!(engine_sid = %session.engine_sid(), event, "ws: unknown event");
        let err = ValidationError::UnknownEvent(event.to_owned());
        Outcome::Failure(Failure::from_error(FailureReason::ValidationFailed, &err))
    };

    ack::acknowledge(outbox, packet.ack_id, &outcome);
}

/// Validate, route and fan out one `message` event. Nothing is delivered
/// unless every check passes.
async fn relay_message(state: &AppState, session: &Session, raw: Option<&Value>) -> Outcome {
    let socket = match session.connected() {
        Ok(socket) => socket,
        Err(e) => {
            warn!(engine_sid = %session.engine_sid(), error = %e, "ws: message outside connected state");
            return Outcome::Failure(Failure::from_error(FailureReason::InvalidState, &e));
        }
    };
    let sender = socket.connection_id;

    if let Err(e) = state.rate_limiter.check_and_record(sender) {
        warn!(connection_id = %sender, error = %e, "ws: message rate limited");
        return Outcome::Failure(Failure::from_error(FailureReason::RateLimited, &e));
    }

    let payload = match validator::validate(raw, state.config.max_content_bytes) {
        Ok(payload) => payload,
        Err(e) => {
            info!(connection_id = %sender, error = %e, "ws: message rejected");
            return Outcome::Failure(Failure::from_error(FailureReason::ValidationFailed, &e));
        }
    };

    let routed = match state.router.route(sender, payload).await {
        Ok(routed) => routed,
        Err(e) => {
            error!(connection_id = %sender, error = %e, "ws: routing failed");
            return Outcome::Failure(Failure::from_error(FailureReason::Internal, &e));
        }
    };

    let report = fan_out(state, &routed).await;
    info!(
        connection_id = %sender,
        message_id = %routed.response.id,
        public = routed.response.public,
        recipients = routed.delivery.len(),
        delivered = report.delivered.len(),
        unreachable = report.unreachable.len(),
        "ws: message relayed"
    );
    report.outcome(sender)
}

/// Push one `message` event to every recipient in the delivery set.
///
/// Recipients whose outbox is closed are evicted from the registry; their own
/// task finishes the disconnect.
async fn fan_out(state: &AppState, routed: &Routed) -> DeliveryReport {
    let packet = Packet::event(MESSAGE_EVENT, routed.response.to_value());
    let mut report = DeliveryReport::default();

    for recipient in routed.delivery.iter() {
        match recipient.outbox.try_send(packet.clone()) {
            Ok(()) => report.delivered.push(recipient.connection_id),
            Err(e) => {
                let reason = Unreachable::from(&e);
                warn!(
                    connection_id = %recipient.connection_id,
                    message_id = %routed.response.id,
                    ?reason,
                    "ws: recipient unreachable"
                );
                report.unreachable.push((recipient.connection_id, reason));
            }
        }
    }

    for (connection_id, reason) in &report.unreachable {
        if *reason == Unreachable::Closed {
            state.registry.unregister(*connection_id).await;
        }
    }
    report
}

// =============================================================================
// HELPERS
// =============================================================================

/// Queue a packet for this connection's own socket.
fn push(outbox: &Outbox, packet: Packet) {
    if let Err(e) = outbox.try_send(packet) {
        warn!(error = %e, "ws: outbox rejected packet");
    }
}

async fn send_engine(socket: &mut WebSocket, packet: &EnginePacket) -> Result<(), ()> {
    let text = packets::encode_engine(packet);
    debug!(len = text.len(), "ws: send");
    socket.send(Message::Text(text.into())).await.map_err(|e| {
        debug!(error = %e, "ws: send failed");
    })
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
