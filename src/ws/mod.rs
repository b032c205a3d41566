//! Push-channel layer: outbound request envelopes, inbound events, and the
//! transport seam.
//!
//! The transport itself (socket, reconnection, authentication) lives outside
//! this crate. It implements [`Transport`] for outbound traffic and feeds
//! inbound traffic into the [`EventSink`] returned by `AccountSession::attach`.

use crate::domain::account::wire::{ReadOnlyStatus, UserMessage};
use crate::domain::account::BidAsk;
use crate::domain::config::ServerConfig;
use crate::domain::order::wire::{OrderErrorPayload, OrderRemoved, OrderResult, OrdersCleared};
use crate::error::TransportError;
use crate::session::reconciler::Inbound;
use crate::shared::RequestId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

// ─── Transport seam ──────────────────────────────────────────────────────────

/// Identity of one transport instance, used to refuse duplicate attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(pub u64);

impl TransportId {
    /// A process-unique id.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TransportId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Outbound side of the push channel.
///
/// `send` is fire-and-forget: the response arrives later as an inbound event
/// carrying the same `requestid`.
pub trait Transport: Send + Sync {
    fn id(&self) -> TransportId;

    /// Register the session with the server (called on every fresh connect).
    fn register(&self) -> Result<(), TransportError>;

    fn send(&self, envelope: RequestEnvelope) -> Result<(), TransportError>;

    /// Hand an `auth_error` push to the authentication layer.
    fn on_auth_error(&self, message: &serde_json::Value);
}

// ─── Outbound messages ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// An id-tagged request handed to the transport.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestEnvelope {
    pub method: Method,
    pub uri: String,
    pub requestid: RequestId,
    pub body: serde_json::Value,
}

// ─── Inbound messages ────────────────────────────────────────────────────────

/// Raw inbound message from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageIn {
    #[serde(flatten)]
    pub kind: Kind,
}

/// The type of inbound push message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Kind {
    OrderAdd(OrderResult),
    OrderUpdate(OrderResult),
    OrderDel(OrderRemoved),
    OrdersDel(OrdersCleared),
    OrderError(OrderErrorPayload),
    UserMessage(UserMessage),
    #[serde(rename = "orderbook")]
    OrderBook(BidAsk),
    #[serde(rename = "difforderbook")]
    DiffOrderBook(BidAsk),
    Config(ServerConfig),
    #[serde(rename = "readonly")]
    ReadOnly(ReadOnlyStatus),
    AuthError(serde_json::Value),
    /// Generic correlated response (snapshot, margin, tx calls).
    Response(ResponsePayload),
    Trade(serde_json::Value),
    Ntp(serde_json::Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponsePayload {
    #[serde(default)]
    pub requestid: Option<RequestId>,
    #[serde(default)]
    pub result: serde_json::Value,
}

// ─── PushEvent ───────────────────────────────────────────────────────────────

/// Everything a transport can report to the session.
#[derive(Debug, Clone)]
pub enum PushEvent {
    Connected,
    Reconnected,
    Disconnected { reason: String },
    ConnectError(String),
    ConnectTimeout,
    ReconnectError(String),
    ReconnectFailed,
    /// A parsed message from the server.
    Message(Kind),
}

impl PushEvent {
    pub(crate) fn is_connect(&self) -> bool {
        matches!(self, PushEvent::Connected | PushEvent::Reconnected)
    }

    pub(crate) fn is_disconnect(&self) -> bool {
        matches!(
            self,
            PushEvent::Disconnected { .. }
                | PushEvent::ConnectError(_)
                | PushEvent::ConnectTimeout
                | PushEvent::ReconnectError(_)
                | PushEvent::ReconnectFailed
        )
    }
}

/// Session connectivity, stored in an `AtomicU8` shared with the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Active = 2,
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Active,
            _ => ConnectionState::Disconnected,
        }
    }
}

// ─── EventSink ───────────────────────────────────────────────────────────────

/// Inbound handle a transport pushes events into.
///
/// Events are applied in the order they are pushed, serialized with balance
/// updates and snapshot follow-ups.
#[derive(Debug, Clone)]
pub struct EventSink {
    transport: TransportId,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EventSink {
    pub(crate) fn new(transport: TransportId, tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { transport, tx }
    }

    pub fn transport_id(&self) -> TransportId {
        self.transport
    }

    pub fn push(&self, event: PushEvent) -> Result<(), TransportError> {
        self.tx
            .send(Inbound::Push(event))
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Parse a JSON message and push it. Malformed messages are logged and dropped.
    pub fn push_raw(&self, text: &str) -> Result<(), TransportError> {
        match serde_json::from_str::<MessageIn>(text) {
            Ok(msg_in) => self.push(PushEvent::Message(msg_in.kind)),
            Err(e) => {
                tracing::warn!("Push deserialization error: {} (raw: {})", e, text);
                Ok(())
            }
        }
    }
}
