//! Unified SDK error types.

use crate::shared::{OrderId, RequestId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Top-level SDK error.
#[derive(Error, Debug)]
pub enum SdkError {
    /// Local rejection before anything reaches the transport.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An `order_error` push matched to a pending request.
    #[error("Server error (requestid {requestid:?}): {error}")]
    Server {
        requestid: Option<RequestId>,
        error: serde_json::Value,
    },

    #[error("Request {requestid} timed out after {after_ms}ms")]
    Timeout { requestid: RequestId, after_ms: u64 },

    #[error("Session closed")]
    SessionClosed,

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SdkError {
    /// Whether this error was raised locally, with zero side effects.
    pub fn is_validation(&self) -> bool {
        matches!(self, SdkError::Validation(_))
    }
}

/// Local preflight rejections.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Insufficient margin {available}, add margin")]
    InsufficientMargin { available: Decimal },

    #[error("No orders supplied")]
    EmptyOrders,

    #[error("New order must not carry an id: {0}")]
    UnexpectedOrderId(OrderId),

    #[error("Order update requires an id")]
    MissingOrderId,

    #[error("Order {0} is not open")]
    UnknownOrder(OrderId),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("Price {price} is not a multiple of the tick size (scale {ticksize})")]
    PriceOffTick { price: Decimal, ticksize: u32 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// Transport-layer errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Event channel closed")]
    ChannelClosed,
}

/// HTTP-layer errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[cfg(feature = "http")]
    #[error("Request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("Rate limited")]
    RateLimited,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}
