//! Order domain: orders, proposed orders, open order tracking.

mod convert;
pub mod state;
pub mod validation;
pub mod wire;

use crate::shared::{OrderId, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use state::OpenOrders;

// ─── OrderType ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Limit,
    Market,
    StopMarket,
    TakeProfit,
}

impl OrderType {
    /// Whether the order rests at a caller-supplied price.
    pub fn is_priced(&self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OrderType::Limit => write!(f, "limit"),
            OrderType::Market => write!(f, "market"),
            OrderType::StopMarket => write!(f, "stopMarket"),
            OrderType::TakeProfit => write!(f, "takeProfit"),
        }
    }
}

// ─── Order ───────────────────────────────────────────────────────────────────

/// An open order as the server reports it.
///
/// Fields the session does not interpret (status, fills, timestamps) are kept
/// in `extra` so the margin calculator and callers still see them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub uuid: OrderId,
    pub side: Side,
    #[serde(default)]
    pub price: Decimal,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
    pub quantity: Decimal,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ─── OrderDraft ──────────────────────────────────────────────────────────────

/// A proposed order mutation: without `uuid` it is a create, with one an update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDraft {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub uuid: Option<OrderId>,
    pub side: Side,
    #[serde(default)]
    pub price: Decimal,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
    pub quantity: Decimal,
}

impl OrderDraft {
    pub fn new(side: Side, order_type: OrderType, price: Decimal, quantity: Decimal) -> Self {
        Self {
            uuid: None,
            side,
            price,
            order_type,
            quantity,
        }
    }

    pub fn limit(side: Side, price: Decimal, quantity: Decimal) -> Self {
        Self::new(side, OrderType::Limit, price, quantity)
    }

    /// Turn this draft into an update of an existing order.
    pub fn with_id(mut self, uuid: OrderId) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn is_create(&self) -> bool {
        self.uuid.is_none()
    }
}
