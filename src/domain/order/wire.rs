//! Wire types for order push events and order request bodies.

use super::{Order, OrderDraft};
use crate::domain::account::UserDetails;
use crate::shared::{OrderId, RequestId};
use serde::{Deserialize, Serialize};

// ─── Push payloads ──────────────────────────────────────────────────────────

/// `order_add` / `order_update` push.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OrderResult {
    #[serde(default)]
    pub requestid: Option<RequestId>,
    pub result: Vec<Order>,
}

/// `order_del` push: the id of the removed order.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OrderRemoved {
    #[serde(default)]
    pub requestid: Option<RequestId>,
    pub result: OrderId,
}

/// `orders_del` push: every open order was flattened.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct OrdersCleared {
    #[serde(default)]
    pub requestid: Option<RequestId>,
}

/// `order_error` push, optionally carrying an authoritative snapshot.
#[derive(Deserialize, Debug, Clone)]
pub struct OrderErrorPayload {
    #[serde(default)]
    pub requestid: Option<RequestId>,
    #[serde(default)]
    pub error: serde_json::Value,
    #[serde(rename = "userDetails", default)]
    pub user_details: Option<UserDetails>,
}

// ─── Request bodies ─────────────────────────────────────────────────────────

/// `PUT /order` body.
#[derive(Serialize, Debug, Clone)]
pub struct UpdateOrdersBody<'a> {
    pub orders: &'a [OrderDraft],
}
