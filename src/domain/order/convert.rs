//! Conversions: drafts and snapshot lists → order state.

use super::{OpenOrders, Order, OrderDraft};
use crate::shared::OrderId;

impl OrderDraft {
    /// The order this draft would become if the server accepted it.
    ///
    /// Creates get a placeholder id; the real one arrives with `order_add`.
    pub(crate) fn into_hypothetical(self) -> Order {
        Order {
            uuid: self.uuid.unwrap_or_else(OrderId::placeholder),
            side: self.side,
            price: self.price,
            order_type: self.order_type,
            quantity: self.quantity,
            extra: serde_json::Map::new(),
        }
    }
}

impl From<Vec<Order>> for OpenOrders {
    fn from(orders: Vec<Order>) -> Self {
        let mut open = OpenOrders::new();
        open.upsert_all(orders);
        open
    }
}
