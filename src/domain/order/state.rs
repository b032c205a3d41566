//! Open order state container.

use super::Order;
use crate::shared::OrderId;
use std::collections::HashMap;

/// A user's open orders keyed by order id.
///
/// Ids are unique by construction: an upsert with a known id replaces the entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenOrders {
    orders: HashMap<OrderId, Order>,
}

impl OpenOrders {
    pub fn new() -> Self {
        Self {
            orders: HashMap::new(),
        }
    }

    pub fn get(&self, uuid: &OrderId) -> Option<&Order> {
        self.orders.get(uuid)
    }

    pub fn contains(&self, uuid: &OrderId) -> bool {
        self.orders.contains_key(uuid)
    }

    /// Insert or replace each order by id.
    pub fn upsert_all(&mut self, orders: impl IntoIterator<Item = Order>) {
        for order in orders {
            self.orders.insert(order.uuid.clone(), order);
        }
    }

    /// Remove an order by id, returning it if it was open.
    pub fn remove(&mut self, uuid: &OrderId) -> Option<Order> {
        self.orders.remove(uuid)
    }

    /// Replace the whole set (authoritative snapshot).
    pub fn replace_all(&mut self, orders: impl IntoIterator<Item = Order>) {
        self.orders.clear();
        self.upsert_all(orders);
    }

    pub fn clear(&mut self) {
        self.orders.clear();
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Owned copies of every open order.
    pub fn to_vec(&self) -> Vec<Order> {
        self.orders.values().cloned().collect()
    }

    /// Owned copy of the id → order mapping.
    pub fn to_map(&self) -> HashMap<OrderId, Order> {
        self.orders.clone()
    }
}
