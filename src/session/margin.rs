//! Margin preflight: local gate run before any order request is sent.

use crate::domain::account::AccountStateStore;
use crate::domain::order::{Order, OrderDraft};
use crate::error::ValidationError;
use rust_decimal::Decimal;

pub use crate::domain::account::MarginCalculator;

/// Computes margin against a hypothetical order set built from the store's
/// open orders plus proposed changes. Never mutates the store.
pub struct MarginPreflightGuard<'a> {
    store: &'a AccountStateStore,
}

impl<'a> MarginPreflightGuard<'a> {
    pub fn new(store: &'a AccountStateStore) -> Self {
        Self { store }
    }

    /// The open orders as they would be if every draft were accepted.
    ///
    /// Updates replace the open order with the same id (keeping fields the
    /// draft does not carry). Creates get a placeholder id that exists only
    /// in the returned set.
    pub fn hypothetical_orders(&self, drafts: &[OrderDraft]) -> Vec<Order> {
        let mut orders = self.store.open_order_set();
        let merged: Vec<Order> = drafts
            .iter()
            .map(|draft| {
                let existing = draft.uuid.as_ref().and_then(|id| orders.get(id));
                let extra = existing.map(|o| o.extra.clone());
                let mut order = draft.clone().into_hypothetical();
                if let Some(extra) = extra {
                    order.extra = extra;
                }
                order
            })
            .collect();
        orders.upsert_all(merged);
        orders.to_vec()
    }

    /// Margin that would remain if the drafts were accepted.
    pub fn post_available_margin(&self, drafts: &[OrderDraft]) -> Decimal {
        self.store.compute_margin(&self.hypothetical_orders(drafts))
    }

    /// Fail with `InsufficientMargin` if the drafts would leave negative margin.
    pub fn check_proposed_orders(&self, drafts: &[OrderDraft]) -> Result<Decimal, ValidationError> {
        let available = self.post_available_margin(drafts);
        if available < Decimal::ZERO {
            return Err(ValidationError::InsufficientMargin { available });
        }
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Balance, BalanceSlot, Pnl};
    use crate::domain::config::{InstrumentConfig, ServerConfig};
    use crate::domain::order::OrderType;
    use crate::shared::{Address, OrderId, Side};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn store_with_margin(margin: Decimal) -> AccountStateStore {
        let calculator = |orders: &[Order], _: Option<&Pnl>, _: &InstrumentConfig, balance: Decimal| {
            balance - orders.iter().map(|o| o.price * o.quantity).sum::<Decimal>()
        };
        let mut store = AccountStateStore::new(ServerConfig::default(), Arc::new(calculator));
        store.replace_balance(
            BalanceSlot::Margin,
            Balance {
                address: Address::from("server"),
                confirmed: margin,
                unconfirmed: Decimal::ZERO,
                balance: margin,
            },
        );
        store
    }

    fn open(uuid: &str, price: Decimal) -> Order {
        let mut extra = serde_json::Map::new();
        extra.insert("status".to_string(), serde_json::json!("open"));
        Order {
            uuid: OrderId::from(uuid),
            side: Side::Buy,
            price,
            order_type: OrderType::Limit,
            quantity: dec!(1),
            extra,
        }
    }

    #[test]
    fn test_create_adds_to_hypothetical_set() {
        let mut store = store_with_margin(dec!(100));
        store.apply_order_upserts(vec![open("A", dec!(30))]);
        let guard = MarginPreflightGuard::new(&store);
        let drafts = vec![OrderDraft::limit(Side::Buy, dec!(50), dec!(1))];
        assert_eq!(guard.hypothetical_orders(&drafts).len(), 2);
        assert_eq!(guard.post_available_margin(&drafts), dec!(20));
        // Store untouched.
        assert_eq!(store.open_orders().len(), 1);
    }

    #[test]
    fn test_update_replaces_existing_order() {
        let mut store = store_with_margin(dec!(100));
        store.apply_order_upserts(vec![open("A", dec!(30))]);
        let guard = MarginPreflightGuard::new(&store);
        let drafts = vec![OrderDraft::limit(Side::Buy, dec!(80), dec!(1)).with_id(OrderId::from("A"))];
        let orders = guard.hypothetical_orders(&drafts);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].extra["status"], "open");
        assert_eq!(guard.check_proposed_orders(&drafts), Ok(dec!(20)));
    }

    #[test]
    fn test_negative_margin_is_rejected() {
        let store = store_with_margin(dec!(95));
        let guard = MarginPreflightGuard::new(&store);
        let drafts = vec![OrderDraft::limit(Side::Buy, dec!(100), dec!(1))];
        assert_eq!(
            guard.check_proposed_orders(&drafts),
            Err(ValidationError::InsufficientMargin { available: dec!(-5) })
        );
    }

    #[test]
    fn test_zero_margin_passes() {
        let store = store_with_margin(dec!(100));
        let guard = MarginPreflightGuard::new(&store);
        let drafts = vec![OrderDraft::limit(Side::Buy, dec!(100), dec!(1))];
        assert_eq!(guard.check_proposed_orders(&drafts), Ok(Decimal::ZERO));
    }
}
