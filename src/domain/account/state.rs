//! Account state store: the single in-memory source of truth for one session.

use super::{AccountBalance, Balance, BalanceSlot, BidAsk, MarginCalculator, Pnl, UserDetails};
use crate::domain::config::ServerConfig;
use crate::domain::order::{OpenOrders, Order};
use crate::shared::OrderId;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

/// Open orders, balances, PnL, bid/ask and config for one account.
///
/// Reads hand out owned copies. Every write that touches orders, balances or
/// PnL recomputes the available margin before returning.
pub struct AccountStateStore {
    open_orders: OpenOrders,
    multisig: Option<Balance>,
    margin: Option<Balance>,
    pnl: Option<Pnl>,
    positions: Option<serde_json::Value>,
    bid_ask: BidAsk,
    config: ServerConfig,
    available_margin: Decimal,
    calculator: Arc<dyn MarginCalculator>,
}

impl AccountStateStore {
    pub fn new(config: ServerConfig, calculator: Arc<dyn MarginCalculator>) -> Self {
        let mut store = Self {
            open_orders: OpenOrders::new(),
            multisig: None,
            margin: None,
            pnl: None,
            positions: None,
            bid_ask: BidAsk::default(),
            config,
            available_margin: Decimal::ZERO,
            calculator,
        };
        store.recompute_margin();
        store
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn open_orders(&self) -> Vec<Order> {
        self.open_orders.to_vec()
    }

    pub fn open_orders_map(&self) -> HashMap<OrderId, Order> {
        self.open_orders.to_map()
    }

    /// Copy of the open-order container, for building hypothetical sets.
    pub fn open_order_set(&self) -> OpenOrders {
        self.open_orders.clone()
    }

    pub fn contains_order(&self, uuid: &OrderId) -> bool {
        self.open_orders.contains(uuid)
    }

    pub fn balance(&self) -> AccountBalance {
        let part = |b: &Option<Balance>| b.as_ref().map(|b| b.balance).unwrap_or(Decimal::ZERO);
        let pnl = self.pnl.as_ref().map(|p| p.pnl).unwrap_or(Decimal::ZERO);
        AccountBalance {
            balance: part(&self.multisig) + part(&self.margin) + pnl,
            available_margin: self.available_margin,
            multisig: self.multisig.clone(),
            margin: self.margin.clone(),
        }
    }

    /// Margin balance used by the calculator; zero until the feed reports it.
    pub fn margin_balance(&self) -> Decimal {
        self.margin.as_ref().map(|b| b.balance).unwrap_or(Decimal::ZERO)
    }

    pub fn pnl(&self) -> Option<Pnl> {
        self.pnl.clone()
    }

    pub fn positions(&self) -> Option<serde_json::Value> {
        self.positions.clone()
    }

    pub fn bid_ask(&self) -> BidAsk {
        self.bid_ask.clone()
    }

    pub fn config(&self) -> ServerConfig {
        self.config.clone()
    }

    pub fn available_margin(&self) -> Decimal {
        self.available_margin
    }

    /// Run the margin calculator over an arbitrary order set against current
    /// PnL, instrument and margin balance. Does not touch stored state.
    pub fn compute_margin(&self, orders: &[Order]) -> Decimal {
        self.calculator.available_margin(
            orders,
            self.pnl.as_ref(),
            &self.config.instrument,
            self.margin_balance(),
        )
    }

    // ── Writes ───────────────────────────────────────────────────────────

    pub fn apply_order_upserts(&mut self, orders: Vec<Order>) {
        self.open_orders.upsert_all(orders);
        self.recompute_margin();
    }

    /// Drop every open order (server-side flatten without a resync).
    pub fn clear_orders(&mut self) {
        self.open_orders.clear();
        self.recompute_margin();
    }

    /// Remove an order, returning whether it was open.
    pub fn apply_order_removal(&mut self, uuid: &OrderId) -> bool {
        let removed = self.open_orders.remove(uuid).is_some();
        self.recompute_margin();
        removed
    }

    pub fn replace_pnl(&mut self, pnl: Option<Pnl>) {
        self.pnl = pnl;
        self.recompute_margin();
    }

    pub fn replace_bid_ask(&mut self, bid_ask: BidAsk) {
        self.bid_ask = bid_ask;
    }

    pub fn replace_config(&mut self, config: ServerConfig) {
        self.config = config;
        self.recompute_margin();
    }

    pub fn replace_balance(&mut self, slot: BalanceSlot, balance: Balance) {
        match slot {
            BalanceSlot::Multisig => self.multisig = Some(balance),
            BalanceSlot::Margin => self.margin = Some(balance),
        }
        self.recompute_margin();
    }

    /// Replace orders, positions and PnL from an authoritative snapshot.
    ///
    /// The snapshot's own `margin` field is ignored; margin is always derived.
    pub fn apply_snapshot(&mut self, details: UserDetails) {
        self.open_orders.replace_all(details.orders);
        self.positions = details.positions;
        self.pnl = details.pnl;
        self.recompute_margin();
    }

    fn recompute_margin(&mut self) {
        let orders = self.open_orders.to_vec();
        self.available_margin = self.compute_margin(&orders);
    }
}

impl std::fmt::Debug for AccountStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStateStore")
            .field("open_orders", &self.open_orders.len())
            .field("multisig", &self.multisig)
            .field("margin", &self.margin)
            .field("pnl", &self.pnl)
            .field("available_margin", &self.available_margin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::InstrumentConfig;
    use crate::domain::order::OrderType;
    use crate::shared::{Address, Side};
    use rust_decimal_macros::dec;

    /// margin balance + pnl - sum(price * quantity)
    fn calculator() -> Arc<dyn MarginCalculator> {
        Arc::new(
            |orders: &[Order], pnl: Option<&Pnl>, _: &InstrumentConfig, margin: Decimal| {
                let used: Decimal = orders.iter().map(|o| o.price * o.quantity).sum();
                margin + pnl.map(|p| p.pnl).unwrap_or(Decimal::ZERO) - used
            },
        )
    }

    fn store() -> AccountStateStore {
        AccountStateStore::new(ServerConfig::default(), calculator())
    }

    fn order(uuid: &str, price: Decimal) -> Order {
        Order {
            uuid: OrderId::from(uuid),
            side: Side::Buy,
            price,
            order_type: OrderType::Limit,
            quantity: dec!(1),
            extra: serde_json::Map::new(),
        }
    }

    fn balance(address: &str, amount: Decimal) -> Balance {
        Balance {
            address: Address::from(address),
            confirmed: amount,
            unconfirmed: Decimal::ZERO,
            balance: amount,
        }
    }

    #[test]
    fn test_missing_margin_balance_counts_as_zero() {
        let mut store = store();
        store.apply_order_upserts(vec![order("A", dec!(10))]);
        assert_eq!(store.available_margin(), dec!(-10));
    }

    #[test]
    fn test_every_write_recomputes_margin() {
        let mut store = store();
        store.replace_balance(BalanceSlot::Margin, balance("server", dec!(100)));
        assert_eq!(store.available_margin(), dec!(100));

        store.apply_order_upserts(vec![order("A", dec!(30))]);
        assert_eq!(store.available_margin(), dec!(70));

        store.replace_pnl(Some(Pnl {
            pnl: dec!(5),
            extra: serde_json::Map::new(),
        }));
        assert_eq!(store.available_margin(), dec!(75));

        assert!(store.apply_order_removal(&OrderId::from("A")));
        assert_eq!(store.available_margin(), dec!(105));
        assert!(!store.apply_order_removal(&OrderId::from("A")));
    }

    #[test]
    fn test_snapshot_ignores_server_margin() {
        let mut store = store();
        store.replace_balance(BalanceSlot::Margin, balance("server", dec!(50)));
        store.apply_order_upserts(vec![order("stale", dec!(1))]);
        store.apply_snapshot(UserDetails {
            orders: vec![order("A", dec!(20))],
            positions: Some(serde_json::json!([{"quantity": 1}])),
            pnl: None,
            margin: Some(dec!(999)),
        });
        assert_eq!(store.open_orders().len(), 1);
        assert!(store.contains_order(&OrderId::from("A")));
        assert!(!store.contains_order(&OrderId::from("stale")));
        assert_eq!(store.available_margin(), dec!(30));
        assert!(store.positions().is_some());
    }

    #[test]
    fn test_clear_orders_releases_margin() {
        let mut store = store();
        store.replace_balance(BalanceSlot::Margin, balance("server", dec!(50)));
        store.apply_order_upserts(vec![order("A", dec!(20)), order("B", dec!(10))]);
        assert_eq!(store.available_margin(), dec!(20));
        store.clear_orders();
        assert!(store.open_orders().is_empty());
        assert_eq!(store.available_margin(), dec!(50));
    }

    #[test]
    fn test_balance_aggregates_slots_and_pnl() {
        let mut store = store();
        store.replace_balance(BalanceSlot::Multisig, balance("account", dec!(40)));
        store.replace_balance(BalanceSlot::Margin, balance("server", dec!(60)));
        store.replace_pnl(Some(Pnl {
            pnl: dec!(-7),
            extra: serde_json::Map::new(),
        }));
        let view = store.balance();
        assert_eq!(view.balance, dec!(93));
        assert_eq!(view.multisig.unwrap().address, Address::from("account"));
        assert_eq!(view.margin.unwrap().balance, dec!(60));
    }

    #[test]
    fn test_reads_are_copies() {
        let mut store = store();
        store.apply_order_upserts(vec![order("A", dec!(10))]);
        let mut orders = store.open_orders();
        orders[0].price = dec!(99);
        orders.clear();
        assert_eq!(store.open_orders()[0].price, dec!(10));
    }

    #[test]
    fn test_bid_ask_last_write_wins() {
        let mut store = store();
        store.replace_bid_ask(BidAsk {
            bid: Some(dec!(1)),
            ask: Some(dec!(2)),
        });
        store.replace_bid_ask(BidAsk {
            bid: Some(dec!(3)),
            ask: None,
        });
        assert_eq!(store.bid_ask().bid, Some(dec!(3)));
        assert_eq!(store.bid_ask().ask, None);
    }
}
