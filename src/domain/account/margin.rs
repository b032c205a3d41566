//! Margin-coverage function seam.

use super::Pnl;
use crate::domain::config::InstrumentConfig;
use crate::domain::order::Order;
use rust_decimal::Decimal;

/// Computes available margin for a set of orders.
///
/// The risk formula lives outside this crate; sessions only call it.
/// A negative result means the orders are not covered.
pub trait MarginCalculator: Send + Sync {
    fn available_margin(
        &self,
        orders: &[Order],
        pnl: Option<&Pnl>,
        instrument: &InstrumentConfig,
        margin_balance: Decimal,
    ) -> Decimal;
}

impl<F> MarginCalculator for F
where
    F: Fn(&[Order], Option<&Pnl>, &InstrumentConfig, Decimal) -> Decimal + Send + Sync,
{
    fn available_margin(
        &self,
        orders: &[Order],
        pnl: Option<&Pnl>,
        instrument: &InstrumentConfig,
        margin_balance: Decimal,
    ) -> Decimal {
        self(orders, pnl, instrument, margin_balance)
    }
}
