//! Account domain: balances, PnL, bid/ask, authoritative snapshots and the
//! in-memory account state store.

pub mod margin;
pub mod state;
pub mod wire;

pub use margin::MarginCalculator;
pub use state::AccountStateStore;

use crate::domain::order::Order;
use crate::shared::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ─── Balance ────────────────────────────────────────────────────────────────

/// Balance of one address as reported by the balance feed or the chain index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub address: Address,
    #[serde(default)]
    pub confirmed: Decimal,
    #[serde(default)]
    pub unconfirmed: Decimal,
    #[serde(default)]
    pub balance: Decimal,
}

/// Payload delivered to a balance-feed callback.
pub type AddressBalance = Balance;

/// The two balance slots a session tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BalanceSlot {
    /// The account's own multisig address.
    Multisig,
    /// The server-held margin address.
    Margin,
}

impl std::fmt::Display for BalanceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BalanceSlot::Multisig => write!(f, "multisig"),
            BalanceSlot::Margin => write!(f, "margin"),
        }
    }
}

// ─── PnL ────────────────────────────────────────────────────────────────────

/// Profit-and-loss snapshot. Replaced wholesale, never merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Pnl {
    #[serde(default)]
    pub pnl: Decimal,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ─── BidAsk ─────────────────────────────────────────────────────────────────

/// Latest top of book. Last write wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BidAsk {
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
}

// ─── UserDetails ────────────────────────────────────────────────────────────

/// Authoritative account snapshot (`GET /api/userdetails`, or attached to
/// `order_error` and `user_message` pushes).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserDetails {
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub positions: Option<serde_json::Value>,
    #[serde(default)]
    pub pnl: Option<Pnl>,
    /// Server-computed margin. Informational only; the store always derives its own.
    #[serde(default)]
    pub margin: Option<Decimal>,
}

// ─── AccountBalance ─────────────────────────────────────────────────────────

/// Aggregate balance view returned by the session.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    /// multisig + margin + pnl; missing parts count as zero.
    pub balance: Decimal,
    pub available_margin: Decimal,
    pub multisig: Option<Balance>,
    pub margin: Option<Balance>,
}
