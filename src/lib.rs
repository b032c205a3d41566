//! # margin-session
//!
//! Client-side session for a margin-trading account. Keeps a local projection
//! of the account (open orders, balances, PnL, bid/ask, config) consistent with
//! a remote server over a reconnecting push channel.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core**: Newtypes, domain models, state containers, errors
//! 2. **Push channel**: `Transport` seam, request envelopes, inbound events
//! 3. **HTTP API**: `SessionHttp` bootstrap config fetch
//! 4. **Session**: `AccountSession`: request correlation, event reconciliation,
//!    margin preflight, balance-feed routing, transaction workflows
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use margin_session::prelude::*;
//!
//! let bootstrap = fetch_bootstrap_config(&SessionConfig::default()).await?;
//! let session = AccountSession::builder()
//!     .account_address(account)
//!     .server_address(server)
//!     .signing_keys(keys)
//!     .transport(transport.clone())
//!     .balance_feed(feed)
//!     .chain_index(chain)
//!     .tx_builder(builder)
//!     .tx_signer(signer)
//!     .margin_calculator(calculator)
//!     .server_config(bootstrap.config)
//!     .build()?;
//!
//! let sink = session.attach(transport.id()).expect("first attach");
//! sink.push(PushEvent::Connected)?;
//! session.update_account_balance().await?;
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared newtypes used across all domains.
pub mod shared;

/// Domain modules (vertical slices): types, wire types, conversions, state.
pub mod domain;

/// Unified error types.
pub mod error;

/// Endpoint path constants.
pub mod network;

// ── Layer 2: Push channel ────────────────────────────────────────────────────

/// Transport seam, request envelopes, inbound push events.
pub mod ws;

// ── Layer 3: HTTP API ────────────────────────────────────────────────────────

/// Bootstrap HTTP client.
#[cfg(feature = "http")]
pub mod http;

// ── Layer 4: Session ─────────────────────────────────────────────────────────

/// `AccountSession`: the primary entry point.
pub mod session;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared newtypes
    pub use crate::shared::{Address, OrderId, RequestId, Side};

    // Domain types: order
    pub use crate::domain::order::{OpenOrders, Order, OrderDraft, OrderType};

    // Domain types: account
    pub use crate::domain::account::{
        AccountBalance, AddressBalance, Balance, BalanceSlot, BidAsk, MarginCalculator, Pnl,
        UserDetails,
    };

    // Domain types: config
    pub use crate::domain::config::{BootstrapConfig, InstrumentConfig, Network, ServerConfig};

    // Domain types: transactions
    pub use crate::domain::tx::{
        ChainIndex, FeePolicy, SignedTx, SigningKeys, TxBuilder, TxSigner, TxSpec, Unspent,
        UnsignedTx,
    };

    // Errors
    pub use crate::error::{SdkError, TransportError, ValidationError};

    // Push channel
    pub use crate::ws::{
        ConnectionState, EventSink, Kind, Method, PushEvent, RequestEnvelope, Transport,
        TransportId,
    };

    // Session
    pub use crate::session::feed::{BalanceCallback, BalanceFeed};
    pub use crate::session::{AccountSession, AccountSessionBuilder, SessionConfig};

    #[cfg(feature = "http")]
    pub use crate::http::SessionHttp;
    #[cfg(feature = "http")]
    pub use crate::session::fetch_bootstrap_config;
}
