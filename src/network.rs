//! Endpoint paths for the trading server.
//!
//! Order endpoints travel over the push channel; the `/api/...` paths are
//! addressed through the same correlated envelope.

/// Create (`POST`), update (`PUT`) and cancel (`DELETE`) orders.
pub const ORDER_PATH: &str = "/order";

/// Transfer to margin (`POST`) and clear margin (`DELETE`).
pub const MARGIN_PATH: &str = "/api/margin";

/// Submit a signed withdrawal.
pub const TX_PATH: &str = "/api/tx";

/// Fetch the server-built recovery transaction.
pub const WITHDRAW_TX_PATH: &str = "/api/withdrawtx";

/// Authoritative account snapshot.
pub const USER_DETAILS_PATH: &str = "/api/userdetails";

/// Initial instrument/network configuration (plain HTTP).
pub const CONFIG_PATH: &str = "/api/v1/config";

/// Default base URL for the bootstrap HTTP client (local development server).
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
