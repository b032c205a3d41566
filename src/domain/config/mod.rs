//! Server-supplied configuration: network, instrument parameters, bootstrap payload.

use serde::{Deserialize, Serialize};

/// Blockchain network the server runs against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Livenet,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Network::Testnet => write!(f, "testnet"),
            Network::Livenet => write!(f, "livenet"),
        }
    }
}

/// Instrument parameters consumed by validation and the margin calculator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InstrumentConfig {
    /// Number of decimal places a price may carry.
    #[serde(default)]
    pub ticksize: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Server config, replaced wholesale on every `config` push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `GET /api/v1/config` response used to bootstrap a session.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BootstrapConfig {
    pub config: ServerConfig,
    #[serde(default)]
    pub instruments: serde_json::Value,
}
