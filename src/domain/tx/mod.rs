//! Transaction domain: unspent outputs, transaction specs, fee policy, and the
//! chain/builder/signer collaborators the session delegates to.

use crate::domain::account::Balance;
use crate::domain::config::Network;
use crate::error::{SdkError, ValidationError};
use crate::shared::Address;
use async_trait::async_trait;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

// ─── Wire-level values ──────────────────────────────────────────────────────

/// A confirmed spendable output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unspent {
    pub txid: String,
    pub vout: u32,
    /// Value in the smallest unit.
    pub amount: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Unsigned transaction, opaque to the session (hex or builder-specific encoding).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct UnsignedTx(pub String);

/// Signed transaction ready for submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SignedTx(pub String);

// ─── Fee policy ─────────────────────────────────────────────────────────────

/// How the builder should account for the network fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Explicit fee in the smallest unit.
    Fixed(u64),
    /// Fee is deducted from the amount.
    Inclusive,
    /// Fee is paid on top of the amount.
    Exclusive,
}

impl FeePolicy {
    pub fn from_inclusive(fee_inclusive: bool) -> Self {
        if fee_inclusive {
            FeePolicy::Inclusive
        } else {
            FeePolicy::Exclusive
        }
    }
}

/// Input to the transaction builder.
#[derive(Debug, Clone, PartialEq)]
pub struct TxSpec {
    pub input: Address,
    pub destination: Address,
    pub amount: u64,
    pub unspents: Vec<Unspent>,
    pub is_multisig: bool,
    pub network: Network,
    pub fee: FeePolicy,
}

/// Floor an amount to whole smallest units.
pub fn floor_amount(amount: Decimal) -> Result<u64, ValidationError> {
    if amount.is_sign_negative() {
        return Err(ValidationError::InvalidAmount(amount.to_string()));
    }
    amount
        .floor()
        .to_u64()
        .ok_or_else(|| ValidationError::InvalidAmount(amount.to_string()))
}

// ─── Key material ───────────────────────────────────────────────────────────

/// Private key and multisig redeem script used for signing.
#[derive(Clone)]
pub struct SigningKeys {
    pub private_key: String,
    pub redeem_script: String,
}

impl SigningKeys {
    pub fn new(private_key: impl Into<String>, redeem_script: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            redeem_script: redeem_script.into(),
        }
    }
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeys")
            .field("private_key", &"<redacted>")
            .field("redeem_script", &self.redeem_script)
            .finish()
    }
}

// ─── Collaborators ──────────────────────────────────────────────────────────

/// UTXO/address index.
#[async_trait]
pub trait ChainIndex: Send + Sync {
    async fn confirmed_unspents(&self, address: &Address) -> Result<Vec<Unspent>, SdkError>;

    async fn address_balance(&self, address: &Address) -> Result<Balance, SdkError>;
}

/// Builds unsigned transactions (input selection, change, fees).
pub trait TxBuilder: Send + Sync {
    fn create_tx(&self, spec: TxSpec) -> Result<UnsignedTx, SdkError>;
}

/// Signs transactions with the account's keys.
pub trait TxSigner: Send + Sync {
    fn sign(
        &self,
        tx: &UnsignedTx,
        keys: &SigningKeys,
        is_multisig: bool,
    ) -> Result<SignedTx, SdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_floor_amount() {
        assert_eq!(floor_amount(dec!(1500.99)), Ok(1500));
        assert_eq!(floor_amount(dec!(0)), Ok(0));
        assert!(matches!(
            floor_amount(dec!(-1)),
            Err(ValidationError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_signing_keys_debug_redacts_private_key() {
        let keys = SigningKeys::new("secret-wif", "5221...ae");
        let debug = format!("{:?}", keys);
        assert!(!debug.contains("secret-wif"));
        assert!(debug.contains("5221...ae"));
    }

    #[test]
    fn test_signed_tx_is_transparent() {
        let json = serde_json::to_string(&SignedTx("0100".to_string())).unwrap();
        assert_eq!(json, "\"0100\"");
    }
}
