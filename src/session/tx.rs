//! Transaction workflows: withdraw, margin transfer, recovery, margin clear.
//!
//! Unspent lookup, construction and signing are delegated to collaborators;
//! submission goes through the request correlator.

use crate::domain::account::AccountStateStore;
use crate::domain::tx::{
    floor_amount, ChainIndex, FeePolicy, SignedTx, SigningKeys, TxBuilder, TxSigner, TxSpec,
    UnsignedTx,
};
use crate::error::SdkError;
use crate::network::{MARGIN_PATH, TX_PATH, WITHDRAW_TX_PATH};
use crate::session::correlator::RequestCorrelator;
use crate::shared::Address;
use crate::ws::Method;

use async_lock::RwLock;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct WithdrawTxResponse {
    tx: UnsignedTx,
}

pub struct TransactionWorkflow {
    chain: Arc<dyn ChainIndex>,
    builder: Arc<dyn TxBuilder>,
    signer: Arc<dyn TxSigner>,
    correlator: Arc<RequestCorrelator>,
    store: Arc<RwLock<AccountStateStore>>,
    keys: SigningKeys,
    account: Address,
    server: Address,
}

impl TransactionWorkflow {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        chain: Arc<dyn ChainIndex>,
        builder: Arc<dyn TxBuilder>,
        signer: Arc<dyn TxSigner>,
        correlator: Arc<RequestCorrelator>,
        store: Arc<RwLock<AccountStateStore>>,
        keys: SigningKeys,
        account: Address,
        server: Address,
    ) -> Self {
        Self {
            chain,
            builder,
            signer,
            correlator,
            store,
            keys,
            account,
            server,
        }
    }

    /// Send `amount` from the account's multisig address to `destination`.
    pub async fn withdraw(
        &self,
        destination: Address,
        amount: Decimal,
        fee: Decimal,
    ) -> Result<serde_json::Value, SdkError> {
        let amount = floor_amount(amount)?;
        let fee = floor_amount(fee)?;
        let signed = self
            .build_and_sign(destination, amount, FeePolicy::Fixed(fee))
            .await?;
        tracing::info!("Submitting withdrawal of {} (fee {})", amount, fee);
        self.correlator
            .request(Method::Post, TX_PATH, serde_json::json!({ "tx": signed }))
            .await
    }

    /// Move `amount` from the multisig address to the server's margin address.
    pub async fn transfer_to_margin(
        &self,
        amount: Decimal,
        fee_inclusive: bool,
    ) -> Result<serde_json::Value, SdkError> {
        let amount = floor_amount(amount)?;
        let signed = self
            .build_and_sign(self.server.clone(), amount, FeePolicy::from_inclusive(fee_inclusive))
            .await?;
        tracing::info!("Submitting margin transfer of {}", amount);
        self.correlator
            .request(
                Method::Post,
                MARGIN_PATH,
                serde_json::json!([{ "txs": [signed] }]),
            )
            .await
    }

    /// Fetch the server's pre-built recovery transaction and sign it.
    pub async fn recovery_tx(&self) -> Result<SignedTx, SdkError> {
        let value = self
            .correlator
            .request(Method::Get, WITHDRAW_TX_PATH, serde_json::Value::Null)
            .await?;
        let withdraw: WithdrawTxResponse = serde_json::from_value(value)?;
        self.signer.sign(&withdraw.tx, &self.keys, false)
    }

    pub async fn clear_margin(&self) -> Result<serde_json::Value, SdkError> {
        self.correlator
            .request(Method::Delete, MARGIN_PATH, serde_json::Value::Null)
            .await
    }

    async fn build_and_sign(
        &self,
        destination: Address,
        amount: u64,
        fee: FeePolicy,
    ) -> Result<SignedTx, SdkError> {
        let unspents = self.chain.confirmed_unspents(&self.account).await?;
        let network = self.store.read().await.config().network;
        let tx = self.builder.create_tx(TxSpec {
            input: self.account.clone(),
            destination,
            amount,
            unspents,
            is_multisig: true,
            network,
            fee,
        })?;
        self.signer.sign(&tx, &self.keys, true)
    }
}
