//! Account session: one margin account's live projection plus the operations
//! that mutate it.
//!
//! Components:
//! - [`correlator::RequestCorrelator`]: pending-request table keyed by `requestid`
//! - [`reconciler`]: dispatcher task, the only writer of the account store
//! - [`margin::MarginPreflightGuard`]: local margin gate before order submission
//! - [`feed::BalanceFeedRouter`]: two-address balance subscription
//! - [`tx::TransactionWorkflow`]: withdraw / margin transfer / recovery
//!
//! ```rust,ignore
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
//! let orders = session.create_orders(vec![OrderDraft::limit(Side::Buy, price, qty)]).await?;
//! ```

pub mod correlator;
pub mod feed;
pub mod margin;
pub mod reconciler;
pub mod tx;

use crate::domain::account::{
    AccountBalance, AccountStateStore, BidAsk, MarginCalculator, Pnl, UserDetails,
};
use crate::domain::config::ServerConfig;
use crate::domain::order::validation::{self, validate_create, validate_update};
use crate::domain::order::wire::UpdateOrdersBody;
use crate::domain::order::{Order, OrderDraft};
use crate::domain::tx::{ChainIndex, SignedTx, SigningKeys, TxBuilder, TxSigner};
use crate::error::SdkError;
use crate::network::{ORDER_PATH, USER_DETAILS_PATH};
use crate::shared::{Address, OrderId};
use crate::ws::{ConnectionState, EventSink, Method, Transport, TransportId};

use correlator::RequestCorrelator;
use feed::{BalanceFeed, BalanceFeedRouter};
use margin::MarginPreflightGuard;
use reconciler::{EventReconciler, Followup, Inbound, SessionStatus};
use tx::TransactionWorkflow;

use async_lock::RwLock;
use dashmap::DashSet;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

// ─── SessionConfig ───────────────────────────────────────────────────────────

/// Client-side session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a correlated request may stay pending.
    pub request_timeout: Duration,
    /// Base URL for the bootstrap HTTP client.
    pub api_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            api_url: crate::network::DEFAULT_API_URL.to_string(),
        }
    }
}

/// Fetch the server config a session is built from (`GET /api/v1/config`).
#[cfg(feature = "http")]
pub async fn fetch_bootstrap_config(
    config: &SessionConfig,
) -> Result<crate::domain::config::BootstrapConfig, SdkError> {
    let http = crate::http::SessionHttp::new(&config.api_url)?;
    Ok(http.get_config().await?)
}

// ─── AccountSession ──────────────────────────────────────────────────────────

/// A live margin account session.
///
/// Dropping the session (or calling [`AccountSession::shutdown`]) stops the
/// dispatcher, unsubscribes the balance feed and fails every pending request.
pub struct AccountSession {
    store: Arc<RwLock<AccountStateStore>>,
    correlator: Arc<RequestCorrelator>,
    router: Arc<BalanceFeedRouter>,
    chain: Arc<dyn ChainIndex>,
    workflow: TransactionWorkflow,
    inbound: mpsc::UnboundedSender<Inbound>,
    status: Arc<SessionStatus>,
    attached: DashSet<TransportId>,
    dispatcher: JoinHandle<()>,
    closed: bool,
}

impl AccountSession {
    pub fn builder() -> AccountSessionBuilder {
        AccountSessionBuilder::default()
    }

    /// Event sink for a transport. Returns `None` if this transport is already attached.
    pub fn attach(&self, transport: TransportId) -> Option<EventSink> {
        if !self.attached.insert(transport) {
            tracing::debug!("Transport {:?} already attached", transport);
            return None;
        }
        Some(EventSink::new(transport, self.inbound.clone()))
    }

    /// Allow a transport to attach again (e.g. after it was torn down and rebuilt).
    pub fn detach(&self, transport: TransportId) -> bool {
        self.attached.remove(&transport).is_some()
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub async fn open_orders(&self) -> Vec<Order> {
        self.store.read().await.open_orders()
    }

    pub async fn open_orders_map(&self) -> HashMap<OrderId, Order> {
        self.store.read().await.open_orders_map()
    }

    pub async fn bid_ask(&self) -> BidAsk {
        self.store.read().await.bid_ask()
    }

    pub async fn balance(&self) -> AccountBalance {
        self.store.read().await.balance()
    }

    pub async fn config(&self) -> ServerConfig {
        self.store.read().await.config()
    }

    pub async fn pnl(&self) -> Option<Pnl> {
        self.store.read().await.pnl()
    }

    pub async fn positions(&self) -> Option<serde_json::Value> {
        self.store.read().await.positions()
    }

    pub async fn available_margin(&self) -> Decimal {
        self.store.read().await.available_margin()
    }

    /// Margin that would remain if `drafts` were accepted.
    pub async fn post_available_margin(&self, drafts: &[OrderDraft]) -> Decimal {
        let store = self.store.read().await;
        MarginPreflightGuard::new(&store).post_available_margin(drafts)
    }

    /// Round `price` to the instrument's tick precision.
    pub async fn fixed_price(&self, price: Decimal) -> Result<Decimal, SdkError> {
        let instrument = self.store.read().await.config().instrument;
        Ok(validation::fixed_price(price, &instrument)?)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.status.connection_state()
    }

    pub fn is_read_only(&self) -> bool {
        self.status.is_read_only()
    }

    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }

    // ── Orders ───────────────────────────────────────────────────────────

    /// Create orders. Validation and margin preflight run before anything is sent.
    pub async fn create_orders(&self, drafts: Vec<OrderDraft>) -> Result<Vec<Order>, SdkError> {
        log_orders(&drafts);
        {
            let store = self.store.read().await;
            validate_create(&drafts, &store.config().instrument)?;
            MarginPreflightGuard::new(&store).check_proposed_orders(&drafts)?;
        }
        let body = serde_json::to_value(&drafts)?;
        let value = self
            .resync_on_failure(self.correlator.request(Method::Post, ORDER_PATH, body).await)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Update open orders by id.
    pub async fn update_orders(&self, drafts: Vec<OrderDraft>) -> Result<Vec<Order>, SdkError> {
        log_orders(&drafts);
        {
            let store = self.store.read().await;
            validate_update(&drafts, &store.open_order_set(), &store.config().instrument)?;
            MarginPreflightGuard::new(&store).check_proposed_orders(&drafts)?;
        }
        let body = serde_json::to_value(UpdateOrdersBody { orders: &drafts })?;
        let value = self
            .resync_on_failure(self.correlator.request(Method::Put, ORDER_PATH, body).await)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Cancel one order; resolves with the removed id.
    pub async fn cancel_order(&self, uuid: &OrderId) -> Result<OrderId, SdkError> {
        let value = self.resync_on_failure(
            self.correlator
                .request(Method::Delete, ORDER_PATH, serde_json::json!([uuid]))
                .await,
        )?;
        Ok(serde_json::from_value(value)?)
    }

    /// Cancel every open order; resolves with the resynced order set.
    pub async fn close_all(&self) -> Result<Vec<Order>, SdkError> {
        let value = self.resync_on_failure(
            self.correlator
                .request(Method::Delete, ORDER_PATH, serde_json::json!([]))
                .await,
        )?;
        Ok(serde_json::from_value(value)?)
    }

    // ── Transactions ─────────────────────────────────────────────────────

    pub async fn withdraw(
        &self,
        destination: Address,
        amount: Decimal,
        fee: Decimal,
    ) -> Result<serde_json::Value, SdkError> {
        self.resync_on_failure(self.workflow.withdraw(destination, amount, fee).await)
    }

    pub async fn transfer_to_margin(
        &self,
        amount: Decimal,
        fee_inclusive: bool,
    ) -> Result<serde_json::Value, SdkError> {
        self.resync_on_failure(self.workflow.transfer_to_margin(amount, fee_inclusive).await)
    }

    pub async fn recovery_tx(&self) -> Result<SignedTx, SdkError> {
        self.workflow.recovery_tx().await
    }

    pub async fn clear_margin(&self) -> Result<serde_json::Value, SdkError> {
        self.resync_on_failure(self.workflow.clear_margin().await)
    }

    // ── Resync ───────────────────────────────────────────────────────────

    /// Queue a snapshot when a state-changing request ended without a server
    /// answer. The error is returned unchanged.
    fn resync_on_failure<T>(&self, result: Result<T, SdkError>) -> Result<T, SdkError> {
        if let Err(SdkError::Timeout { .. } | SdkError::Transport(_)) = &result {
            if self.inbound.send(Inbound::Resync).is_err() {
                tracing::debug!("Resync after failure dropped, session closed");
            }
        }
        result
    }

    /// Fetch the authoritative snapshot and wait until it has been applied.
    pub async fn refresh(&self) -> Result<(), SdkError> {
        let result = self
            .correlator
            .request(Method::Get, USER_DETAILS_PATH, serde_json::Value::Null)
            .await
            .and_then(|value| serde_json::from_value::<UserDetails>(value).map_err(SdkError::from));
        let (ack, done) = oneshot::channel();
        self.inbound
            .send(Inbound::Snapshot {
                result,
                followup: Followup::Ack(ack),
            })
            .map_err(|_| SdkError::SessionClosed)?;
        done.await.map_err(|_| SdkError::SessionClosed)?
    }

    /// Fetch both address balances from the chain index and route them into the store.
    pub async fn update_account_balance(&self) -> Result<(), SdkError> {
        let (server, account) = futures_util::future::try_join(
            self.chain.address_balance(self.router.server_address()),
            self.chain.address_balance(self.router.account_address()),
        )
        .await?;

        let mut acks = Vec::with_capacity(2);
        for balance in [server, account] {
            let (ack, done) = oneshot::channel();
            self.inbound
                .send(Inbound::Balance {
                    balance,
                    ack: Some(ack),
                })
                .map_err(|_| SdkError::SessionClosed)?;
            acks.push(done);
        }
        for done in acks {
            done.await.map_err(|_| SdkError::SessionClosed)?;
        }
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::info!("Shutting down account session");
        self.dispatcher.abort();
        self.router.stop();
        self.correlator.fail_all();
    }
}

impl Drop for AccountSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn log_orders(drafts: &[OrderDraft]) {
    for draft in drafts {
        tracing::info!(
            "{} uuid {} price {} side {} type {}",
            if draft.is_create() { "create" } else { "update" },
            draft.uuid.as_ref().map(|u| u.as_str()).unwrap_or("-"),
            draft.price,
            draft.side,
            draft.order_type
        );
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct AccountSessionBuilder {
    account: Option<Address>,
    server: Option<Address>,
    keys: Option<SigningKeys>,
    transport: Option<Arc<dyn Transport>>,
    balance_feed: Option<Arc<dyn BalanceFeed>>,
    chain: Option<Arc<dyn ChainIndex>>,
    tx_builder: Option<Arc<dyn TxBuilder>>,
    signer: Option<Arc<dyn TxSigner>>,
    calculator: Option<Arc<dyn MarginCalculator>>,
    server_config: Option<ServerConfig>,
    config: SessionConfig,
}

impl AccountSessionBuilder {
    /// The account's own multisig address.
    pub fn account_address(mut self, address: Address) -> Self {
        self.account = Some(address);
        self
    }

    /// The server's margin address.
    pub fn server_address(mut self, address: Address) -> Self {
        self.server = Some(address);
        self
    }

    pub fn signing_keys(mut self, keys: SigningKeys) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn balance_feed(mut self, feed: Arc<dyn BalanceFeed>) -> Self {
        self.balance_feed = Some(feed);
        self
    }

    pub fn chain_index(mut self, chain: Arc<dyn ChainIndex>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn tx_builder(mut self, builder: Arc<dyn TxBuilder>) -> Self {
        self.tx_builder = Some(builder);
        self
    }

    pub fn tx_signer(mut self, signer: Arc<dyn TxSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn margin_calculator(mut self, calculator: Arc<dyn MarginCalculator>) -> Self {
        self.calculator = Some(calculator);
        self
    }

    /// Initial server config (usually `BootstrapConfig::config`).
    pub fn server_config(mut self, config: ServerConfig) -> Self {
        self.server_config = Some(config);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Assemble the session, spawn its dispatcher and subscribe the balance feed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<AccountSession, SdkError> {
        let account = required(self.account, "account address")?;
        let server = required(self.server, "server address")?;
        let keys = required(self.keys, "signing keys")?;
        let transport = required(self.transport, "transport")?;
        let feed = required(self.balance_feed, "balance feed")?;
        let chain = required(self.chain, "chain index")?;
        let tx_builder = required(self.tx_builder, "transaction builder")?;
        let signer = required(self.signer, "transaction signer")?;
        let calculator = required(self.calculator, "margin calculator")?;

        let store = Arc::new(RwLock::new(AccountStateStore::new(
            self.server_config.unwrap_or_default(),
            calculator,
        )));
        let correlator = Arc::new(RequestCorrelator::new(
            transport.clone(),
            self.config.request_timeout,
        ));
        let router = Arc::new(BalanceFeedRouter::new(feed, account.clone(), server.clone()));
        let status = Arc::new(SessionStatus::new());
        let (inbound, rx) = mpsc::unbounded_channel();

        let reconciler = EventReconciler::new(
            store.clone(),
            correlator.clone(),
            transport,
            router.clone(),
            inbound.clone(),
            status.clone(),
        );
        let dispatcher = tokio::spawn(reconciler.run(rx));
        router.start(inbound.clone());

        let workflow = TransactionWorkflow::new(
            chain.clone(),
            tx_builder,
            signer,
            correlator.clone(),
            store.clone(),
            keys,
            account.clone(),
            server,
        );

        tracing::info!("Account session started for {}", account);

        Ok(AccountSession {
            store,
            correlator,
            router,
            chain,
            workflow,
            inbound,
            status,
            attached: DashSet::new(),
            dispatcher,
            closed: false,
        })
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, SdkError> {
    value.ok_or_else(|| SdkError::Other(format!("{} is required", name)))
}
