//! Event reconciler: the session's single serialization point.
//!
//! One dispatcher task consumes [`Inbound`] messages in order: transport push
//! events, balance-feed updates and snapshot follow-ups. It is the only writer
//! of the account store. Snapshot fetches run in spawned tasks that post their
//! outcome back into the same queue, so a slow fetch never stalls later events.

use crate::domain::account::wire::{ReadOnlyStatus, UserMessage};
use crate::domain::account::{AccountStateStore, AddressBalance, UserDetails};
use crate::domain::order::wire::{OrderErrorPayload, OrderRemoved, OrderResult, OrdersCleared};
use crate::domain::order::Order;
use crate::error::SdkError;
use crate::network::USER_DETAILS_PATH;
use crate::session::correlator::RequestCorrelator;
use crate::session::feed::BalanceFeedRouter;
use crate::shared::RequestId;
use crate::ws::{ConnectionState, Kind, Method, PushEvent, Transport};

use async_lock::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// ─── Inbound queue ───────────────────────────────────────────────────────────

/// Everything the dispatcher processes, in arrival order.
pub(crate) enum Inbound {
    Push(PushEvent),
    Balance {
        balance: AddressBalance,
        ack: Option<oneshot::Sender<()>>,
    },
    Snapshot {
        result: Result<UserDetails, SdkError>,
        followup: Followup,
    },
    /// A request failed without a server answer; its outcome is unknown.
    Resync,
}

/// What to do once a requested snapshot has been applied.
pub(crate) enum Followup {
    /// Initial fetch after connect, or a resync after an unanswered request.
    Activate,
    /// Recovery from read-only mode.
    ClearReadOnly,
    /// Resolve an `orders_del` request with the resynced order set.
    ResolveFlat(Option<RequestId>),
    /// Caller-initiated refresh waiting for completion.
    Ack(oneshot::Sender<Result<(), SdkError>>),
}

// ─── Shared status ───────────────────────────────────────────────────────────

/// Connectivity and read-only flags readable from outside the dispatcher.
#[derive(Debug)]
pub struct SessionStatus {
    state: AtomicU8,
    read_only: AtomicBool,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            read_only: AtomicBool::new(false),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ─── EventReconciler ─────────────────────────────────────────────────────────

pub(crate) struct EventReconciler {
    store: Arc<RwLock<AccountStateStore>>,
    correlator: Arc<RequestCorrelator>,
    transport: Arc<dyn Transport>,
    router: Arc<BalanceFeedRouter>,
    inbound: mpsc::UnboundedSender<Inbound>,
    status: Arc<SessionStatus>,
    connected: bool,
    /// A `readonly: false` is waiting on its resync and no `readonly: true` came after it.
    pending_clear: bool,
}

impl EventReconciler {
    pub(crate) fn new(
        store: Arc<RwLock<AccountStateStore>>,
        correlator: Arc<RequestCorrelator>,
        transport: Arc<dyn Transport>,
        router: Arc<BalanceFeedRouter>,
        inbound: mpsc::UnboundedSender<Inbound>,
        status: Arc<SessionStatus>,
    ) -> Self {
        Self {
            store,
            correlator,
            transport,
            router,
            inbound,
            status,
            connected: false,
            pending_clear: false,
        }
    }

    /// Dispatcher loop. Runs until every sender is gone or the task is aborted.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(inbound) = rx.recv().await {
            self.handle(inbound).await;
        }
        tracing::debug!("Dispatcher stopped");
    }

    pub(crate) async fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Push(event) => self.on_push(event).await,
            Inbound::Balance { balance, ack } => {
                if let Some(slot) = self.router.route(&balance) {
                    tracing::debug!("Balance update for {} ({})", slot, balance.address);
                    self.store.write().await.replace_balance(slot, balance);
                }
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            Inbound::Snapshot { result, followup } => self.on_snapshot(result, followup).await,
            Inbound::Resync => self.on_resync(),
        }
    }

    // ── Connectivity ─────────────────────────────────────────────────────

    async fn on_push(&mut self, event: PushEvent) {
        if event.is_connect() {
            self.on_connect();
            return;
        }
        if event.is_disconnect() {
            tracing::info!("Transport disconnected: {:?}", event);
            self.connected = false;
            self.status.set_state(ConnectionState::Disconnected);
            return;
        }
        if let PushEvent::Message(kind) = event {
            self.on_message(kind).await;
        }
    }

    fn on_connect(&mut self) {
        if self.connected {
            tracing::debug!("Already connected, ignoring connect event");
            return;
        }
        tracing::info!("Transport connected, registering session");
        self.connected = true;
        self.status.set_state(ConnectionState::Connecting);
        self.register();

        if self.status.is_read_only() {
            tracing::info!("Read-only mode, deferring snapshot");
            return;
        }
        self.request_snapshot(Followup::Activate);
    }

    fn on_read_only(&mut self, status: ReadOnlyStatus) {
        if status.readonly {
            if self.pending_clear {
                tracing::info!("Server re-entered read-only mode before resync completed");
                self.pending_clear = false;
            }
            if !self.status.is_read_only() {
                tracing::info!("Server entered read-only mode");
                self.status.set_read_only(true);
            }
            return;
        }
        if !self.status.is_read_only() || self.pending_clear {
            return;
        }
        tracing::info!("Server left read-only mode, resyncing");
        self.pending_clear = true;
        self.register();
        self.request_snapshot(Followup::ClearReadOnly);
    }

    fn on_resync(&self) {
        if !self.connected {
            tracing::debug!("Resync skipped while disconnected, reconnect will fetch a snapshot");
            return;
        }
        if self.status.is_read_only() {
            tracing::debug!("Resync skipped in read-only mode");
            return;
        }
        tracing::info!("Resyncing after unanswered request");
        self.request_snapshot(Followup::Activate);
    }

    fn register(&self) {
        if let Err(e) = self.transport.register() {
            tracing::warn!("Session registration failed: {}", e);
        }
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    fn request_snapshot(&self, followup: Followup) {
        let handle = self
            .correlator
            .send(Method::Get, USER_DETAILS_PATH, serde_json::Value::Null);
        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            let result = handle
                .wait()
                .await
                .and_then(|value| serde_json::from_value::<UserDetails>(value).map_err(SdkError::from));
            let _ = inbound.send(Inbound::Snapshot { result, followup });
        });
    }

    async fn on_snapshot(&mut self, result: Result<UserDetails, SdkError>, followup: Followup) {
        let details = match result {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!("Snapshot fetch failed: {}", e);
                match followup {
                    Followup::ResolveFlat(requestid) => {
                        self.correlator.reject(requestid.as_ref(), e);
                    }
                    Followup::Ack(ack) => {
                        let _ = ack.send(Err(e));
                    }
                    Followup::ClearReadOnly => self.pending_clear = false,
                    Followup::Activate => {}
                }
                return;
            }
        };

        self.apply_snapshot(details).await;

        match followup {
            Followup::Activate => {}
            Followup::ClearReadOnly => {
                if self.pending_clear {
                    self.pending_clear = false;
                    self.status.set_read_only(false);
                } else {
                    tracing::debug!("Read-only re-entered during resync, staying read-only");
                }
            }
            Followup::ResolveFlat(requestid) => {
                let orders = self.store.read().await.open_orders();
                self.resolve_with(requestid.as_ref(), &orders);
            }
            Followup::Ack(ack) => {
                let _ = ack.send(Ok(()));
            }
        }

        if self.connected && !self.status.is_read_only() {
            self.status.set_state(ConnectionState::Active);
        }
    }

    async fn apply_snapshot(&self, details: UserDetails) {
        let mut store = self.store.write().await;
        store.apply_snapshot(details);
        tracing::debug!(
            orders = store.open_orders().len(),
            available_margin = %store.available_margin(),
            "Applied account snapshot"
        );
    }

    // ── Message events ───────────────────────────────────────────────────

    async fn on_message(&mut self, kind: Kind) {
        match kind {
            Kind::OrderAdd(payload) | Kind::OrderUpdate(payload) => self.on_orders(payload).await,
            Kind::OrderDel(payload) => self.on_order_removed(payload).await,
            Kind::OrdersDel(payload) => self.on_flat(payload).await,
            Kind::OrderError(payload) => self.on_order_error(payload).await,
            Kind::UserMessage(message) => self.on_user_message(message).await,
            Kind::OrderBook(bid_ask) | Kind::DiffOrderBook(bid_ask) => {
                self.store.write().await.replace_bid_ask(bid_ask);
            }
            Kind::Config(config) => {
                tracing::debug!("Config replaced (network {})", config.network);
                self.store.write().await.replace_config(config);
            }
            Kind::ReadOnly(status) => self.on_read_only(status),
            Kind::AuthError(message) => {
                tracing::warn!("Authentication error: {}", message);
                self.transport.on_auth_error(&message);
            }
            Kind::Response(payload) => {
                self.correlator.resolve(payload.requestid.as_ref(), payload.result);
            }
            Kind::Trade(_) | Kind::Ntp(_) => {
                tracing::trace!("Ignoring trade/ntp push");
            }
        }
    }

    async fn on_orders(&self, payload: OrderResult) {
        let result = payload.result.clone();
        self.store.write().await.apply_order_upserts(payload.result);
        self.resolve_with(payload.requestid.as_ref(), &result);
    }

    async fn on_order_removed(&self, payload: OrderRemoved) {
        self.store.write().await.apply_order_removal(&payload.result);
        self.resolve_with(payload.requestid.as_ref(), &payload.result);
    }

    async fn on_flat(&self, payload: OrdersCleared) {
        if self.status.is_read_only() {
            tracing::warn!("Read-only mode, clearing local orders without a resync");
            self.store.write().await.clear_orders();
            self.resolve_with(payload.requestid.as_ref(), &Vec::<Order>::new());
            return;
        }
        self.request_snapshot(Followup::ResolveFlat(payload.requestid));
    }

    async fn on_order_error(&self, payload: OrderErrorPayload) {
        if payload.requestid.is_none() {
            tracing::warn!("Server error without requestid: {}", payload.error);
        }
        self.correlator.reject(
            payload.requestid.as_ref(),
            SdkError::Server {
                requestid: payload.requestid.clone(),
                error: payload.error,
            },
        );
        if let Some(details) = payload.user_details {
            self.apply_snapshot(details).await;
        }
    }

    async fn on_user_message(&self, message: UserMessage) {
        if let Some(error) = &message.error {
            tracing::warn!("Account message error: {}", error);
        }
        if let Some(details) = message.user_details {
            self.apply_snapshot(details).await;
        }
    }

    fn resolve_with<T: Serialize>(&self, requestid: Option<&RequestId>, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.correlator.resolve(requestid, value);
            }
            Err(e) => {
                self.correlator.reject(requestid, SdkError::Serde(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{BidAsk, MarginCalculator, Pnl};
    use crate::domain::config::{InstrumentConfig, ServerConfig};
    use crate::domain::order::OrderType;
    use crate::error::TransportError;
    use crate::session::feed::{BalanceCallback, BalanceFeed};
    use crate::shared::{Address, OrderId, Side};
    use crate::ws::{RequestEnvelope, TransportId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockTransport {
        registrations: Mutex<u32>,
        sent: Mutex<Vec<RequestEnvelope>>,
        auth_errors: Mutex<u32>,
    }

    impl MockTransport {
        fn snapshot_requests(&self) -> Vec<RequestId> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.uri == USER_DETAILS_PATH)
                .map(|e| e.requestid.clone())
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn id(&self) -> TransportId {
            TransportId(7)
        }

        fn register(&self) -> Result<(), TransportError> {
            *self.registrations.lock().unwrap() += 1;
            Ok(())
        }

        fn send(&self, envelope: RequestEnvelope) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(envelope);
            Ok(())
        }

        fn on_auth_error(&self, _message: &serde_json::Value) {
            *self.auth_errors.lock().unwrap() += 1;
        }
    }

    struct NullFeed;

    impl BalanceFeed for NullFeed {
        fn subscribe(&self, _address: &Address, _callback: BalanceCallback) {}
        fn unsubscribe(&self, _address: &Address) {}
    }

    struct Harness {
        reconciler: EventReconciler,
        rx: mpsc::UnboundedReceiver<Inbound>,
        transport: Arc<MockTransport>,
        correlator: Arc<RequestCorrelator>,
        store: Arc<RwLock<AccountStateStore>>,
        status: Arc<SessionStatus>,
    }

    impl Harness {
        fn new() -> Self {
            let calculator: Arc<dyn MarginCalculator> = Arc::new(
                |_: &[Order], _: Option<&Pnl>, _: &InstrumentConfig, margin: Decimal| margin,
            );
            let store = Arc::new(RwLock::new(AccountStateStore::new(
                ServerConfig::default(),
                calculator,
            )));
            let transport = Arc::new(MockTransport::default());
            let correlator = Arc::new(RequestCorrelator::new(
                transport.clone(),
                Duration::from_secs(5),
            ));
            let router = Arc::new(BalanceFeedRouter::new(
                Arc::new(NullFeed),
                Address::from("account"),
                Address::from("server"),
            ));
            let status = Arc::new(SessionStatus::new());
            let (tx, rx) = mpsc::unbounded_channel();
            let reconciler = EventReconciler::new(
                store.clone(),
                correlator.clone(),
                transport.clone(),
                router,
                tx,
                status.clone(),
            );
            Self {
                reconciler,
                rx,
                transport,
                correlator,
                store,
                status,
            }
        }

        async fn push(&mut self, event: PushEvent) {
            self.reconciler.handle(Inbound::Push(event)).await;
        }

        async fn message(&mut self, kind: Kind) {
            self.push(PushEvent::Message(kind)).await;
        }

        /// Answer the most recent snapshot request and feed the follow-up back in.
        async fn answer_snapshot(&mut self, details: serde_json::Value) {
            let id = self.transport.snapshot_requests().pop().unwrap();
            assert!(self.correlator.resolve(Some(&id), details));
            let followup = self.rx.recv().await.unwrap();
            self.reconciler.handle(followup).await;
        }
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

    #[tokio::test]
    async fn test_connect_is_idempotent_until_disconnect() {
        let mut h = Harness::new();
        h.push(PushEvent::Connected).await;
        h.push(PushEvent::Reconnected).await;
        assert_eq!(*h.transport.registrations.lock().unwrap(), 1);
        assert_eq!(h.transport.snapshot_requests().len(), 1);
        assert_eq!(h.status.connection_state(), ConnectionState::Connecting);

        h.answer_snapshot(serde_json::json!({"orders": []})).await;
        assert_eq!(h.status.connection_state(), ConnectionState::Active);

        h.push(PushEvent::ConnectTimeout).await;
        assert_eq!(h.status.connection_state(), ConnectionState::Disconnected);
        h.push(PushEvent::Connected).await;
        assert_eq!(*h.transport.registrations.lock().unwrap(), 2);
        assert_eq!(h.transport.snapshot_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_add_then_delete_leaves_no_orders() {
        let mut h = Harness::new();
        h.message(Kind::OrderAdd(OrderResult {
            requestid: None,
            result: vec![order("A", dec!(10))],
        }))
        .await;
        assert_eq!(h.store.read().await.open_orders().len(), 1);

        h.message(Kind::OrderDel(OrderRemoved {
            requestid: None,
            result: OrderId::from("A"),
        }))
        .await;
        assert!(h.store.read().await.open_orders().is_empty());
    }

    #[tokio::test]
    async fn test_order_add_resolves_matching_request() {
        let mut h = Harness::new();
        let handle = h.correlator.send(Method::Post, "/order", serde_json::json!([]));
        let id = handle.id().clone();
        h.message(Kind::OrderAdd(OrderResult {
            requestid: Some(id),
            result: vec![order("A", dec!(10))],
        }))
        .await;
        let value = handle.wait().await.unwrap();
        let orders: Vec<Order> = serde_json::from_value(value).unwrap();
        assert_eq!(orders[0].uuid, OrderId::from("A"));
    }

    #[tokio::test]
    async fn test_order_error_rejects_and_resyncs() {
        let mut h = Harness::new();
        h.store
            .write()
            .await
            .apply_order_upserts(vec![order("stale", dec!(1))]);
        let handle = h.correlator.send(Method::Post, "/order", serde_json::json!([]));
        let id = handle.id().clone();
        let payload: OrderErrorPayload = serde_json::from_value(serde_json::json!({
            "requestid": id,
            "error": "insufficient",
            "userDetails": {"orders": [{"uuid": "B", "side": "sell", "price": 5, "orderType": "limit", "quantity": 1}]}
        }))
        .unwrap();
        h.message(Kind::OrderError(payload)).await;

        assert!(matches!(handle.wait().await, Err(SdkError::Server { .. })));
        let orders = h.store.read().await.open_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].uuid, OrderId::from("B"));
    }

    #[tokio::test]
    async fn test_flatten_resolves_after_resync() {
        let mut h = Harness::new();
        h.store
            .write()
            .await
            .apply_order_upserts(vec![order("A", dec!(1))]);
        let handle = h.correlator.send(Method::Delete, "/order", serde_json::json!([]));
        let id = handle.id().clone();
        h.message(Kind::OrdersDel(OrdersCleared { requestid: Some(id) })).await;
        assert!(h.correlator.is_pending(handle.id()));

        h.answer_snapshot(serde_json::json!({"orders": []})).await;
        let value = handle.wait().await.unwrap();
        assert_eq!(value, serde_json::json!([]));
        assert!(h.store.read().await.open_orders().is_empty());
    }

    #[tokio::test]
    async fn test_read_only_defers_and_recovers() {
        let mut h = Harness::new();
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: true })).await;
        assert!(h.status.is_read_only());

        h.push(PushEvent::Connected).await;
        assert_eq!(*h.transport.registrations.lock().unwrap(), 1);
        assert!(h.transport.snapshot_requests().is_empty());

        // Same value again is a no-op.
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: true })).await;
        assert!(h.transport.snapshot_requests().is_empty());

        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: false })).await;
        assert_eq!(*h.transport.registrations.lock().unwrap(), 2);
        assert!(h.status.is_read_only());

        h.answer_snapshot(serde_json::json!({})).await;
        assert!(!h.status.is_read_only());
        assert_eq!(h.status.connection_state(), ConnectionState::Active);
    }

    #[tokio::test]
    async fn test_read_only_reentered_during_resync_sticks() {
        let mut h = Harness::new();
        h.push(PushEvent::Connected).await;
        h.answer_snapshot(serde_json::json!({})).await;

        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: true })).await;
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: false })).await;
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: true })).await;
        h.answer_snapshot(serde_json::json!({})).await;

        assert!(h.status.is_read_only());
        assert_eq!(h.status.connection_state(), ConnectionState::Active);

        // A later clear goes through normally.
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: false })).await;
        h.answer_snapshot(serde_json::json!({})).await;
        assert!(!h.status.is_read_only());
    }

    #[tokio::test]
    async fn test_duplicate_read_only_clear_fetches_once() {
        let mut h = Harness::new();
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: true })).await;
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: false })).await;
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: false })).await;
        assert_eq!(h.transport.snapshot_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_flatten_resolves_empty() {
        let mut h = Harness::new();
        h.store
            .write()
            .await
            .apply_order_upserts(vec![order("A", dec!(1))]);
        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: true })).await;
        let handle = h.correlator.send(Method::Delete, "/order", serde_json::json!([]));
        let id = handle.id().clone();
        h.message(Kind::OrdersDel(OrdersCleared { requestid: Some(id) })).await;

        assert_eq!(handle.wait().await.unwrap(), serde_json::json!([]));
        assert!(h.store.read().await.open_orders().is_empty());
        assert!(h.transport.snapshot_requests().is_empty());
    }

    #[tokio::test]
    async fn test_resync_requires_connection_and_write_mode() {
        let mut h = Harness::new();
        h.reconciler.handle(Inbound::Resync).await;
        assert!(h.transport.snapshot_requests().is_empty());

        h.push(PushEvent::Connected).await;
        h.answer_snapshot(serde_json::json!({})).await;
        h.reconciler.handle(Inbound::Resync).await;
        assert_eq!(h.transport.snapshot_requests().len(), 2);
        h.answer_snapshot(serde_json::json!({"orders": []})).await;

        h.message(Kind::ReadOnly(ReadOnlyStatus { readonly: true })).await;
        h.reconciler.handle(Inbound::Resync).await;
        assert_eq!(h.transport.snapshot_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_bid_ask_config_and_auth_events() {
        let mut h = Harness::new();
        h.message(Kind::DiffOrderBook(BidAsk {
            bid: Some(dec!(9)),
            ask: Some(dec!(11)),
        }))
        .await;
        assert_eq!(h.store.read().await.bid_ask().ask, Some(dec!(11)));

        let config: ServerConfig =
            serde_json::from_value(serde_json::json!({"network": "livenet", "instrument": {"ticksize": 3}})).unwrap();
        h.message(Kind::Config(config)).await;
        assert_eq!(h.store.read().await.config().instrument.ticksize, 3);

        h.message(Kind::AuthError(serde_json::json!({"reason": "expired"}))).await;
        assert_eq!(*h.transport.auth_errors.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_user_message_applies_snapshot() {
        let mut h = Harness::new();
        h.store
            .write()
            .await
            .apply_order_upserts(vec![order("A", dec!(1))]);
        let message: UserMessage = serde_json::from_value(serde_json::json!({
            "userDetails": {"orders": [], "pnl": {"pnl": 2}}
        }))
        .unwrap();
        h.message(Kind::UserMessage(message)).await;
        let store = h.store.read().await;
        assert!(store.open_orders().is_empty());
        assert_eq!(store.pnl().unwrap().pnl, dec!(2));
    }
}
