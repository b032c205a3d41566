//! Balance feed routing: two subscribed addresses, two balance slots.

use crate::domain::account::{AddressBalance, BalanceSlot};
use crate::session::reconciler::Inbound;
use crate::shared::Address;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Callback invoked by the feed for every balance change.
pub type BalanceCallback = Arc<dyn Fn(AddressBalance) + Send + Sync>;

/// Address balance subscription service.
pub trait BalanceFeed: Send + Sync {
    fn subscribe(&self, address: &Address, callback: BalanceCallback);

    fn unsubscribe(&self, address: &Address);
}

/// Subscribes exactly the account and server addresses and maps incoming
/// updates to balance slots.
pub struct BalanceFeedRouter {
    feed: Arc<dyn BalanceFeed>,
    account: Address,
    server: Address,
}

impl BalanceFeedRouter {
    pub fn new(feed: Arc<dyn BalanceFeed>, account: Address, server: Address) -> Self {
        Self {
            feed,
            account,
            server,
        }
    }

    pub fn account_address(&self) -> &Address {
        &self.account
    }

    pub fn server_address(&self) -> &Address {
        &self.server
    }

    /// Subscribe both addresses with one callback that forwards into the
    /// session's inbound queue.
    pub(crate) fn start(&self, inbound: mpsc::UnboundedSender<Inbound>) {
        let callback: BalanceCallback = Arc::new(move |balance: AddressBalance| {
            if inbound
                .send(Inbound::Balance { balance, ack: None })
                .is_err()
            {
                tracing::debug!("Balance update after session shutdown dropped");
            }
        });
        self.feed.subscribe(&self.account, callback.clone());
        self.feed.subscribe(&self.server, callback);
    }

    /// Slot for an incoming update. Any other address is unsubscribed and ignored.
    pub fn route(&self, info: &AddressBalance) -> Option<BalanceSlot> {
        if info.address == self.account {
            Some(BalanceSlot::Multisig)
        } else if info.address == self.server {
            Some(BalanceSlot::Margin)
        } else {
            tracing::warn!("Balance update for unexpected address {}, unsubscribing", info.address);
            self.feed.unsubscribe(&info.address);
            None
        }
    }

    pub fn stop(&self) {
        self.feed.unsubscribe(&self.account);
        self.feed.unsubscribe(&self.server);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingFeed {
        subscribed: Mutex<Vec<Address>>,
        unsubscribed: Mutex<Vec<Address>>,
    }

    impl BalanceFeed for RecordingFeed {
        fn subscribe(&self, address: &Address, _callback: BalanceCallback) {
            self.subscribed.lock().unwrap().push(address.clone());
        }

        fn unsubscribe(&self, address: &Address) {
            self.unsubscribed.lock().unwrap().push(address.clone());
        }
    }

    fn update(address: &str) -> AddressBalance {
        AddressBalance {
            address: Address::from(address),
            confirmed: Decimal::ONE,
            unconfirmed: Decimal::ZERO,
            balance: Decimal::ONE,
        }
    }

    fn router() -> (BalanceFeedRouter, Arc<RecordingFeed>) {
        let feed = Arc::new(RecordingFeed::default());
        let router = BalanceFeedRouter::new(feed.clone(), Address::from("account"), Address::from("server"));
        (router, feed)
    }

    #[test]
    fn test_start_subscribes_exactly_two() {
        let (router, feed) = router();
        let (tx, _rx) = mpsc::unbounded_channel();
        router.start(tx);
        assert_eq!(
            *feed.subscribed.lock().unwrap(),
            vec![Address::from("account"), Address::from("server")]
        );
    }

    #[test]
    fn test_route_known_addresses() {
        let (router, feed) = router();
        assert_eq!(router.route(&update("account")), Some(BalanceSlot::Multisig));
        assert_eq!(router.route(&update("server")), Some(BalanceSlot::Margin));
        assert!(feed.unsubscribed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_address_unsubscribed_once() {
        let (router, feed) = router();
        assert_eq!(router.route(&update("stranger")), None);
        assert_eq!(*feed.unsubscribed.lock().unwrap(), vec![Address::from("stranger")]);
    }

    #[test]
    fn test_stop_unsubscribes_both() {
        let (router, feed) = router();
        router.stop();
        assert_eq!(feed.unsubscribed.lock().unwrap().len(), 2);
    }
}
