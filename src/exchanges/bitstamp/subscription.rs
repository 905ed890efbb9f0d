use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::exchanges::bitstamp::pairs::map_pair;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_tungstenite::tungstenite::Message;

/// Handler invoked with every data frame of a channel
pub type Callback = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure into a [`Callback`]
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |frame| Box::pin(f(frame)))
}

/// WebSocket channel kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    LiveTrades {
        pair: String,
    },
    LiveOrders {
        pair: String,
    },
    OrderBook {
        pair: String,
    },
    DetailOrderBook {
        pair: String,
    },
    DiffOrderBook {
        pair: String,
    },
    /// Own orders; `token` comes from the websockets token endpoint
    PrivateOrders {
        pair: String,
        user_id: String,
        token: String,
    },
    PrivateTrades {
        pair: String,
        user_id: String,
        token: String,
    },
}

impl Channel {
    pub fn live_trades(base: &str, quote: &str) -> Result<Self, ExchangeError> {
        Ok(Self::LiveTrades {
            pair: map_pair(base, quote)?.to_string(),
        })
    }

    pub fn live_orders(base: &str, quote: &str) -> Result<Self, ExchangeError> {
        Ok(Self::LiveOrders {
            pair: map_pair(base, quote)?.to_string(),
        })
    }

    pub fn order_book(base: &str, quote: &str) -> Result<Self, ExchangeError> {
        Ok(Self::OrderBook {
            pair: map_pair(base, quote)?.to_string(),
        })
    }

    pub fn detail_order_book(base: &str, quote: &str) -> Result<Self, ExchangeError> {
        Ok(Self::DetailOrderBook {
            pair: map_pair(base, quote)?.to_string(),
        })
    }

    pub fn diff_order_book(base: &str, quote: &str) -> Result<Self, ExchangeError> {
        Ok(Self::DiffOrderBook {
            pair: map_pair(base, quote)?.to_string(),
        })
    }

    pub fn private_orders(
        base: &str,
        quote: &str,
        user_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self::PrivateOrders {
            pair: map_pair(base, quote)?.to_string(),
            user_id: user_id.into(),
            token: token.into(),
        })
    }

    pub fn private_trades(
        base: &str,
        quote: &str,
        user_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self::PrivateTrades {
            pair: map_pair(base, quote)?.to_string(),
            user_id: user_id.into(),
            token: token.into(),
        })
    }

    /// Channel name as it appears on the wire
    pub fn name(&self) -> String {
        match self {
            Self::LiveTrades { pair } => format!("live_trades_{}", pair),
            Self::LiveOrders { pair } => format!("live_orders_{}", pair),
            Self::OrderBook { pair } => format!("order_book_{}", pair),
            Self::DetailOrderBook { pair } => format!("detail_order_book_{}", pair),
            Self::DiffOrderBook { pair } => format!("diff_order_book_{}", pair),
            Self::PrivateOrders { pair, user_id, .. } => {
                format!("private-my_orders_{}-{}", pair, user_id)
            }
            Self::PrivateTrades { pair, user_id, .. } => {
                format!("private-my_trades_{}-{}", pair, user_id)
            }
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::PrivateOrders { .. } | Self::PrivateTrades { .. })
    }

    /// Payload of the `bts:subscribe` request; private channels carry the auth token
    pub fn subscribe_message(&self) -> Value {
        match self {
            Self::PrivateOrders { token, .. } | Self::PrivateTrades { token, .. } => {
                json!({ "channel": self.name(), "auth": token })
            }
            _ => json!({ "channel": self.name() }),
        }
    }

    /// Payload of the `bts:unsubscribe` request, never carries a token
    pub fn unsubscribe_message(&self) -> Value {
        json!({ "channel": self.name() })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A channel together with the handlers for its data frames
#[derive(Clone)]
pub struct Subscription {
    channel: Channel,
    callbacks: Vec<Callback>,
}

impl Subscription {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            callbacks: Vec::new(),
        }
    }

    /// Append a handler; handlers run in the order they were added
    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn callbacks(&self) -> &[Callback] {
        &self.callbacks
    }

    /// Routing key, taken from the unsubscribe payload so it matches data frames
    pub fn channel_id(&self) -> String {
        self.channel
            .unsubscribe_message()
            .get("channel")
            .and_then(Value::as_str)
            .map_or_else(|| self.channel.name(), str::to_string)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel_id())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Active subscriptions in insertion order
///
/// Every method takes the lock once, so a frame batch is always built from a
/// single consistent snapshot.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<Vec<(String, Arc<Subscription>)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription and return its channel id.
    ///
    /// A channel id that is already registered is rejected with
    /// [`ExchangeError::DuplicateChannel`]; the existing entry and its callbacks
    /// are left untouched.
    pub fn add(&self, subscription: Subscription) -> Result<String, ExchangeError> {
        let channel_id = subscription.channel_id();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.iter().any(|(id, _)| *id == channel_id) {
            return Err(ExchangeError::DuplicateChannel(channel_id));
        }

        entries.push((channel_id.clone(), Arc::new(subscription)));
        Ok(channel_id)
    }

    pub fn remove(&self, channel_id: &str) -> Option<Arc<Subscription>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let index = entries.iter().position(|(id, _)| id == channel_id)?;
        Some(entries.remove(index).1)
    }

    pub fn lookup(&self, channel_id: &str) -> Option<Arc<Subscription>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(id, _)| id == channel_id)
            .map(|(_, subscription)| Arc::clone(subscription))
    }

    pub fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, subscription)| Arc::clone(subscription))
            .collect()
    }

    pub fn channel_ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Channel ids of subscriptions that need an auth token
    pub fn private_channel_ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, subscription)| subscription.channel().is_private())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Subscribe frames for every registered channel, in insertion order
    pub fn subscribe_frames<C: WsCodec>(&self, codec: &C) -> Result<Vec<Message>, ExchangeError> {
        self.snapshot()
            .iter()
            .map(|subscription| codec.encode_subscription(&subscription.channel().subscribe_message()))
            .collect()
    }

    /// Unsubscribe frames for every registered channel, in insertion order
    pub fn unsubscribe_frames<C: WsCodec>(&self, codec: &C) -> Result<Vec<Message>, ExchangeError> {
        self.snapshot()
            .iter()
            .map(|subscription| {
                codec.encode_unsubscription(&subscription.channel().unsubscribe_message())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::bitstamp::codec::BitstampCodec;

    fn frame_json(message: &Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    fn all_channels() -> Vec<Channel> {
        vec![
            Channel::live_trades("ltc", "eur").unwrap(),
            Channel::live_orders("ltc", "eur").unwrap(),
            Channel::order_book("btc", "usd").unwrap(),
            Channel::detail_order_book("btc", "usd").unwrap(),
            Channel::diff_order_book("btc", "usd").unwrap(),
            Channel::private_orders("btc", "usd", "42", "tok").unwrap(),
            Channel::private_trades("btc", "usd", "42", "tok").unwrap(),
        ]
    }

    #[test]
    fn test_channel_names() {
        let names: Vec<String> = all_channels().iter().map(Channel::name).collect();
        assert_eq!(
            names,
            vec![
                "live_trades_ltceur",
                "live_orders_ltceur",
                "order_book_btcusd",
                "detail_order_book_btcusd",
                "diff_order_book_btcusd",
                "private-my_orders_btcusd-42",
                "private-my_trades_btcusd-42",
            ]
        );
    }

    #[test]
    fn test_channel_id_matches_subscribe_payload() {
        for channel in all_channels() {
            let subscription = Subscription::new(channel.clone());
            assert_eq!(
                subscription.channel_id(),
                channel.subscribe_message()["channel"],
                "identity mismatch for {}",
                channel
            );
        }
    }

    #[test]
    fn test_private_token_only_in_subscribe_payload() {
        let channel = Channel::private_orders("btc", "usd", "42", "secret-token").unwrap();
        assert_eq!(channel.subscribe_message()["auth"], "secret-token");
        assert!(channel.unsubscribe_message().get("auth").is_none());
        assert!(channel.is_private());
        assert!(!Channel::live_trades("btc", "usd").unwrap().is_private());
    }

    #[test]
    fn test_unknown_pair_is_rejected() {
        assert!(matches!(
            Channel::live_trades("foo", "bar"),
            Err(ExchangeError::UnknownPair { .. })
        ));
    }

    #[test]
    fn test_add_then_lookup() {
        let registry = SubscriptionRegistry::new();
        let id = registry
            .add(Subscription::new(Channel::live_trades("ltc", "eur").unwrap()))
            .unwrap();

        assert_eq!(id, "live_trades_ltceur");
        assert!(registry.lookup(&id).is_some());
        assert!(registry.lookup("live_orders_ltceur").is_none());
    }

    #[test]
    fn test_duplicate_add_is_rejected_and_keeps_original() {
        let registry = SubscriptionRegistry::new();
        let noop = callback(|_| async { Ok(()) });
        registry
            .add(Subscription::new(Channel::live_trades("ltc", "eur").unwrap()).with_callback(noop))
            .unwrap();

        let result = registry.add(Subscription::new(Channel::live_trades("LTC", "EUR").unwrap()));
        assert!(matches!(result, Err(ExchangeError::DuplicateChannel(id)) if id == "live_trades_ltceur"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("live_trades_ltceur").unwrap().callbacks().len(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = SubscriptionRegistry::new();
        let id = registry
            .add(Subscription::new(Channel::order_book("btc", "eur").unwrap()))
            .unwrap();

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_frames_follow_insertion_order() {
        let registry = SubscriptionRegistry::new();
        for channel in all_channels() {
            registry.add(Subscription::new(channel)).unwrap();
        }

        let subscribe: Vec<Value> = registry
            .subscribe_frames(&BitstampCodec)
            .unwrap()
            .iter()
            .map(frame_json)
            .collect();
        let unsubscribe: Vec<Value> = registry
            .unsubscribe_frames(&BitstampCodec)
            .unwrap()
            .iter()
            .map(frame_json)
            .collect();

        assert_eq!(subscribe.len(), 7);
        assert_eq!(unsubscribe.len(), 7);
        for ((sub, unsub), id) in subscribe.iter().zip(&unsubscribe).zip(registry.channel_ids()) {
            assert_eq!(sub["event"], "bts:subscribe");
            assert_eq!(unsub["event"], "bts:unsubscribe");
            assert_eq!(sub["data"]["channel"], id.as_str());
            assert_eq!(unsub["data"]["channel"], id.as_str());
        }
        assert_eq!(
            registry.private_channel_ids(),
            vec!["private-my_orders_btcusd-42", "private-my_trades_btcusd-42"]
        );
    }
}
