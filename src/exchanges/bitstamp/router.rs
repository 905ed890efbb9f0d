use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use crate::exchanges::bitstamp::codec::{BitstampCodec, BitstampMessage};
use crate::exchanges::bitstamp::enums::HEARTBEAT_SUCCESS;
use crate::exchanges::bitstamp::subscription::SubscriptionRegistry;
use serde_json::Value;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

/// What the session should do after a frame was routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Handled,
    /// Server asked for a fresh connection
    Reconnect,
}

/// Classifies inbound frames and dispatches data to subscription callbacks
#[derive(Debug, Clone)]
pub struct MessageRouter {
    codec: BitstampCodec,
    registry: Arc<SubscriptionRegistry>,
}

impl MessageRouter {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            codec: BitstampCodec,
            registry,
        }
    }

    /// Route one raw frame.
    ///
    /// `bts:error` comes back as [`ExchangeError::Protocol`] and malformed frames
    /// as [`ExchangeError::ParseError`]; neither should end the session.
    pub async fn route(&self, frame: Message) -> Result<RouteOutcome, ExchangeError> {
        match self.codec.decode_message(frame)? {
            Some(message) => self.dispatch(message).await,
            None => Ok(RouteOutcome::Handled),
        }
    }

    async fn dispatch(&self, message: BitstampMessage) -> Result<RouteOutcome, ExchangeError> {
        match message {
            BitstampMessage::Error(error) => Err(ExchangeError::Protocol(error)),
            BitstampMessage::SubscriptionSucceeded { channel } => {
                info!(channel = %channel, "Subscription succeeded");
                Ok(RouteOutcome::Handled)
            }
            BitstampMessage::UnsubscriptionSucceeded { channel } => {
                info!(channel = %channel, "Unsubscription succeeded");
                Ok(RouteOutcome::Handled)
            }
            BitstampMessage::Heartbeat { status } => {
                if status == HEARTBEAT_SUCCESS {
                    debug!("Heartbeat acknowledged");
                } else {
                    warn!(status = %status, "Unsuccessful heartbeat");
                }
                Ok(RouteOutcome::Handled)
            }
            BitstampMessage::ReconnectRequested => Ok(RouteOutcome::Reconnect),
            BitstampMessage::Data {
                channel,
                event,
                payload,
            } => {
                self.deliver(&channel, &event, payload).await;
                Ok(RouteOutcome::Handled)
            }
        }
    }

    async fn deliver(&self, channel: &str, event: &str, payload: Value) {
        let Some(subscription) = self.registry.lookup(channel) else {
            // Late frames for a channel that was just unsubscribed are expected
            debug!(channel = %channel, event = %event, "No subscription for channel, dropping frame");
            return;
        };

        trace!(channel = %channel, event = %event, "Dispatching frame");
        for (index, callback) in subscription.callbacks().iter().enumerate() {
            if let Err(e) = callback(payload.clone()).await {
                warn!(channel = %channel, callback = index, error = %e, "Callback failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ProtocolError;
    use crate::exchanges::bitstamp::subscription::{callback, Callback, Channel, Subscription};
    use std::sync::Mutex;

    fn text(raw: &str) -> Message {
        Message::Text(raw.to_string())
    }

    fn recording_callback(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Callback {
        let log = Arc::clone(log);
        callback(move |frame: Value| {
            let log = Arc::clone(&log);
            async move {
                log.lock()
                    .unwrap()
                    .push(format!("{}:{}", tag, frame["channel"].as_str().unwrap_or_default()));
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_data_frame_reaches_only_its_channel() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry
            .add(
                Subscription::new(Channel::live_trades("ltc", "eur").unwrap())
                    .with_callback(recording_callback(&log, "trades")),
            )
            .unwrap();
        registry
            .add(
                Subscription::new(Channel::live_orders("ltc", "eur").unwrap())
                    .with_callback(recording_callback(&log, "orders")),
            )
            .unwrap();

        let router = MessageRouter::new(registry);
        let outcome = router
            .route(text(
                r#"{"data":{"id":7},"channel":"live_trades_ltceur","event":"trade"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(outcome, RouteOutcome::Handled);
        assert_eq!(*log.lock().unwrap(), vec!["trades:live_trades_ltceur"]);
    }

    #[tokio::test]
    async fn test_callbacks_run_in_order_and_failures_do_not_stop_the_rest() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry
            .add(
                Subscription::new(Channel::order_book("btc", "usd").unwrap())
                    .with_callback(recording_callback(&log, "first"))
                    .with_callback(callback(|_| async { Err(anyhow::anyhow!("boom")) }))
                    .with_callback(recording_callback(&log, "third")),
            )
            .unwrap();

        let router = MessageRouter::new(registry);
        router
            .route(text(
                r#"{"data":{},"channel":"order_book_btcusd","event":"data"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:order_book_btcusd", "third:order_book_btcusd"]
        );
    }

    #[tokio::test]
    async fn test_unknown_channel_is_not_an_error() {
        let router = MessageRouter::new(Arc::new(SubscriptionRegistry::new()));
        let outcome = router
            .route(text(r#"{"data":{},"channel":"live_trades_btcusd","event":"trade"}"#))
            .await;
        assert_eq!(outcome.unwrap(), RouteOutcome::Handled);
    }

    #[tokio::test]
    async fn test_control_events() {
        let router = MessageRouter::new(Arc::new(SubscriptionRegistry::new()));

        let failed_heartbeat = router
            .route(text(r#"{"event":"bts:heartbeat","channel":"","data":{"status":"failed"}}"#))
            .await;
        assert_eq!(failed_heartbeat.unwrap(), RouteOutcome::Handled);

        let reconnect = router
            .route(text(r#"{"event":"bts:request_reconnect","channel":"","data":""}"#))
            .await;
        assert_eq!(reconnect.unwrap(), RouteOutcome::Reconnect);

        let error = router
            .route(text(
                r#"{"event":"bts:error","channel":"private-my_orders_btcusd-1","data":{"code":401,"message":"Invalid token"}}"#,
            ))
            .await;
        match error {
            Err(ExchangeError::Protocol(ProtocolError {
                channel, code, message,
            })) => {
                assert_eq!(channel.as_deref(), Some("private-my_orders_btcusd-1"));
                assert_eq!(code, Some(401));
                assert_eq!(message, "Invalid token");
            }
            other => panic!("Expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_is_parse_error() {
        let router = MessageRouter::new(Arc::new(SubscriptionRegistry::new()));
        let result = router.route(text("{oops")).await;
        assert!(matches!(result, Err(ExchangeError::ParseError(_))));
    }
}
