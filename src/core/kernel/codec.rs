use crate::core::errors::ExchangeError;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for handling exchange-specific WebSocket message encoding/decoding
///
/// Subscription payloads are structured JSON rendered by the subscription
/// itself; the codec wraps them in the exchange's control envelope and turns
/// inbound frames into typed messages.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed messages from this exchange
    type Message: Send + Sync;

    /// Wrap a subscribe payload into a WebSocket frame
    fn encode_subscription(&self, payload: &Value) -> Result<Message, ExchangeError>;

    /// Wrap an unsubscribe payload into a WebSocket frame
    fn encode_unsubscription(&self, payload: &Value) -> Result<Message, ExchangeError>;

    /// Build the application-level keep-alive frame
    fn encode_heartbeat(&self) -> Result<Message, ExchangeError>;

    /// Decode a raw WebSocket message into a typed message
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored/filtered by codec
    /// - `Err(error)` - Failed to decode message
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError>;
}
