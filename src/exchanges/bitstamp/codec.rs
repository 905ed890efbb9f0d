use crate::core::errors::{ExchangeError, ProtocolError};
use crate::core::kernel::codec::WsCodec;
use crate::exchanges::bitstamp::enums::Event;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

/// Bitstamp WebSocket message types
#[derive(Debug, Clone, PartialEq)]
pub enum BitstampMessage {
    /// `bts:error`
    Error(ProtocolError),
    /// Subscription acknowledgement
    SubscriptionSucceeded { channel: String },
    /// Unsubscription acknowledgement
    UnsubscriptionSucceeded { channel: String },
    /// Heartbeat acknowledgement with the reported status
    Heartbeat { status: String },
    /// Server asks the client to reconnect
    ReconnectRequested,
    /// Market or account data for a channel; `payload` is the whole frame
    Data {
        channel: String,
        event: String,
        payload: Value,
    },
}

/// Bitstamp WebSocket codec implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct BitstampCodec;

impl BitstampCodec {
    fn envelope(event: Event, payload: &Value) -> Message {
        Message::Text(json!({ "event": event.as_str(), "data": payload }).to_string())
    }

    fn channel_of(frame: &Value) -> Option<String> {
        frame
            .get("channel")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn parse_error_frame(frame: &Value) -> ProtocolError {
        let data = frame.get("data");
        ProtocolError {
            channel: Self::channel_of(frame).filter(|c| !c.is_empty()),
            code: data.and_then(|d| d.get("code")).and_then(Value::as_i64),
            message: data
                .and_then(|d| d.get("message"))
                .and_then(Value::as_str)
                .map_or_else(|| frame.to_string(), str::to_string),
        }
    }
}

impl WsCodec for BitstampCodec {
    type Message = BitstampMessage;

    fn encode_subscription(&self, payload: &Value) -> Result<Message, ExchangeError> {
        Ok(Self::envelope(Event::Subscribe, payload))
    }

    fn encode_unsubscription(&self, payload: &Value) -> Result<Message, ExchangeError> {
        Ok(Self::envelope(Event::Unsubscribe, payload))
    }

    fn encode_heartbeat(&self) -> Result<Message, ExchangeError> {
        Ok(Message::Text(
            json!({ "event": Event::Heartbeat.as_str() }).to_string(),
        ))
    }

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => String::from_utf8(bytes)
                .map_err(|e| ExchangeError::ParseError(format!("Non UTF-8 frame: {}", e)))?,
            _ => return Ok(None),
        };

        let frame: Value = serde_json::from_str(&text)
            .map_err(|e| ExchangeError::ParseError(format!("Invalid JSON frame: {}", e)))?;

        let event = frame
            .get("event")
            .and_then(Value::as_str)
            .ok_or_else(|| ExchangeError::ParseError(format!("Frame without event: {}", text)))?
            .to_string();

        let message = match Event::from_tag(&event) {
            Some(Event::Error) => BitstampMessage::Error(Self::parse_error_frame(&frame)),
            Some(Event::SubscriptionSucceeded) => BitstampMessage::SubscriptionSucceeded {
                channel: Self::channel_of(&frame).unwrap_or_default(),
            },
            Some(Event::UnsubscriptionSucceeded) => BitstampMessage::UnsubscriptionSucceeded {
                channel: Self::channel_of(&frame).unwrap_or_default(),
            },
            Some(Event::Heartbeat) => BitstampMessage::Heartbeat {
                status: frame
                    .get("data")
                    .and_then(|d| d.get("status"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Some(Event::RequestReconnect) => BitstampMessage::ReconnectRequested,
            // Echoes of our own requests or plain data events
            Some(Event::Subscribe | Event::Unsubscribe) | None => {
                let channel = Self::channel_of(&frame).ok_or_else(|| {
                    ExchangeError::ParseError(format!("Data frame without channel: {}", text))
                })?;
                BitstampMessage::Data {
                    channel,
                    event,
                    payload: frame,
                }
            }
        };

        Ok(Some(message))
    }
}
