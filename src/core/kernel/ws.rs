use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// WebSocket session configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Consecutive failed connection attempts tolerated before giving up
    pub max_reconnect_attempts: u32,
    /// Base delay between failed connection attempts, doubled each time
    pub reconnect_delay_ms: u64,
    /// Upper bound for the reconnect delay
    pub max_reconnect_delay_ms: u64,
    /// Delay before the very first connection attempt
    pub startup_delay_ms: u64,
    /// Largest inbound message accepted by the transport
    pub max_message_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,    // 10 seconds
            heartbeat_interval_ms: 30_000, // 30 seconds
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,      // 1 second
            max_reconnect_delay_ms: 60_000, // 1 minute
            startup_delay_ms: 0,
            max_message_size: 3 * 1024 * 1024, // 3 MiB
        }
    }
}

impl WsConfig {
    /// Stagger the first connection, e.g. when many clients share a rate limit
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delays between consecutive failed connection attempts: base, 2x base, 4x base ...
    pub fn reconnect_backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(2)
            .factor((self.reconnect_delay_ms / 2).max(1))
            .max_delay(Duration::from_millis(self.max_reconnect_delay_ms))
    }
}

/// Write half of an open connection
#[async_trait]
pub trait WsWriter: Send {
    /// Send a raw message
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), ExchangeError>;
}

/// Read half of an open connection
#[async_trait]
pub trait WsReader: Send {
    /// Receive the next data message; `None` once the peer has closed
    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>>;
}

/// Opens connections; each call yields a fresh, independent connection
#[async_trait]
pub trait WsTransport: Send + Sync {
    async fn connect(&self) -> Result<(Box<dyn WsWriter>, Box<dyn WsReader>), ExchangeError>;
}

type TungsteniteStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Tungstenite-based WebSocket transport
#[derive(Debug, Clone)]
pub struct TungsteniteWs {
    url: String,
    exchange_name: String,
    config: WsConfig,
}

impl TungsteniteWs {
    /// Create a new transport
    ///
    /// # Arguments
    /// * `url` - The WebSocket URL to connect to
    /// * `exchange_name` - Name of the exchange for logging/tracing
    pub fn new(url: String, exchange_name: String) -> Self {
        Self {
            url,
            exchange_name,
            config: WsConfig::default(),
        }
    }

    /// Set custom WebSocket configuration
    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WsTransport for TungsteniteWs {
    #[instrument(skip(self), fields(exchange = %self.exchange_name, url = %self.url))]
    async fn connect(&self) -> Result<(Box<dyn WsWriter>, Box<dyn WsReader>), ExchangeError> {
        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let ws_config = WebSocketConfig {
            max_message_size: Some(self.config.max_message_size),
            max_frame_size: Some(self.config.max_message_size),
            ..WebSocketConfig::default()
        };

        let (ws_stream, _) = tokio::time::timeout(
            connect_timeout,
            connect_async_with_config(&self.url, Some(ws_config), true),
        )
        .await
        .map_err(|_| ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string()))?
        .map_err(|e| ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e)))?;

        debug!("WebSocket connected");
        let (write, read) = ws_stream.split();
        Ok((
            Box::new(TungsteniteWriter { write }),
            Box::new(TungsteniteReader { read }),
        ))
    }
}

struct TungsteniteWriter {
    write: SplitSink<TungsteniteStream, Message>,
}

#[async_trait]
impl WsWriter for TungsteniteWriter {
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError> {
        self.write.send(msg).await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to send WebSocket message: {}", e))
        })
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        // The peer may already be gone; closing is best effort.
        let _ = self.write.send(Message::Close(None)).await;
        self.write
            .close()
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("Failed to close WebSocket: {}", e)))
    }
}

struct TungsteniteReader {
    read: SplitStream<TungsteniteStream>,
}

#[async_trait]
impl WsReader for TungsteniteReader {
    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>> {
        loop {
            match self.read.next().await? {
                // Pings are answered by tungstenite itself on the next flush
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by peer");
                    return None;
                }
                Ok(message) => return Some(Ok(message)),
                Err(e) => {
                    return Some(Err(ExchangeError::NetworkError(format!(
                        "WebSocket error: {}",
                        e
                    ))))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_exchange_limits() {
        let config = WsConfig::default();
        assert_eq!(config.heartbeat_interval_ms, 30_000);
        assert_eq!(config.max_message_size, 3 * 1024 * 1024);
        assert_eq!(config.startup_delay_ms, 0);
    }

    #[test]
    fn test_reconnect_backoff_doubles_and_caps() {
        let config = WsConfig {
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 5_000,
            ..WsConfig::default()
        };
        let delays: Vec<u64> = config
            .reconnect_backoff()
            .take(5)
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 5_000, 5_000]);
    }

    #[test]
    fn test_builder_setters() {
        let config = WsConfig::default()
            .with_startup_delay(Duration::from_millis(250))
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_max_reconnect_attempts(2);
        assert_eq!(config.startup_delay_ms, 250);
        assert_eq!(config.heartbeat_interval_ms, 5_000);
        assert_eq!(config.max_reconnect_attempts, 2);
    }
}
