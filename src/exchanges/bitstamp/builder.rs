use crate::core::config::{ExchangeConfig, BITSTAMP_ENV_PREFIX};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ReqwestRest, RestClientBuilder, RestClientConfig, TungsteniteWs, WsConfig};
use crate::exchanges::bitstamp::{
    connector::BitstampConnector, rest::BitstampRest, session::WebSocketSession,
    signer::BitstampSigner, EXCHANGE_NAME, REST_BASE_URL, WS_URL,
};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builder for Bitstamp connectors
///
/// ```rust,no_run
/// use stampx::core::config::ExchangeConfig;
/// use stampx::exchanges::bitstamp::BitstampBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), stampx::ExchangeError> {
/// let _connector = BitstampBuilder::new()
///     .with_config(ExchangeConfig::new("api_key".to_string(), "secret".to_string()))
///     .with_heartbeat_interval(Duration::from_secs(15))
///     .build_with_ws()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BitstampBuilder {
    config: ExchangeConfig,
    ws_config: WsConfig,
    rest_timeout: u64,
    rate_limit: Option<NonZeroU32>,
}

impl Default for BitstampBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BitstampBuilder {
    /// Create a new `BitstampBuilder` for public data only
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig::read_only(),
            ws_config: WsConfig::default(),
            rest_timeout: 30,
            rate_limit: None,
        }
    }

    /// Read credentials and URL overrides from `BITSTAMP_API_KEY`, `BITSTAMP_SECRET_KEY`,
    /// `BITSTAMP_BASE_URL` and `BITSTAMP_WS_URL`
    pub fn from_env() -> Result<Self, ExchangeError> {
        Ok(Self::new().with_config(ExchangeConfig::from_env(BITSTAMP_ENV_PREFIX)?))
    }

    /// Set the exchange configuration
    pub fn with_config(mut self, config: ExchangeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set API credentials, keeping any custom URLs
    pub fn with_credentials(mut self, api_key: String, secret_key: String) -> Self {
        let mut config = ExchangeConfig::new(api_key, secret_key);
        config.base_url = self.config.base_url.take();
        config.ws_url = self.config.ws_url.take();
        self.config = config;
        self
    }

    /// Set base URL for REST API
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.config.base_url = Some(base_url);
        self
    }

    /// Set WebSocket URL
    pub fn with_ws_url(mut self, ws_url: String) -> Self {
        self.config.ws_url = Some(ws_url);
        self
    }

    /// Replace the whole WebSocket configuration
    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = ws_config;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.ws_config = self.ws_config.with_heartbeat_interval(interval);
        self
    }

    /// Delay before the first WebSocket connection
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.ws_config = self.ws_config.with_startup_delay(delay);
        self
    }

    /// Set maximum number of consecutive failed reconnection attempts
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.ws_config = self.ws_config.with_max_reconnect_attempts(attempts);
        self
    }

    /// Set REST client timeout in seconds
    pub fn with_rest_timeout(mut self, timeout: u64) -> Self {
        self.rest_timeout = timeout;
        self
    }

    /// Throttle REST calls client-side
    pub fn with_rate_limit(mut self, per_second: NonZeroU32) -> Self {
        self.rate_limit = Some(per_second);
        self
    }

    /// Throttle REST calls to the exchange's published limit of 400 requests per second
    pub fn with_exchange_rate_limit(self) -> Self {
        self.with_rate_limit(nonzero!(400u32))
    }

    fn build_rest(&self) -> Result<BitstampRest<ReqwestRest>, ExchangeError> {
        let base_url = self
            .config
            .base_url
            .clone()
            .unwrap_or_else(|| REST_BASE_URL.to_string());

        let mut rest_config = RestClientConfig::new(base_url, EXCHANGE_NAME.to_string())
            .with_timeout(self.rest_timeout);
        if let Some(rate) = self.rate_limit {
            rest_config = rest_config.with_rate_limit(rate);
        }

        let mut rest_builder = RestClientBuilder::new(rest_config);

        // Add authentication if credentials are provided
        if self.config.has_credentials() {
            let signer = Arc::new(BitstampSigner::new(
                self.config.api_key().to_string(),
                self.config.secret_key().to_string(),
            ));
            rest_builder = rest_builder.with_signer(signer);
        } else {
            debug!("No credentials configured, private endpoints are unavailable");
        }

        Ok(BitstampRest::new(rest_builder.build()?))
    }

    fn build_session(&self) -> WebSocketSession<TungsteniteWs> {
        let ws_url = self
            .config
            .ws_url
            .clone()
            .unwrap_or_else(|| WS_URL.to_string());
        let transport = TungsteniteWs::new(ws_url, EXCHANGE_NAME.to_string())
            .with_config(self.ws_config.clone());
        WebSocketSession::new(transport, self.ws_config.clone())
    }

    /// Build a REST-only connector
    pub fn build_rest_only(self) -> Result<BitstampConnector<ReqwestRest>, ExchangeError> {
        Ok(BitstampConnector::new_without_ws(self.build_rest()?))
    }

    /// Build a connector with a WebSocket session (not started yet)
    pub fn build_with_ws(self) -> Result<BitstampConnector<ReqwestRest>, ExchangeError> {
        let rest = self.build_rest()?;
        let session = self.build_session();
        Ok(BitstampConnector::new_with_ws(rest, session))
    }
}

/// Create a REST-only Bitstamp connector
pub fn build_connector(
    config: ExchangeConfig,
) -> Result<BitstampConnector<ReqwestRest>, ExchangeError> {
    BitstampBuilder::new().with_config(config).build_rest_only()
}

/// Create a Bitstamp connector with WebSocket support
pub fn build_connector_with_websocket(
    config: ExchangeConfig,
) -> Result<BitstampConnector<ReqwestRest>, ExchangeError> {
    BitstampBuilder::new().with_config(config).build_with_ws()
}
