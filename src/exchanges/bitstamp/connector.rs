use crate::core::errors::ExchangeError;
use crate::core::kernel::{RestClient, TungsteniteWs, WsTransport};
use crate::exchanges::bitstamp::rest::BitstampRest;
use crate::exchanges::bitstamp::session::WebSocketSession;
use crate::exchanges::bitstamp::subscription::Channel;
use std::sync::Arc;
use tracing::instrument;

/// Bitstamp connector that composes the REST endpoints and the WebSocket session
pub struct BitstampConnector<R: RestClient, T: WsTransport = TungsteniteWs> {
    rest: BitstampRest<R>,
    session: Option<Arc<WebSocketSession<T>>>,
}

impl<R: RestClient, T: WsTransport> BitstampConnector<R, T> {
    /// Create a connector with REST support only
    pub fn new_without_ws(rest: BitstampRest<R>) -> Self {
        Self {
            rest,
            session: None,
        }
    }

    /// Create a connector with a WebSocket session
    pub fn new_with_ws(rest: BitstampRest<R>, session: WebSocketSession<T>) -> Self {
        Self {
            rest,
            session: Some(Arc::new(session)),
        }
    }

    pub fn rest(&self) -> &BitstampRest<R> {
        &self.rest
    }

    pub fn session(&self) -> Option<&Arc<WebSocketSession<T>>> {
        self.session.as_ref()
    }

    fn require_session(&self) -> Result<&Arc<WebSocketSession<T>>, ExchangeError> {
        self.session.as_ref().ok_or_else(|| {
            ExchangeError::InvalidState("Connector was built without WebSocket support".to_string())
        })
    }

    /// Private orders channel, authorised with a fresh websocket token
    #[instrument(skip(self), fields(exchange = "bitstamp"))]
    pub async fn private_orders_channel(
        &self,
        base: &str,
        quote: &str,
    ) -> Result<Channel, ExchangeError> {
        let token = self.rest.get_websocket_token().await?;
        Channel::private_orders(base, quote, token.user_id.to_string(), token.token)
    }

    /// Private trades channel, authorised with a fresh websocket token
    #[instrument(skip(self), fields(exchange = "bitstamp"))]
    pub async fn private_trades_channel(
        &self,
        base: &str,
        quote: &str,
    ) -> Result<Channel, ExchangeError> {
        let token = self.rest.get_websocket_token().await?;
        Channel::private_trades(base, quote, token.user_id.to_string(), token.token)
    }

    /// Unsubscribe everything and close the WebSocket session
    pub async fn close(&self) -> Result<(), ExchangeError> {
        self.require_session()?.close(true).await
    }
}

impl<R: RestClient, T: WsTransport + 'static> BitstampConnector<R, T> {
    /// Start the WebSocket session on the runtime
    pub fn start_websocket(
        &self,
    ) -> Result<tokio::task::JoinHandle<Result<(), ExchangeError>>, ExchangeError> {
        let session = Arc::clone(self.require_session()?);
        Ok(tokio::spawn(async move { session.run().await }))
    }
}
