use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{check_status, encode_form, SignatureContext, Signer};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{instrument, trace};

/// REST client trait for making HTTP requests
///
/// Bitstamp only uses GET for public data and form-encoded POST for everything
/// private, so the surface is limited to those two verbs.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Make a GET request
    ///
    /// # Arguments
    /// * `endpoint` - The API endpoint path
    /// * `query_params` - Query parameters as key-value pairs
    /// * `authenticated` - Whether to sign the request
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError>;

    /// Make a GET request with strongly-typed response
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError>;

    /// Make a form-encoded POST request
    ///
    /// # Arguments
    /// * `endpoint` - The API endpoint path
    /// * `body_params` - Form fields, empty for a body-less POST
    /// * `authenticated` - Whether to sign the request
    async fn post(
        &self,
        endpoint: &str,
        body_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError>;

    /// Make a form-encoded POST request with strongly-typed response
    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError>;
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
    /// Optional client-side cap on requests per second
    pub requests_per_second: Option<NonZeroU32>,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: 30,
            user_agent: "stampx/0.1".to_string(),
            requests_per_second: None,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Throttle outgoing requests to at most `per_second`
    pub fn with_rate_limit(mut self, per_second: NonZeroU32) -> Self {
        self.requests_per_second = Some(per_second);
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Build the REST client
    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()?;

        let limiter = self
            .config
            .requests_per_second
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
            limiter,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    /// Build the full URL for an endpoint, appending the already-encoded query
    fn build_url(&self, endpoint: &str, query_string: &str) -> String {
        if query_string.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query_string)
        }
    }

    /// Make a request with the given parameters
    ///
    /// The query string and body are encoded once and the same bytes are both
    /// signed and sent.
    #[instrument(skip(self, query_params, body_params), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint))]
    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let query_string = encode_form(query_params);
        let body = encode_form(body_params);
        let url = self.build_url(endpoint, &query_string);
        let mut request = self.client.request(method.clone(), &url);

        let context = if authenticated {
            let signer = self.signer.as_ref().ok_or_else(|| {
                ExchangeError::AuthError(
                    "Authentication required but no signer provided".to_string(),
                )
            })?;
            let (headers, context) =
                signer.sign_request(method.as_str(), endpoint, &query_string, &body)?;
            for (key, value) in headers {
                request = request.header(&key, &value);
            }
            context
        } else {
            if !body.is_empty() {
                request = request.header("Content-Type", "application/x-www-form-urlencoded");
            }
            SignatureContext::unsigned()
        };

        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("Request failed: {}", e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        trace!(status = %status, "Response body: {}", String::from_utf8_lossy(&bytes));

        match &self.signer {
            Some(signer) => signer.verify_response(status, &headers, &bytes, &context)?,
            None => check_status(status, &bytes)?,
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            ExchangeError::ParseError(format!("Failed to parse JSON response: {}", e))
        })
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    async fn get(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        self.make_request(Method::GET, endpoint, query_params, &[], authenticated)
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let value = self.get(endpoint, query_params, authenticated).await?;
        serde_json::from_value(value).map_err(|e| {
            ExchangeError::ParseError(format!("Failed to deserialize JSON: {}", e))
        })
    }

    async fn post(
        &self,
        endpoint: &str,
        body_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<Value, ExchangeError> {
        self.make_request(Method::POST, endpoint, &[], body_params, authenticated)
            .await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let value = self.post(endpoint, body_params, authenticated).await?;
        serde_json::from_value(value).map_err(|e| {
            ExchangeError::ParseError(format!("Failed to deserialize JSON: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_with_and_without_query() {
        let rest = RestClientBuilder::new(RestClientConfig::new(
            "https://www.bitstamp.net".to_string(),
            "bitstamp".to_string(),
        ))
        .build()
        .unwrap();

        assert_eq!(
            rest.build_url("/api/v2/ticker/btcusd/", ""),
            "https://www.bitstamp.net/api/v2/ticker/btcusd/"
        );
        assert_eq!(
            rest.build_url("/api/v2/order_book/btcusd/", "group=1"),
            "https://www.bitstamp.net/api/v2/order_book/btcusd/?group=1"
        );
    }

    #[tokio::test]
    async fn test_authenticated_call_without_signer_fails() {
        let rest = RestClientBuilder::new(RestClientConfig::new(
            "http://127.0.0.1:9".to_string(),
            "bitstamp".to_string(),
        ))
        .build()
        .unwrap();

        let result = rest.post("/api/v2/balance/", &[], true).await;
        assert!(matches!(result, Err(ExchangeError::AuthError(_))));
    }
}
