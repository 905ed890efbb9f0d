use crate::core::errors::ExchangeError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::HashMap;

/// Per-call signing state handed from [`Signer::sign_request`] to
/// [`Signer::verify_response`]. Consumed once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureContext {
    pub nonce: String,
    pub timestamp: u64,
    pub signed: bool,
}

impl SignatureContext {
    /// Context for public calls; the verifier skips the signature check.
    pub fn unsigned() -> Self {
        Self {
            nonce: String::new(),
            timestamp: 0,
            signed: false,
        }
    }
}

/// Result type for signing operations: (headers, context for the response check)
pub type SignatureResult = Result<(HashMap<String, String>, SignatureContext), ExchangeError>;

/// Signer trait for request authentication and response verification
///
/// Implementations are CPU-only: no I/O, safe to call from any task.
pub trait Signer: Send + Sync {
    /// Sign a request and return headers plus the context needed to verify the reply
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST)
    /// * `endpoint` - Request path, e.g. `/api/v2/balance/`
    /// * `query_string` - URL-encoded query string (without leading '?')
    /// * `body` - URL-encoded form body, empty when the request has none
    fn sign_request(
        &self,
        method: &str,
        endpoint: &str,
        query_string: &str,
        body: &str,
    ) -> SignatureResult;

    /// Check the status and, for signed calls, the server signature of a response
    fn verify_response(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        context: &SignatureContext,
    ) -> Result<(), ExchangeError>;
}

/// Reject non-2xx responses with the raw body attached.
pub fn check_status(status: StatusCode, body: &[u8]) -> Result<(), ExchangeError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ExchangeError::RestError {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

/// URL-encode key/value pairs as `application/x-www-form-urlencoded`.
pub fn encode_form(params: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_form_escapes_like_a_form() {
        let encoded = encode_form(&[("amount", "1.5"), ("note", "a b&c")]);
        assert_eq!(encoded, "amount=1.5&note=a+b%26c");
    }

    #[test]
    fn test_encode_form_empty() {
        assert_eq!(encode_form(&[]), "");
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(StatusCode::OK, b"{}").is_ok());
        match check_status(StatusCode::NOT_FOUND, b"missing") {
            Err(ExchangeError::RestError { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "missing");
            }
            other => panic!("Expected RestError, got {:?}", other),
        }
    }
}
