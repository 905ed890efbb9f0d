use serde_json::json;
use stampx::core::kernel::{ReqwestRest, SignatureContext};
use stampx::exchanges::bitstamp::{BitstampBuilder, BitstampConnector, BitstampSigner, Channel};
use stampx::ExchangeError;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const API_KEY: &str = "test_key";
const SECRET_KEY: &str = "test_secret";

#[derive(Clone, Copy)]
enum Tamper {
    None,
    Body,
    Signature,
}

/// Plays the exchange: checks the request signature and signs the reply.
struct SignedResponder {
    body: String,
    tamper: Tamper,
}

impl SignedResponder {
    fn new(body: serde_json::Value) -> Self {
        Self {
            body: body.to_string(),
            tamper: Tamper::None,
        }
    }

    fn tampered(mut self, tamper: Tamper) -> Self {
        self.tamper = tamper;
        self
    }
}

fn header<'a>(request: &'a Request, name: &str) -> &'a str {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

impl Respond for SignedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let signer = BitstampSigner::new(API_KEY.to_string(), SECRET_KEY.to_string());
        let nonce = header(request, "X-Auth-Nonce").to_string();
        let timestamp: u64 = header(request, "X-Auth-Timestamp").parse().unwrap_or_default();
        let body = String::from_utf8_lossy(&request.body).into_owned();

        let (expected, _) = signer
            .sign_with_nonce(
                request.method.as_str(),
                request.url.path(),
                request.url.query().unwrap_or_default(),
                &body,
                &nonce,
                timestamp,
            )
            .unwrap();
        if header(request, "X-Auth-Signature") != expected["X-Auth-Signature"] {
            return ResponseTemplate::new(403)
                .set_body_raw(r#"{"status":"error","reason":"Invalid signature"}"#, "application/json");
        }

        let context = SignatureContext {
            nonce,
            timestamp,
            signed: true,
        };
        let mut signature = signer
            .response_signature(&context, "application/json", self.body.as_bytes())
            .unwrap();
        let mut reply = self.body.clone();
        match self.tamper {
            Tamper::None => {}
            Tamper::Body => reply.push(' '),
            Tamper::Signature => signature = signature.to_uppercase(),
        }

        ResponseTemplate::new(200)
            .insert_header("X-Server-Auth-Signature", signature.as_str())
            .set_body_raw(reply, "application/json")
    }
}

fn connector(server: &MockServer) -> BitstampConnector<ReqwestRest> {
    BitstampBuilder::new()
        .with_credentials(API_KEY.to_string(), SECRET_KEY.to_string())
        .with_base_url(server.uri())
        .build_with_ws()
        .unwrap()
}

#[tokio::test]
async fn test_signed_balance_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/balance/"))
        .and(header_exists("X-Auth-Signature"))
        .respond_with(SignedResponder::new(json!({"usd_balance": "12.50", "btc_balance": "0.1"})))
        .expect(1)
        .mount(&server)
        .await;

    let balances = connector(&server).rest().get_balances().await.unwrap();
    assert_eq!(balances["usd_balance"], "12.50");
}

#[tokio::test]
async fn test_signed_call_with_form_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/order_status/"))
        .respond_with(SignedResponder::new(json!({"id": 42, "status": "Finished"})))
        .expect(1)
        .mount(&server)
        .await;

    let status = connector(&server).rest().get_order_status(42, None).await.unwrap();
    assert_eq!(status["status"], "Finished");
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/balance/"))
        .respond_with(SignedResponder::new(json!({"usd_balance": "12.50"})).tampered(Tamper::Body))
        .mount(&server)
        .await;

    let result = connector(&server).rest().get_balances().await;
    assert!(matches!(
        result,
        Err(ExchangeError::SignatureMismatch { status: 200, .. })
    ));
}

#[tokio::test]
async fn test_signature_comparison_is_case_sensitive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/balance/"))
        .respond_with(
            SignedResponder::new(json!({"usd_balance": "12.50"})).tampered(Tamper::Signature),
        )
        .mount(&server)
        .await;

    let result = connector(&server).rest().get_balances().await;
    assert!(matches!(result, Err(ExchangeError::SignatureMismatch { .. })));
}

#[tokio::test]
async fn test_missing_server_signature_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/balance/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"usd_balance": "1"})))
        .mount(&server)
        .await;

    let result = connector(&server).rest().get_balances().await;
    assert!(matches!(result, Err(ExchangeError::SignatureMismatch { .. })));
}

#[tokio::test]
async fn test_error_status_wins_over_signature_check() {
    let server = MockServer::start().await;
    let body = r#"{"status":"error","reason":"Invalid nonce","code":"API0004"}"#;
    Mock::given(method("POST"))
        .and(path("/api/v2/balance/"))
        .respond_with(ResponseTemplate::new(403).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    match connector(&server).rest().get_balances().await {
        Err(ExchangeError::RestError { status, body: received }) => {
            assert_eq!(status, 403);
            assert_eq!(received, body);
        }
        other => panic!("expected a RestError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_public_ticker_needs_no_signature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/ticker/btcusd/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "last": "64000.00", "high": "65000.00", "low": "63000.00", "vwap": "64100.12",
            "volume": "1520.4", "bid": "63999.00", "ask": "64001.00", "open": "63500.00",
            "timestamp": "1700000000"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ticker = connector(&server).rest().get_ticker("BTC", "USD").await.unwrap();
    assert_eq!(ticker.last.to_string(), "64000.00");
    assert_eq!(ticker.timestamp, "1700000000");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("X-Auth-Signature").is_none());
}

#[tokio::test]
async fn test_private_channel_uses_websocket_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/websockets_token/"))
        .respond_with(SignedResponder::new(
            json!({"token": "abc123", "user_id": 1234, "valid_sec": 60}),
        ))
        .mount(&server)
        .await;

    let channel: Channel = connector(&server)
        .private_orders_channel("btc", "usd")
        .await
        .unwrap();
    assert_eq!(channel.name(), "private-my_orders_btcusd-1234");
    assert_eq!(channel.subscribe_message()["auth"], "abc123");
}

#[tokio::test]
async fn test_private_call_without_credentials_fails_locally() {
    let server = MockServer::start().await;
    let connector = BitstampBuilder::new()
        .with_base_url(server.uri())
        .build_rest_only()
        .unwrap();

    let result = connector.rest().get_balances().await;
    assert!(matches!(result, Err(ExchangeError::AuthError(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}
