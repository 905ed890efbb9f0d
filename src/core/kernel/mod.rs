/// Kernel - exchange-agnostic transport layer
///
/// The kernel holds the pieces that know nothing about Bitstamp itself:
///
/// ## Transport Layer
/// - `RestClient`: HTTP client interface (`ReqwestRest` implementation)
/// - `WsTransport`: opens a WebSocket and hands back independent write/read halves
///   (`TungsteniteWs` implementation)
///
/// ## Authentication
/// - `Signer`: signs outbound requests and verifies the matching responses
/// - `SignatureContext`: per-call state carried from signing to verification
///
/// ## Message Handling
/// - `WsCodec`: exchange-specific frame encoding/decoding
///
/// # Example
/// ```rust,no_run
/// use stampx::core::kernel::*;
/// use stampx::exchanges::bitstamp::BitstampSigner;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let rest_config = RestClientConfig::new(
///     "https://www.bitstamp.net".to_string(),
///     "bitstamp".to_string(),
/// );
/// let signer = Arc::new(BitstampSigner::new("api_key".to_string(), "secret".to_string()));
/// let rest = RestClientBuilder::new(rest_config).with_signer(signer).build()?;
///
/// let _balances = rest.post("/api/v2/balance/", &[], true).await?;
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::WsCodec;
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig};
pub use signer::{check_status, encode_form, SignatureContext, SignatureResult, Signer};
pub use ws::{TungsteniteWs, WsConfig, WsReader, WsTransport, WsWriter};
