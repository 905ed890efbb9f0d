pub mod codec;
pub mod enums;
pub mod pairs;
pub mod signer;
pub mod types;

pub mod builder;
pub mod connector;
pub mod rest;
pub mod router;
pub mod session;
pub mod subscription;

/// Public REST endpoint
pub const REST_BASE_URL: &str = "https://www.bitstamp.net";
/// Every REST resource lives under this path
pub const PATH_PREFIX: &str = "/api/v2/";
pub const WS_URL: &str = "wss://ws.bitstamp.net";
pub const EXCHANGE_NAME: &str = "bitstamp";

// Re-export main components
pub use builder::{build_connector, build_connector_with_websocket, BitstampBuilder};
pub use codec::{BitstampCodec, BitstampMessage};
pub use connector::BitstampConnector;
pub use enums::{Event, Group, Sort, Step, Time};
pub use pairs::{map_pair, map_pairs};
pub use rest::BitstampRest;
pub use router::{MessageRouter, RouteOutcome};
pub use session::{ConnectionState, WebSocketSession};
pub use signer::BitstampSigner;
pub use subscription::{callback, Callback, Channel, Subscription, SubscriptionRegistry};
pub use types::{
    BitstampOrderResponse, BitstampTicker, LimitOrderOptions, UserTransactionsQuery,
    WebsocketToken,
};
