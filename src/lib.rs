pub mod core;
pub mod exchanges;

pub use core::errors::{ExchangeError, ProtocolError};
pub use exchanges::bitstamp::{BitstampConnector, WebSocketSession};
