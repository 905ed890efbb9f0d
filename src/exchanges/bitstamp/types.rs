use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitstampTicker {
    pub last: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub vwap: Decimal,
    pub volume: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub open: Decimal,
    pub timestamp: String,
}

/// Token for subscribing to private WebSocket channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketToken {
    pub token: String,
    pub user_id: u64,
    pub valid_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitstampOrderResponse {
    pub id: String,
    pub datetime: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

/// Optional flags for limit orders
#[derive(Debug, Clone, Default)]
pub struct LimitOrderOptions {
    /// Price of the opposite order placed once this one fills
    pub limit_price: Option<Decimal>,
    /// Cancel at 0:00 UTC unless filled
    pub daily_order: bool,
    /// Immediate-or-cancel
    pub ioc_order: bool,
    /// Fill-or-kill
    pub fok_order: bool,
    pub client_order_id: Option<String>,
}

impl LimitOrderOptions {
    pub fn with_limit_price(mut self, price: Decimal) -> Self {
        self.limit_price = Some(price);
        self
    }

    pub fn daily(mut self) -> Self {
        self.daily_order = true;
        self
    }

    pub fn immediate_or_cancel(mut self) -> Self {
        self.ioc_order = true;
        self
    }

    pub fn fill_or_kill(mut self) -> Self {
        self.fok_order = true;
        self
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// Paging for the user transactions endpoints
#[derive(Debug, Clone, Default)]
pub struct UserTransactionsQuery {
    pub offset: u32,
    pub limit: u32,
    pub sort: crate::exchanges::bitstamp::enums::Sort,
    pub since_timestamp: Option<u64>,
    pub since_id: Option<u64>,
}
