use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::exchanges::bitstamp::enums::{Group, Step, Time};
use crate::exchanges::bitstamp::pairs::map_pair;
use crate::exchanges::bitstamp::types::{
    BitstampOrderResponse, BitstampTicker, LimitOrderOptions, UserTransactionsQuery,
    WebsocketToken,
};
use crate::exchanges::bitstamp::PATH_PREFIX;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::instrument;

/// Form or query fields collected before encoding
#[derive(Debug, Default)]
struct Params(Vec<(&'static str, String)>);

impl Params {
    fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.0.push((key, value.to_string()));
        self
    }

    fn with_opt(self, key: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Boolean flags are only sent when set
    fn with_flag(self, key: &'static str, set: bool) -> Self {
        if set {
            self.with(key, "True")
        } else {
            self
        }
    }

    fn pairs(&self) -> Vec<(&str, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }
}

fn endpoint(resource: &str) -> String {
    format!("{}{}", PATH_PREFIX, resource)
}

/// Bitstamp REST endpoints on top of a generic [`RestClient`]
#[derive(Debug, Clone)]
pub struct BitstampRest<R: RestClient> {
    client: R,
}

impl<R: RestClient> BitstampRest<R> {
    pub fn new(client: R) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &R {
        &self.client
    }

    async fn public(&self, resource: &str, params: Params) -> Result<Value, ExchangeError> {
        self.client
            .get(&endpoint(resource), &params.pairs(), false)
            .await
    }

    async fn private(&self, resource: &str, params: Params) -> Result<Value, ExchangeError> {
        self.client
            .post(&endpoint(resource), &params.pairs(), true)
            .await
    }

    // Public market data

    #[instrument(skip(self), fields(exchange = "bitstamp"))]
    pub async fn get_ticker(&self, base: &str, quote: &str) -> Result<BitstampTicker, ExchangeError> {
        let pair = map_pair(base, quote)?;
        self.client
            .get_json(&endpoint(&format!("ticker/{}/", pair)), &[], false)
            .await
    }

    pub async fn get_hourly_ticker(
        &self,
        base: &str,
        quote: &str,
    ) -> Result<BitstampTicker, ExchangeError> {
        let pair = map_pair(base, quote)?;
        self.client
            .get_json(&endpoint(&format!("ticker_hour/{}/", pair)), &[], false)
            .await
    }

    pub async fn get_order_book(
        &self,
        base: &str,
        quote: &str,
        group: Option<Group>,
    ) -> Result<Value, ExchangeError> {
        let pair = map_pair(base, quote)?;
        let params = Params::default().with_opt("group", group.map(Group::as_param));
        self.public(&format!("order_book/{}/", pair), params).await
    }

    pub async fn get_transactions(
        &self,
        base: &str,
        quote: &str,
        time: Option<Time>,
    ) -> Result<Value, ExchangeError> {
        let pair = map_pair(base, quote)?;
        let params = Params::default().with_opt("time", time.map(Time::as_param));
        self.public(&format!("transactions/{}/", pair), params).await
    }

    pub async fn get_trading_pairs_info(&self) -> Result<Value, ExchangeError> {
        self.public("trading-pairs-info/", Params::default()).await
    }

    /// OHLC candles; `limit` must be between 1 and 1000
    pub async fn get_ohlc_data(
        &self,
        base: &str,
        quote: &str,
        step: Step,
        limit: u32,
        start: Option<u64>,
        stop: Option<u64>,
    ) -> Result<Value, ExchangeError> {
        if !(1..=1000).contains(&limit) {
            return Err(ExchangeError::InvalidParameters(format!(
                "OHLC limit must be between 1 and 1000, got {}",
                limit
            )));
        }

        let pair = map_pair(base, quote)?;
        let params = Params::default()
            .with("step", step.seconds())
            .with("limit", limit)
            .with_opt("start", start)
            .with_opt("stop", stop);
        self.public(&format!("ohlc/{}/", pair), params).await
    }

    pub async fn get_eur_usd_conversion_rate(&self) -> Result<Value, ExchangeError> {
        self.public("eur_usd/", Params::default()).await
    }

    // Account

    #[instrument(skip(self), fields(exchange = "bitstamp"))]
    pub async fn get_balances(&self) -> Result<Value, ExchangeError> {
        self.private("balance/", Params::default()).await
    }

    pub async fn get_balance(&self, base: &str, quote: &str) -> Result<Value, ExchangeError> {
        let pair = map_pair(base, quote)?;
        self.private(&format!("balance/{}/", pair), Params::default())
            .await
    }

    pub async fn get_user_transactions(
        &self,
        query: &UserTransactionsQuery,
    ) -> Result<Value, ExchangeError> {
        self.private("user_transactions/", transactions_params(query))
            .await
    }

    pub async fn get_user_transactions_for_pair(
        &self,
        base: &str,
        quote: &str,
        query: &UserTransactionsQuery,
    ) -> Result<Value, ExchangeError> {
        let pair = map_pair(base, quote)?;
        self.private(
            &format!("user_transactions/{}/", pair),
            transactions_params(query),
        )
        .await
    }

    pub async fn get_crypto_transactions(
        &self,
        offset: u32,
        limit: u32,
        include_ious: bool,
    ) -> Result<Value, ExchangeError> {
        let params = Params::default()
            .with("offset", offset)
            .with("limit", limit)
            .with_flag("include_ious", include_ious);
        self.private("crypto-transactions/", params).await
    }

    // Orders

    pub async fn get_open_orders_all(&self) -> Result<Value, ExchangeError> {
        self.private("open_orders/all/", Params::default()).await
    }

    pub async fn get_open_orders(&self, base: &str, quote: &str) -> Result<Value, ExchangeError> {
        let pair = map_pair(base, quote)?;
        self.private(&format!("open_orders/{}/", pair), Params::default())
            .await
    }

    pub async fn get_order_status(
        &self,
        id: u64,
        client_order_id: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        let params = Params::default()
            .with("id", id)
            .with_opt("client_order_id", client_order_id);
        self.private("order_status/", params).await
    }

    pub async fn cancel_order(&self, id: u64) -> Result<Value, ExchangeError> {
        self.private("cancel_order/", Params::default().with("id", id))
            .await
    }

    /// Cancel every open order on one pair
    pub async fn cancel_orders(&self, base: &str, quote: &str) -> Result<Value, ExchangeError> {
        let pair = map_pair(base, quote)?;
        self.private(&format!("cancel_all_orders/{}/", pair), Params::default())
            .await
    }

    pub async fn cancel_all_orders(&self) -> Result<Value, ExchangeError> {
        self.private("cancel_all_orders/", Params::default()).await
    }

    #[instrument(skip(self, options), fields(exchange = "bitstamp"))]
    pub async fn buy_limit_order(
        &self,
        base: &str,
        quote: &str,
        amount: Decimal,
        price: Decimal,
        options: LimitOrderOptions,
    ) -> Result<BitstampOrderResponse, ExchangeError> {
        self.limit_order("buy", base, quote, amount, price, options)
            .await
    }

    #[instrument(skip(self, options), fields(exchange = "bitstamp"))]
    pub async fn sell_limit_order(
        &self,
        base: &str,
        quote: &str,
        amount: Decimal,
        price: Decimal,
        options: LimitOrderOptions,
    ) -> Result<BitstampOrderResponse, ExchangeError> {
        self.limit_order("sell", base, quote, amount, price, options)
            .await
    }

    async fn limit_order(
        &self,
        side: &str,
        base: &str,
        quote: &str,
        amount: Decimal,
        price: Decimal,
        options: LimitOrderOptions,
    ) -> Result<BitstampOrderResponse, ExchangeError> {
        if options.ioc_order && options.fok_order {
            return Err(ExchangeError::InvalidParameters(
                "An order cannot be both IOC and FOK".to_string(),
            ));
        }

        let pair = map_pair(base, quote)?;
        let params = Params::default()
            .with("amount", amount)
            .with("price", price)
            .with_opt("limit_price", options.limit_price)
            .with_flag("daily_order", options.daily_order)
            .with_flag("ioc_order", options.ioc_order)
            .with_flag("fok_order", options.fok_order)
            .with_opt("client_order_id", options.client_order_id);

        self.client
            .post_json(
                &endpoint(&format!("{}/{}/", side, pair)),
                &params.pairs(),
                true,
            )
            .await
    }

    /// Market buy; `amount` is in the base currency
    pub async fn buy_market_order(
        &self,
        base: &str,
        quote: &str,
        amount: Decimal,
    ) -> Result<BitstampOrderResponse, ExchangeError> {
        let pair = map_pair(base, quote)?;
        let params = Params::default().with("amount", amount);
        self.client
            .post_json(&endpoint(&format!("buy/market/{}/", pair)), &params.pairs(), true)
            .await
    }

    /// Market sell; `amount` is in the base currency
    pub async fn sell_market_order(
        &self,
        base: &str,
        quote: &str,
        amount: Decimal,
    ) -> Result<BitstampOrderResponse, ExchangeError> {
        let pair = map_pair(base, quote)?;
        let params = Params::default().with("amount", amount);
        self.client
            .post_json(&endpoint(&format!("sell/market/{}/", pair)), &params.pairs(), true)
            .await
    }

    /// Instant buy; `amount` is in the counter currency
    pub async fn buy_instant_order(
        &self,
        base: &str,
        quote: &str,
        amount: Decimal,
    ) -> Result<BitstampOrderResponse, ExchangeError> {
        let pair = map_pair(base, quote)?;
        let params = Params::default().with("amount", amount);
        self.client
            .post_json(&endpoint(&format!("buy/instant/{}/", pair)), &params.pairs(), true)
            .await
    }

    /// Instant sell; with `amount_in_counter` the amount is in the counter currency
    pub async fn sell_instant_order(
        &self,
        base: &str,
        quote: &str,
        amount: Decimal,
        amount_in_counter: bool,
        client_order_id: Option<&str>,
    ) -> Result<BitstampOrderResponse, ExchangeError> {
        let pair = map_pair(base, quote)?;
        let params = Params::default()
            .with("amount", amount)
            .with_flag("amount_in_counter", amount_in_counter)
            .with_opt("client_order_id", client_order_id);
        self.client
            .post_json(&endpoint(&format!("sell/instant/{}/", pair)), &params.pairs(), true)
            .await
    }

    // Funding

    /// Withdrawal requests from the last `timedelta` seconds (server default otherwise)
    pub async fn get_withdrawal_requests(&self, timedelta: Option<u64>) -> Result<Value, ExchangeError> {
        self.private(
            "withdrawal-requests/",
            Params::default().with_opt("timedelta", timedelta),
        )
        .await
    }

    /// `memo_id` applies to XLM and HBAR, `destination_tag` to XRP
    pub async fn coin_withdrawal(
        &self,
        currency: &str,
        amount: Decimal,
        address: &str,
        memo_id: Option<&str>,
        destination_tag: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        let params = Params::default()
            .with("amount", amount)
            .with("address", address)
            .with_opt("memo_id", memo_id)
            .with_opt("destination_tag", destination_tag);
        self.private(&format!("{}_withdrawal/", currency.to_lowercase()), params)
            .await
    }

    pub async fn ripple_withdrawal(
        &self,
        amount: Decimal,
        address: &str,
        currency: &str,
    ) -> Result<Value, ExchangeError> {
        let params = Params::default()
            .with("amount", amount)
            .with("address", address)
            .with("currency", currency);
        self.private("ripple_withdrawal/", params).await
    }

    pub async fn get_deposit_address(&self, currency: &str) -> Result<Value, ExchangeError> {
        self.private(
            &format!("{}_address/", currency.to_lowercase()),
            Params::default(),
        )
        .await
    }

    pub async fn get_ripple_deposit_address(&self) -> Result<Value, ExchangeError> {
        self.private("ripple_address/", Params::default()).await
    }

    pub async fn get_unconfirmed_btc_deposits(&self) -> Result<Value, ExchangeError> {
        self.private("btc_unconfirmed/", Params::default()).await
    }

    pub async fn transfer_to_main(
        &self,
        amount: Decimal,
        currency: &str,
        sub_account: &str,
    ) -> Result<Value, ExchangeError> {
        self.private("transfer-to-main/", transfer_params(amount, currency, sub_account))
            .await
    }

    pub async fn transfer_from_main(
        &self,
        amount: Decimal,
        currency: &str,
        sub_account: &str,
    ) -> Result<Value, ExchangeError> {
        self.private("transfer-from-main/", transfer_params(amount, currency, sub_account))
            .await
    }

    /// Token for the private WebSocket channels
    #[instrument(skip(self), fields(exchange = "bitstamp"))]
    pub async fn get_websocket_token(&self) -> Result<WebsocketToken, ExchangeError> {
        self.client
            .post_json(&endpoint("websockets_token/"), &[], true)
            .await
    }
}

fn transactions_params(query: &UserTransactionsQuery) -> Params {
    Params::default()
        .with("offset", query.offset)
        .with("limit", query.limit)
        .with("sort", query.sort.as_param())
        .with_opt("since_timestamp", query.since_timestamp)
        .with_opt("since_id", query.since_id)
}

fn transfer_params(amount: Decimal, currency: &str, sub_account: &str) -> Params {
    Params::default()
        .with("amount", amount)
        .with("currency", currency)
        .with("subAccount", sub_account)
}
