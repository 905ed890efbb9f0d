use crate::core::errors::ExchangeError;

/// Every (base, quote) combination the exchange lists, with its market symbol.
///
/// Both orientations are listed, so `("eur", "btc")` resolves to `btceur` as well.
const PAIRS: &[(&str, &str, &str)] = &[
    ("eur", "btc", "btceur"),
    ("eur", "eth", "etheur"),
    ("eur", "ltc", "ltceur"),
    ("eur", "usd", "eurusd"),
    ("eur", "xrp", "xrpeur"),
    ("eur", "gbp", "gbpeur"),
    ("eur", "uni", "unieur"),
    ("usd", "btc", "btcusd"),
    ("usd", "eth", "ethusd"),
    ("usd", "eur", "eurusd"),
    ("usd", "ltc", "ltcusd"),
    ("usd", "xrp", "xrpusd"),
    ("usd", "gbp", "gbpusd"),
    ("usd", "uni", "uniusd"),
    ("btc", "eur", "btceur"),
    ("btc", "usd", "btcusd"),
    ("btc", "eth", "ethbtc"),
    ("btc", "ltc", "ltcbtc"),
    ("btc", "xrp", "xrpbtc"),
    ("btc", "gbp", "btcgbp"),
    ("btc", "pax", "btcpax"),
    ("btc", "usdt", "btcusdt"),
    ("btc", "usdc", "btcusdc"),
    ("btc", "uni", "unibtc"),
    ("eth", "eur", "etheur"),
    ("eth", "usd", "ethusd"),
    ("eth", "btc", "ethbtc"),
    ("eth", "gbp", "ethgbp"),
    ("eth", "pax", "ethpax"),
    ("eth", "usdt", "ethusdt"),
    ("eth", "usdc", "ethusdc"),
    ("xrp", "eur", "xrpeur"),
    ("xrp", "usd", "xrpusd"),
    ("xrp", "btc", "xrpbtc"),
    ("xrp", "gbp", "xrpgbp"),
    ("xrp", "pax", "xrppax"),
    ("xrp", "usdt", "xrpusdt"),
    ("ltc", "eur", "ltceur"),
    ("ltc", "usd", "ltcusd"),
    ("ltc", "btc", "ltcbtc"),
    ("ltc", "gbp", "ltcgbp"),
    ("gbp", "eur", "gbpeur"),
    ("gbp", "usd", "gbpusd"),
    ("gbp", "btc", "btcgbp"),
    ("gbp", "eth", "ethgbp"),
    ("gbp", "xrp", "xrpgbp"),
    ("gbp", "ltc", "ltcgbp"),
    ("pax", "btc", "btcpax"),
    ("pax", "eth", "ethpax"),
    ("pax", "xrp", "xrppax"),
    ("usdt", "btc", "btcusdt"),
    ("usdt", "eth", "ethusdt"),
    ("usdt", "xrp", "xrpusdt"),
    ("usdc", "btc", "btcusdc"),
    ("usdc", "eth", "ethusdc"),
    ("uni", "eur", "unieur"),
    ("uni", "usd", "uniusd"),
    ("uni", "btc", "unibtc"),
];

/// Resolve a base/quote pair to the exchange market symbol, case-insensitively.
pub fn map_pair(base: &str, quote: &str) -> Result<&'static str, ExchangeError> {
    let base_lower = base.to_lowercase();
    let quote_lower = quote.to_lowercase();

    PAIRS
        .iter()
        .find(|(b, q, _)| *b == base_lower && *q == quote_lower)
        .map(|(_, _, symbol)| *symbol)
        .ok_or_else(|| ExchangeError::UnknownPair {
            base: base.to_string(),
            quote: quote.to_string(),
        })
}

/// Resolve several pairs at once, optionally sorted by symbol.
pub fn map_pairs(pairs: &[(&str, &str)], sort: bool) -> Result<Vec<&'static str>, ExchangeError> {
    let mut symbols = pairs
        .iter()
        .map(|(base, quote)| map_pair(base, quote))
        .collect::<Result<Vec<_>, _>>()?;

    if sort {
        symbols.sort_unstable();
    }
    Ok(symbols)
}
