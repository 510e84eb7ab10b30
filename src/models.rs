use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// -----------------------------------------------
// CANONICAL CONTRACT RECORD
// -----------------------------------------------

/// One merged row per (strike, expiration) pair: call and put side of the
/// same contract line. Missing sides are zero-filled, never absent, so
/// downstream arithmetic needs no null handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub strike: f64,
    pub expiration: NaiveDate,
    /// Days to expiration, 0 on expiry day.
    pub dte: i64,
    pub call_oi: f64,
    pub put_oi: f64,
    pub call_gamma: f64,
    pub put_gamma: f64,
    pub call_delta: f64,
    pub put_delta: f64,
    pub call_volume: f64,
    pub put_volume: f64,
}

impl Default for ContractRecord {
    fn default() -> Self {
        Self {
            strike: 0.0,
            expiration: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            dte: 0,
            call_oi: 0.0,
            put_oi: 0.0,
            call_gamma: 0.0,
            put_gamma: 0.0,
            call_delta: 0.0,
            put_delta: 0.0,
            call_volume: 0.0,
            put_volume: 0.0,
        }
    }
}

// -----------------------------------------------
// SCHWAB CHAIN RESPONSE
// -----------------------------------------------

/// `/marketdata/v1/chains` response. Strike maps are keyed by the strike
/// price rendered as a string; exp-date maps are keyed by
/// "YYYY-MM-DD:DTE".
#[derive(Debug, Clone, Deserialize)]
pub struct ChainResponse {
    #[serde(rename = "underlyingPrice")]
    pub underlying_price: Option<f64>,

    pub underlying: Option<UnderlyingQuote>,

    #[serde(rename = "callExpDateMap", default)]
    pub call_exp_date_map: HashMap<String, HashMap<String, Vec<ChainContract>>>,

    #[serde(rename = "putExpDateMap", default)]
    pub put_exp_date_map: HashMap<String, HashMap<String, Vec<ChainContract>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnderlyingQuote {
    pub last: Option<f64>,
    pub mark: Option<f64>,
    pub close: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainContract {
    #[serde(rename = "strikePrice")]
    pub strike_price: Option<f64>,

    #[serde(rename = "daysToExpiration")]
    pub days_to_expiration: Option<i64>,

    #[serde(rename = "openInterest")]
    pub open_interest: Option<f64>,

    pub gamma: Option<f64>,

    pub delta: Option<f64>,

    #[serde(rename = "totalVolume")]
    pub total_volume: Option<f64>,
}

impl ChainResponse {
    /// Spot price of the underlying. Fallback order, tried once here and
    /// nowhere else: `underlyingPrice`, then `underlying.last`,
    /// `underlying.mark`, `underlying.close`. Zero means "not available".
    pub fn spot_price(&self) -> f64 {
        if let Some(p) = self.underlying_price {
            if p != 0.0 {
                return p;
            }
        }
        if let Some(u) = &self.underlying {
            return u.last.or(u.mark).or(u.close).unwrap_or(0.0);
        }
        0.0
    }
}

// -----------------------------------------------
// SCHWAB QUOTE RESPONSE
// -----------------------------------------------

/// `/marketdata/v1/{symbol}/quotes` response: a map from symbol to a
/// per-symbol envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse(pub HashMap<String, SymbolQuote>);

/// Per-symbol quote envelope. Newer payloads nest the fields under
/// `quote`; older ones put them at the top level, so both are modeled and
/// the accessor prefers the nested form.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolQuote {
    pub quote: Option<QuoteFields>,

    #[serde(flatten)]
    pub fields: QuoteFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteFields {
    #[serde(rename = "lastPrice")]
    pub last_price: Option<f64>,

    pub last: Option<f64>,

    pub mark: Option<f64>,
}

impl QuoteResponse {
    /// Last traded price for `symbol`. Fallback order, tried once here and
    /// nowhere else: `quote.lastPrice`, `quote.last`, `quote.mark`, then
    /// the same three at the envelope's top level. Zero means "not
    /// available".
    pub fn last_price(&self, symbol: &str) -> f64 {
        let Some(entry) = self.0.get(symbol) else {
            return 0.0;
        };
        if let Some(q) = &entry.quote {
            if let Some(p) = q.last_price.or(q.last).or(q.mark) {
                return p;
            }
        }
        entry
            .fields
            .last_price
            .or(entry.fields.last)
            .or(entry.fields.mark)
            .unwrap_or(0.0)
    }
}

// -----------------------------------------------
// YAHOO OPTIONS RESPONSE (free source)
// -----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct YahooOptionsEnvelope {
    #[serde(rename = "optionChain")]
    pub option_chain: YahooOptionChain,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooOptionChain {
    #[serde(default)]
    pub result: Vec<YahooChainResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooChainResult {
    pub quote: Option<YahooQuote>,

    #[serde(rename = "expirationDates", default)]
    pub expiration_dates: Vec<i64>,

    #[serde(default)]
    pub options: Vec<YahooOptionSlice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooQuote {
    #[serde(rename = "regularMarketPrice")]
    pub regular_market_price: Option<f64>,

    #[serde(rename = "regularMarketPreviousClose")]
    pub regular_market_previous_close: Option<f64>,
}

impl YahooQuote {
    /// Spot price fallback: `regularMarketPrice`, then previous close.
    pub fn spot_price(&self) -> f64 {
        self.regular_market_price
            .or(self.regular_market_previous_close)
            .unwrap_or(0.0)
    }
}

/// One expiration's worth of contracts.
#[derive(Debug, Clone, Deserialize)]
pub struct YahooOptionSlice {
    #[serde(rename = "expirationDate")]
    pub expiration_date: i64,

    #[serde(default)]
    pub calls: Vec<YahooContract>,

    #[serde(default)]
    pub puts: Vec<YahooContract>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooContract {
    pub strike: Option<f64>,

    #[serde(rename = "openInterest")]
    pub open_interest: Option<f64>,

    #[serde(rename = "impliedVolatility")]
    pub implied_volatility: Option<f64>,

    pub volume: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_spot_price_fallback_order() {
        let json = r#"{
            "underlyingPrice": 0.0,
            "underlying": {"last": null, "mark": 6930.5, "close": 6900.0}
        }"#;
        let chain: ChainResponse = serde_json::from_str(json).unwrap();
        // underlyingPrice of 0 is "not available": falls through to mark
        assert_eq!(chain.spot_price(), 6930.5);

        let json = r#"{"underlyingPrice": 6932.3}"#;
        let chain: ChainResponse = serde_json::from_str(json).unwrap();
        assert_eq!(chain.spot_price(), 6932.3);
    }

    #[test]
    fn test_quote_last_price_nested_and_flat() {
        let json = r#"{"$SPX": {"quote": {"lastPrice": 6932.3}}}"#;
        let quotes: QuoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(quotes.last_price("$SPX"), 6932.3);

        // Flat (legacy) shape without the quote sub-object
        let json = r#"{"$SPX": {"mark": 6910.0}}"#;
        let quotes: QuoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(quotes.last_price("$SPX"), 6910.0);

        // Unknown symbol
        assert_eq!(quotes.last_price("$NDX"), 0.0);
    }

    #[test]
    fn test_chain_contract_missing_fields_deserialize() {
        let json = r#"{"strikePrice": 6900.0}"#;
        let c: ChainContract = serde_json::from_str(json).unwrap();
        assert_eq!(c.strike_price, Some(6900.0));
        assert_eq!(c.open_interest, None);
        assert_eq!(c.gamma, None);
    }
}
