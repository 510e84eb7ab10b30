use crate::config::GexConfig;
use crate::gex::strike_key;
use crate::models::{ChainContract, ChainResponse, ContractRecord, QuoteResponse};
use crate::schwab_client::{ChainQuery, SchwabClient};
use anyhow::{bail, Context, Result};
use chrono::{Duration, Local, NaiveDate};
use std::collections::{BTreeMap, HashMap};

enum Side {
    Call,
    Put,
}

// -----------------------------------------------
// SCHWAB CHAIN FETCH
// -----------------------------------------------

/// Fetch the SPX options chain with Greeks and OI from the Schwab API and
/// normalize it into merged per-(strike, expiration) records.
pub async fn fetch_options_chain(
    client: &SchwabClient,
    cfg: &GexConfig,
) -> Result<(Vec<ContractRecord>, f64)> {
    let today = Local::now().date_naive();
    let to_date = today + Duration::days(cfg.max_dte);

    // A few strikes of headroom beyond the display window, so the ATM
    // filter always has a full ladder to cut from.
    let strike_count = cfg.strikes_above_atm + cfg.strikes_below_atm + 5;

    let response = client
        .option_chains(&ChainQuery {
            symbol: cfg.symbol.clone(),
            contract_type: Some("ALL".to_string()),
            strike_count: Some(strike_count),
            include_underlying_quote: Some(true),
            from_date: Some(today),
            to_date: Some(to_date),
        })
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!(
            "Schwab API error {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        );
    }

    let chain: ChainResponse = response
        .json()
        .await
        .context("Failed to parse option chain response")?;

    let spot_price = chain.spot_price();
    let records = merge_chain(&chain);

    Ok((records, spot_price))
}

/// Fetch the current SPX spot price.
pub async fn get_spot_price(client: &SchwabClient, cfg: &GexConfig) -> Result<f64> {
    let response = client.quote(&cfg.symbol).await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!(
            "Quote error {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        );
    }
    let quotes: QuoteResponse = response
        .json()
        .await
        .context("Failed to parse quote response")?;
    Ok(quotes.last_price(&cfg.symbol))
}

// -----------------------------------------------
// CHAIN NORMALIZATION
// -----------------------------------------------

/// Flatten both exp-date maps and merge call/put sides onto one record
/// per (strike, expiration). A side with no contract stays zero-filled.
/// Output is sorted strike-descending, then expiration-ascending.
pub fn merge_chain(chain: &ChainResponse) -> Vec<ContractRecord> {
    let mut merged: BTreeMap<(NaiveDate, i64), ContractRecord> = BTreeMap::new();

    collect_exp_date_map(&chain.call_exp_date_map, Side::Call, &mut merged);
    collect_exp_date_map(&chain.put_exp_date_map, Side::Put, &mut merged);

    let mut records: Vec<ContractRecord> = merged.into_values().collect();
    records.sort_by(|a, b| {
        b.strike
            .partial_cmp(&a.strike)
            .unwrap()
            .then(a.expiration.cmp(&b.expiration))
    });
    records
}

fn collect_exp_date_map(
    map: &HashMap<String, HashMap<String, Vec<ChainContract>>>,
    side: Side,
    out: &mut BTreeMap<(NaiveDate, i64), ContractRecord>,
) {
    for (exp_key, strikes) in map {
        // exp_key format: "YYYY-MM-DD:DTE"
        let mut parts = exp_key.splitn(2, ':');
        let date_part = parts.next().unwrap_or_default();
        let Ok(expiration) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            tracing::warn!(%exp_key, "skipping unparseable expiration key");
            continue;
        };
        let key_dte: i64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);

        for (strike_str, contracts) in strikes {
            for contract in contracts {
                let strike = contract
                    .strike_price
                    .or_else(|| strike_str.parse().ok())
                    .unwrap_or(0.0);
                if strike <= 0.0 {
                    continue;
                }
                let dte = contract.days_to_expiration.unwrap_or(key_dte).max(0);

                let record = out
                    .entry((expiration, strike_key(strike)))
                    .or_insert_with(|| ContractRecord {
                        strike,
                        expiration,
                        dte,
                        ..Default::default()
                    });
                record.dte = dte;

                let oi = contract.open_interest.unwrap_or(0.0);
                let gamma = contract.gamma.unwrap_or(0.0);
                let delta = contract.delta.unwrap_or(0.0);
                let volume = contract.total_volume.unwrap_or(0.0);

                match side {
                    Side::Call => {
                        record.call_oi += oi;
                        record.call_gamma = gamma;
                        record.call_delta = delta;
                        record.call_volume += volume;
                    }
                    Side::Put => {
                        record.put_oi += oi;
                        record.put_gamma = gamma;
                        record.put_delta = delta;
                        record.put_volume += volume;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_from_json(json: &str) -> ChainResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_merge_joins_call_and_put_sides() {
        let chain = chain_from_json(
            r#"{
                "underlyingPrice": 6900.0,
                "callExpDateMap": {
                    "2026-08-14:6": {
                        "6900.0": [{
                            "strikePrice": 6900.0,
                            "daysToExpiration": 6,
                            "openInterest": 250,
                            "gamma": 0.02,
                            "delta": 0.51,
                            "totalVolume": 1200
                        }]
                    }
                },
                "putExpDateMap": {
                    "2026-08-14:6": {
                        "6900.0": [{
                            "strikePrice": 6900.0,
                            "daysToExpiration": 6,
                            "openInterest": 180,
                            "gamma": 0.021,
                            "delta": -0.49,
                            "totalVolume": 900
                        }]
                    }
                }
            }"#,
        );

        let records = merge_chain(&chain);
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.strike, 6900.0);
        assert_eq!(rec.dte, 6);
        assert_eq!(rec.call_oi, 250.0);
        assert_eq!(rec.put_oi, 180.0);
        assert_eq!(rec.call_gamma, 0.02);
        assert_eq!(rec.put_gamma, 0.021);
        assert_eq!(rec.call_delta, 0.51);
        assert_eq!(rec.put_delta, -0.49);
    }

    #[test]
    fn test_one_sided_strike_zero_fills_other_side() {
        let chain = chain_from_json(
            r#"{
                "callExpDateMap": {
                    "2026-08-14:6": {
                        "6905.0": [{
                            "strikePrice": 6905.0,
                            "openInterest": 40,
                            "gamma": 0.015
                        }]
                    }
                },
                "putExpDateMap": {}
            }"#,
        );

        let records = merge_chain(&chain);
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.call_oi, 40.0);
        assert_eq!(rec.put_oi, 0.0);
        assert_eq!(rec.put_gamma, 0.0);
        // dte falls back to the exp-key suffix
        assert_eq!(rec.dte, 6);
    }

    #[test]
    fn test_strike_falls_back_to_map_key() {
        let chain = chain_from_json(
            r#"{
                "callExpDateMap": {
                    "2026-08-14:6": {
                        "6910.0": [{"openInterest": 5, "gamma": 0.01}]
                    }
                },
                "putExpDateMap": {}
            }"#,
        );
        let records = merge_chain(&chain);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].strike, 6910.0);
    }

    #[test]
    fn test_output_sorted_strike_descending_then_expiration() {
        let chain = chain_from_json(
            r#"{
                "callExpDateMap": {
                    "2026-08-14:6": {
                        "6895.0": [{"strikePrice": 6895.0, "openInterest": 1, "gamma": 0.01}],
                        "6905.0": [{"strikePrice": 6905.0, "openInterest": 1, "gamma": 0.01}]
                    },
                    "2026-08-21:13": {
                        "6905.0": [{"strikePrice": 6905.0, "openInterest": 1, "gamma": 0.01}]
                    }
                },
                "putExpDateMap": {}
            }"#,
        );
        let records = merge_chain(&chain);
        let keys: Vec<(f64, i64)> = records.iter().map(|r| (r.strike, r.dte)).collect();
        assert_eq!(keys, vec![(6905.0, 6), (6905.0, 13), (6895.0, 6)]);
    }
}
