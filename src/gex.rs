use crate::config::GexConfig;
use crate::models::ContractRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Strike × expiration exposure surface. Rows are sorted strike-descending
/// (high strikes on top, matching a strike-ladder display); `by_expiry` is
/// parallel to `expiry_columns`; cells with no data are 0.0, never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GexSurface {
    pub expiry_columns: Vec<NaiveDate>,
    pub aggregate_label: String,
    pub rows: Vec<GexRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GexRow {
    pub strike: f64,
    pub by_expiry: Vec<f64>,
    /// Net GEX summed over every expiration with DTE inside the aggregate
    /// window, whether or not that expiration has its own column.
    pub aggregate: f64,
    /// Call OI − put OI, summed across all expirations.
    pub net_contracts: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikePoint {
    pub strike: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GexResult {
    pub surface: GexSurface,
    /// Net GEX per strike across ALL expirations (bar chart input).
    pub gex_by_strike: Vec<StrikePoint>,
    /// Net OI per strike across ALL expirations.
    pub net_oi_by_strike: Vec<StrikePoint>,
}

impl GexResult {
    fn empty(cfg: &GexConfig) -> Self {
        Self {
            surface: GexSurface {
                expiry_columns: Vec::new(),
                aggregate_label: aggregate_label(cfg),
                rows: Vec::new(),
            },
            gex_by_strike: Vec::new(),
            net_oi_by_strike: Vec::new(),
        }
    }
}

fn aggregate_label(cfg: &GexConfig) -> String {
    format!("0-{} DTE", cfg.aggregate_dte)
}

// Strikes come off the wire as floats; comparing them directly makes poor
// map keys. Exchange increments are far coarser than 0.001, so milli-strike
// integers are an exact identity.
pub(crate) fn strike_key(strike: f64) -> i64 {
    (strike * 1000.0).round() as i64
}

/// Calculate net dealer gamma exposure per strike per expiration.
///
/// GEX formula (dealer perspective):
///     call_gex = call_OI × call_gamma × multiplier
///     put_gex  = -(put_OI × put_gamma × multiplier)
///     net_gex  = call_gex + put_gex
///
/// Positive net GEX marks strikes where dealer hedging leans against price
/// moves (magnets); negative marks strikes where it amplifies them.
/// `spot_price` is accepted for signature parity with the fetch callers and
/// plays no part in the arithmetic.
pub fn calculate_gex(records: &[ContractRecord], _spot_price: f64, cfg: &GexConfig) -> GexResult {
    if records.is_empty() {
        return GexResult::empty(cfg);
    }

    let multiplier = cfg.contract_multiplier;

    // Step 1: displayed columns — distinct expirations, chronological,
    // first N. Later expirations keep feeding the aggregate column and the
    // per-strike series; they just get no column of their own.
    let mut expirations: Vec<NaiveDate> = records.iter().map(|r| r.expiration).collect();
    expirations.sort();
    expirations.dedup();
    let display_exps: Vec<NaiveDate> = expirations
        .into_iter()
        .take(cfg.num_expiry_columns)
        .collect();

    // Step 2: one pass over the full record set, accumulating every output
    // at once. Duplicate (strike, expiration) records sum rather than
    // clobber.
    let mut cells: HashMap<(i64, NaiveDate), f64> = HashMap::new();
    let mut aggregate: HashMap<i64, f64> = HashMap::new();
    let mut total_gex: HashMap<i64, f64> = HashMap::new();
    let mut total_net_oi: HashMap<i64, f64> = HashMap::new();
    let mut strike_of: HashMap<i64, f64> = HashMap::new();

    for rec in records {
        let call_gex = rec.call_oi * rec.call_gamma * multiplier;
        // Dealers short puts must sell as price falls: the negation encodes
        // the hedging direction, not the raw OI×gamma magnitude.
        let put_gex = -(rec.put_oi * rec.put_gamma * multiplier);
        let net_gex = call_gex + put_gex;
        let net_contracts = rec.call_oi - rec.put_oi;

        let key = strike_key(rec.strike);
        strike_of.entry(key).or_insert(rec.strike);

        *cells.entry((key, rec.expiration)).or_insert(0.0) += net_gex;
        if rec.dte <= cfg.aggregate_dte {
            *aggregate.entry(key).or_insert(0.0) += net_gex;
        }
        *total_gex.entry(key).or_insert(0.0) += net_gex;
        *total_net_oi.entry(key).or_insert(0.0) += net_contracts;
    }

    // Step 3: strike ladder, highest strike first
    let mut strike_keys: Vec<i64> = strike_of.keys().copied().collect();
    strike_keys.sort();
    strike_keys.reverse();

    let rows: Vec<GexRow> = strike_keys
        .iter()
        .map(|key| {
            let by_expiry = display_exps
                .iter()
                .map(|exp| cells.get(&(*key, *exp)).copied().unwrap_or(0.0))
                .collect();
            GexRow {
                strike: strike_of[key],
                by_expiry,
                aggregate: aggregate.get(key).copied().unwrap_or(0.0),
                net_contracts: total_net_oi.get(key).copied().unwrap_or(0.0),
            }
        })
        .collect();

    let gex_by_strike = strike_keys
        .iter()
        .map(|key| StrikePoint {
            strike: strike_of[key],
            value: total_gex.get(key).copied().unwrap_or(0.0),
        })
        .collect();

    let net_oi_by_strike = strike_keys
        .iter()
        .map(|key| StrikePoint {
            strike: strike_of[key],
            value: total_net_oi.get(key).copied().unwrap_or(0.0),
        })
        .collect();

    GexResult {
        surface: GexSurface {
            expiry_columns: display_exps,
            aggregate_label: aggregate_label(cfg),
            rows,
        },
        gex_by_strike,
        net_oi_by_strike,
    }
}

/// Keep only strikes inside the configured window around ATM. This is the
/// caller-side pre-filter; `calculate_gex` itself never filters by
/// distance from spot. A non-positive spot disables the filter.
pub fn filter_strikes_around_atm(
    records: &[ContractRecord],
    spot_price: f64,
    cfg: &GexConfig,
) -> Vec<ContractRecord> {
    if spot_price <= 0.0 {
        return records.to_vec();
    }

    let atm = (spot_price / cfg.strike_increment).round() * cfg.strike_increment;
    let min_strike = atm - cfg.strikes_below_atm as f64 * cfg.strike_increment;
    let max_strike = atm + cfg.strikes_above_atm as f64 * cfg.strike_increment;

    records
        .iter()
        .filter(|r| r.strike >= min_strike && r.strike <= max_strike)
        .cloned()
        .collect()
}

/// Format a GEX value for display (e.g. 571200 → "571.2k").
pub fn format_gex_value(val: f64) -> String {
    if val == 0.0 || val.is_nan() {
        return "-".to_string();
    }
    let abs_val = val.abs();
    if abs_val >= 1_000_000.0 {
        format!("{:.1}M", val / 1_000_000.0)
    } else if abs_val >= 1_000.0 {
        format!("{:.1}k", val / 1_000.0)
    } else {
        format!("{:.0}", val)
    }
}
