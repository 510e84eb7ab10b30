use crate::config::{
    self, GexConfig, RETRY_BASE_DELAY_MS, RETRY_FACTOR, RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_SECS,
    WARMUP_DELAY_MS,
};
use crate::gex::strike_key;
use crate::models::{ContractRecord, YahooOptionSlice, YahooOptionsEnvelope};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use rand::{seq::SliceRandom, thread_rng};
use reqwest::{header, Client, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;

/// Fixed risk-free rate for the Black-Scholes backfill. Greeks derived
/// here are approximations layered on delayed data; they are not
/// numerically comparable to broker-sourced gammas at very short DTE,
/// where the 1-day time floor dominates.
pub const RISK_FREE_RATE: f64 = 0.05;

const DAYS_PER_YEAR: f64 = 365.0;

// -----------------------------------------------
// FREE CHAIN CLIENT (Yahoo, no API key)
// -----------------------------------------------

/// Chain fetcher for the free data source. Yahoo serves the options API
/// only to sessions that look like a browser, so the client keeps a
/// cookie jar and warms the session once before the first API call.
pub struct FreeChainClient {
    client: Client,
    warmed_up: RwLock<bool>,
}

impl FreeChainClient {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            warmed_up: RwLock::new(false),
        })
    }

    /// Warm up the session (only once per client).
    async fn warmup_if_needed(&self) -> Result<()> {
        if *self.warmed_up.read().await {
            return Ok(());
        }

        let mut warmed = self.warmed_up.write().await;
        if !*warmed {
            let _ = self
                .client
                .get(config::YAHOO_BASE_URL)
                .header("Accept", "text/html")
                .send()
                .await
                .context("Failed to warm up session")?;

            tokio::time::sleep(Duration::from_millis(WARMUP_DELAY_MS)).await;
            *warmed = true;
        }

        Ok(())
    }

    /// Fetch with retry on rate limiting and server errors.
    async fn fetch_json(&self, url: &str) -> Result<String> {
        self.warmup_if_needed().await?;

        let backoff = ExponentialBackoff::from_millis(RETRY_BASE_DELAY_MS)
            .factor(RETRY_FACTOR)
            .max_delay(Duration::from_secs(RETRY_MAX_DELAY_SECS))
            .take(RETRY_MAX_ATTEMPTS);

        Retry::spawn(backoff, || async {
            let res = self
                .client
                .get(url)
                .send()
                .await
                .context("Request send failed")?;

            let status = res.status();

            if status.is_success() {
                let text = res.text().await.context("Failed to read body")?;

                let trimmed = text.trim();
                if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
                    let preview: String = text.chars().take(200).collect();
                    anyhow::bail!("Non-JSON response: {}", preview);
                }

                Ok(text)
            } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                anyhow::bail!("Retryable error: {}", status)
            } else {
                let body = res.text().await.unwrap_or_default();
                let preview: String = body.chars().take(200).collect();
                anyhow::bail!("Client error {}: {}", status, preview)
            }
        })
        .await
    }

    /// Fetch the SPX options chain from Yahoo and backfill Greeks via
    /// Black-Scholes from each side's implied volatility.
    pub async fn fetch_options_chain_free(
        &self,
        cfg: &GexConfig,
    ) -> Result<(Vec<ContractRecord>, f64)> {
        let url = config::yahoo_options_url(config::YAHOO_SYMBOL, None);
        let text = self.fetch_json(&url).await?;
        let envelope: YahooOptionsEnvelope =
            serde_json::from_str(&text).context("Failed to parse option chain envelope")?;

        let root = envelope
            .option_chain
            .result
            .first()
            .ok_or_else(|| anyhow!("Empty option chain result"))?;

        let spot_price = root.quote.as_ref().map(|q| q.spot_price()).unwrap_or(0.0);
        if spot_price == 0.0 {
            bail!("Could not fetch SPX price");
        }

        let today = Local::now().date_naive();

        // Keep expirations inside the DTE window
        let mut valid_exps: Vec<(i64, NaiveDate, i64)> = Vec::new();
        for &epoch in &root.expiration_dates {
            let Some(date) = DateTime::from_timestamp(epoch, 0).map(|dt| dt.date_naive()) else {
                continue;
            };
            let dte = (date - today).num_days();
            if dte >= 0 && dte <= cfg.max_dte {
                valid_exps.push((epoch, date, dte));
            }
        }

        if valid_exps.is_empty() {
            return Ok((Vec::new(), spot_price));
        }

        let mut records: Vec<ContractRecord> = Vec::new();

        for (epoch, expiration, dte) in valid_exps {
            let url = config::yahoo_options_url(config::YAHOO_SYMBOL, Some(epoch));
            let slice = match self.fetch_expiry_slice(&url).await {
                Ok(slice) => slice,
                Err(e) => {
                    tracing::warn!(%expiration, "skipping expiration: {}", e);
                    continue;
                }
            };
            records.extend(build_records(&slice, expiration, dte, spot_price));
        }

        records.sort_by(|a, b| {
            b.strike
                .partial_cmp(&a.strike)
                .unwrap()
                .then(a.expiration.cmp(&b.expiration))
        });

        Ok((records, spot_price))
    }

    async fn fetch_expiry_slice(&self, url: &str) -> Result<YahooOptionSlice> {
        let text = self.fetch_json(url).await?;
        let envelope: YahooOptionsEnvelope =
            serde_json::from_str(&text).context("Failed to parse expiry chain")?;
        envelope
            .option_chain
            .result
            .into_iter()
            .next()
            .and_then(|r| r.options.into_iter().next())
            .ok_or_else(|| anyhow!("No options data in response"))
    }
}

/// Merge the calls/puts of one expiration into per-strike records and
/// backfill gamma/delta from implied vol.
fn build_records(
    slice: &YahooOptionSlice,
    expiration: NaiveDate,
    dte: i64,
    spot_price: f64,
) -> Vec<ContractRecord> {
    #[derive(Default, Clone, Copy)]
    struct SideRow {
        oi: f64,
        iv: f64,
        volume: f64,
    }

    let mut by_strike: BTreeMap<i64, (f64, SideRow, SideRow)> = BTreeMap::new();

    for call in &slice.calls {
        let Some(strike) = call.strike.filter(|s| *s > 0.0) else {
            continue;
        };
        let entry = by_strike
            .entry(strike_key(strike))
            .or_insert((strike, SideRow::default(), SideRow::default()));
        entry.1.oi += call.open_interest.unwrap_or(0.0);
        entry.1.iv = call.implied_volatility.unwrap_or(0.0);
        entry.1.volume += call.volume.unwrap_or(0.0);
    }
    for put in &slice.puts {
        let Some(strike) = put.strike.filter(|s| *s > 0.0) else {
            continue;
        };
        let entry = by_strike
            .entry(strike_key(strike))
            .or_insert((strike, SideRow::default(), SideRow::default()));
        entry.2.oi += put.open_interest.unwrap_or(0.0);
        entry.2.iv = put.implied_volatility.unwrap_or(0.0);
        entry.2.volume += put.volume.unwrap_or(0.0);
    }

    // Time to expiry in years, floored at 1 day so 0-DTE contracts don't
    // degenerate the Black-Scholes terms.
    let t_years = dte.max(1) as f64 / DAYS_PER_YEAR;

    by_strike
        .into_values()
        .map(|(strike, call, put)| ContractRecord {
            strike,
            expiration,
            dte,
            call_oi: call.oi,
            put_oi: put.oi,
            call_gamma: bs_gamma(spot_price, strike, t_years, call.iv),
            put_gamma: bs_gamma(spot_price, strike, t_years, put.iv),
            call_delta: bs_delta(spot_price, strike, t_years, call.iv, true),
            put_delta: bs_delta(spot_price, strike, t_years, put.iv, false),
            call_volume: call.volume,
            put_volume: put.volume,
        })
        .collect()
}

// -----------------------------------------------
// BLACK-SCHOLES BACKFILL
// -----------------------------------------------

/// Black-Scholes gamma (same for calls and puts). Zero when any input is
/// degenerate.
pub fn bs_gamma(s: f64, k: f64, t: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 || t <= 0.0 || s <= 0.0 || k <= 0.0 {
        return 0.0;
    }
    let d1 = ((s / k).ln() + (RISK_FREE_RATE + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt());
    norm_pdf(d1) / (s * sigma * t.sqrt())
}

/// Black-Scholes delta. Zero when any input is degenerate.
pub fn bs_delta(s: f64, k: f64, t: f64, sigma: f64, is_call: bool) -> f64 {
    if sigma <= 0.0 || t <= 0.0 || s <= 0.0 || k <= 0.0 {
        return 0.0;
    }
    let d1 = ((s / k).ln() + (RISK_FREE_RATE + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt());
    if is_call {
        norm_cdf(d1)
    } else {
        norm_cdf(d1) - 1.0
    }
}

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / (2.0_f64).sqrt()))
}

fn norm_pdf(x: f64) -> f64 {
    (-(x * x) / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

// Abramowitz & Stegun 7.1.26, max abs error 1.5e-7
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

// -----------------------------------------------
// HTTP CLIENT BUILDER
// -----------------------------------------------

fn build_client() -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    let lang = config::ACCEPT_LANGUAGES.choose(&mut thread_rng()).unwrap();
    headers.insert(header::ACCEPT_LANGUAGE, header::HeaderValue::from_str(lang)?);
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));

    Ok(Client::builder()
        .default_headers(headers)
        .cookie_store(true)
        .user_agent(config::USER_AGENT)
        .timeout(config::HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?)
}
