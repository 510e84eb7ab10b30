use crate::error::GexError;
use std::time::Duration;

// -----------------------------------------------
// SCHWAB API ENDPOINTS
// -----------------------------------------------
pub const SCHWAB_BASE_URL: &str = "https://api.schwabapi.com";
pub const SCHWAB_TOKEN_URL: &str = "https://api.schwabapi.com/v1/oauth/token";

pub fn schwab_quote_path(symbol: &str) -> String {
    format!(
        "/marketdata/v1/{}/quotes",
        urlencoding::encode(symbol) // URL-encode the symbol ($SPX has a '$')
    )
}

pub const SCHWAB_CHAINS_PATH: &str = "/marketdata/v1/chains";

// -----------------------------------------------
// FREE DATA SOURCE (YAHOO) ENDPOINTS
// -----------------------------------------------
pub const YAHOO_BASE_URL: &str = "https://finance.yahoo.com";

pub fn yahoo_options_url(symbol: &str, expiration_epoch: Option<i64>) -> String {
    let base = format!(
        "https://query2.finance.yahoo.com/v7/finance/options/{}",
        urlencoding::encode(symbol)
    );
    match expiration_epoch {
        Some(epoch) => format!("{}?date={}", base, epoch),
        None => base,
    }
}

// -----------------------------------------------
// UNDERLYING SYMBOL
// -----------------------------------------------
pub const SCHWAB_SYMBOL: &str = "$SPX";
pub const YAHOO_SYMBOL: &str = "^SPX";
pub const DISPLAY_SYMBOL: &str = "SPX";

// -----------------------------------------------
// HTTP CLIENT CONFIG
// -----------------------------------------------
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                               AppleWebKit/537.36 (KHTML, like Gecko) \
                               Chrome/131.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "en-US,en;q=0.8,de;q=0.5",
];

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

// -----------------------------------------------
// TOKEN LIFECYCLE
// -----------------------------------------------
// Renew this many seconds before the server-declared expiry so a token is
// never presented after the server already considers it dead.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;
pub const TOKEN_DEFAULT_LIFETIME_SECS: i64 = 1800;

// -----------------------------------------------
// SESSION WARMUP (free source)
// -----------------------------------------------
pub const WARMUP_DELAY_MS: u64 = 200;

// -----------------------------------------------
// RETRY CONFIG (free source chain fetch)
// -----------------------------------------------
pub const RETRY_BASE_DELAY_MS: u64 = 100;
pub const RETRY_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_SECS: u64 = 3;
pub const RETRY_MAX_ATTEMPTS: usize = 3;

// -----------------------------------------------
// GEX DEFAULTS
// -----------------------------------------------
pub const DEFAULT_STRIKE_INCREMENT: f64 = 5.0;
pub const DEFAULT_STRIKES_ABOVE_ATM: u32 = 20;
pub const DEFAULT_STRIKES_BELOW_ATM: u32 = 20;
pub const DEFAULT_MAX_DTE: i64 = 65;
pub const DEFAULT_AGGREGATE_DTE: i64 = 30;
pub const DEFAULT_NUM_EXPIRY_COLUMNS: usize = 5;
// Shares per option contract. Changing the underlying's multiplier is a
// real operational scenario, so it lives in config, not as a literal.
pub const DEFAULT_CONTRACT_MULTIPLIER: f64 = 100.0;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

// -----------------------------------------------
// RUNTIME CONFIGURATION
// -----------------------------------------------

/// Process-wide tuning knobs, constructed once at startup and passed by
/// reference to every component that needs them.
#[derive(Debug, Clone)]
pub struct GexConfig {
    pub symbol: String,
    pub strike_increment: f64,
    pub strikes_above_atm: u32,
    pub strikes_below_atm: u32,
    pub max_dte: i64,
    pub aggregate_dte: i64,
    pub num_expiry_columns: usize,
    pub contract_multiplier: f64,
    pub refresh_interval_secs: u64,
}

impl Default for GexConfig {
    fn default() -> Self {
        Self {
            symbol: SCHWAB_SYMBOL.to_string(),
            strike_increment: DEFAULT_STRIKE_INCREMENT,
            strikes_above_atm: DEFAULT_STRIKES_ABOVE_ATM,
            strikes_below_atm: DEFAULT_STRIKES_BELOW_ATM,
            max_dte: DEFAULT_MAX_DTE,
            aggregate_dte: DEFAULT_AGGREGATE_DTE,
            num_expiry_columns: DEFAULT_NUM_EXPIRY_COLUMNS,
            contract_multiplier: DEFAULT_CONTRACT_MULTIPLIER,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
        }
    }
}

impl GexConfig {
    /// Build a config from `GEX_*` environment overrides on top of the
    /// defaults. Unparseable values keep the default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<u32>("GEX_STRIKES_ABOVE_ATM") {
            cfg.strikes_above_atm = v;
        }
        if let Some(v) = env_parse::<u32>("GEX_STRIKES_BELOW_ATM") {
            cfg.strikes_below_atm = v;
        }
        if let Some(v) = env_parse::<i64>("GEX_MAX_DTE") {
            cfg.max_dte = v;
        }
        if let Some(v) = env_parse::<i64>("GEX_AGGREGATE_DTE") {
            cfg.aggregate_dte = v;
        }
        if let Some(v) = env_parse::<usize>("GEX_NUM_EXPIRY_COLUMNS") {
            cfg.num_expiry_columns = v;
        }
        if let Some(v) = env_parse::<f64>("GEX_CONTRACT_MULTIPLIER") {
            cfg.contract_multiplier = v;
        }
        if let Some(v) = env_parse::<u64>("GEX_REFRESH_INTERVAL_SECS") {
            cfg.refresh_interval_secs = v;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

// -----------------------------------------------
// CREDENTIALS
// -----------------------------------------------

/// Schwab app credentials plus the long-lived refresh secret. The refresh
/// token is optional: without it only the free data source works.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub app_key: String,
    pub app_secret: String,
    pub refresh_token: Option<String>,
}

const PLACEHOLDER_APP_KEY: &str = "your_app_key_here";

impl Credentials {
    /// Load credentials from `SCHWAB_APP_KEY` / `SCHWAB_APP_SECRET` /
    /// `SCHWAB_REFRESH_TOKEN`. An absent or placeholder key/secret is a
    /// configuration error the operator must fix out of band.
    pub fn from_env() -> Result<Self, GexError> {
        let app_key = std::env::var("SCHWAB_APP_KEY").unwrap_or_default();
        let app_secret = std::env::var("SCHWAB_APP_SECRET").unwrap_or_default();

        if app_key.is_empty() || app_key == PLACEHOLDER_APP_KEY {
            return Err(GexError::Configuration(
                "Schwab API credentials not configured. \
                 Set SCHWAB_APP_KEY and SCHWAB_APP_SECRET"
                    .to_string(),
            ));
        }
        if app_secret.is_empty() {
            return Err(GexError::Configuration(
                "SCHWAB_APP_SECRET is not set".to_string(),
            ));
        }

        let refresh_token = std::env::var("SCHWAB_REFRESH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            app_key,
            app_secret,
            refresh_token,
        })
    }
}

// -----------------------------------------------
// RUNTIME ENVIRONMENT
// -----------------------------------------------

/// Data source: "schwab" (real-time, needs credentials) or "free"
/// (delayed quotes, Greeks backfilled via Black-Scholes).
pub fn get_data_source() -> String {
    std::env::var("DATA_SOURCE").unwrap_or_else(|_| "free".to_string())
}

/// Execution mode: "server" (default), "snapshot", or "quote".
pub fn get_execution_mode() -> String {
    std::env::var("GEX_MODE").unwrap_or_else(|_| "server".to_string())
}

/// API server port for server mode.
pub fn get_server_port() -> u16 {
    std::env::var("GEX_PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse::<u16>()
        .unwrap_or(3001)
}

/// Path of the local token cache file.
pub fn get_token_cache_path() -> String {
    std::env::var("GEX_TOKEN_CACHE").unwrap_or_else(|_| "tokens.json".to_string())
}
