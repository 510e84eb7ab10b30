use crate::config::{self, Credentials, GexConfig};
use crate::fetcher;
use crate::fetcher_free::FreeChainClient;
use crate::gex::{self, GexResult};
use crate::models::ContractRecord;
use crate::schwab_client::SchwabClient;
use crate::token_store::{self, TokenStore};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

// -----------------------------------------------
// API REQUEST/RESPONSE MODELS
// -----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GexQuery {
    pub strikes_above: Option<u32>,
    pub strikes_below: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct GexResponse {
    pub symbol: String,
    pub spot_price: f64,
    pub data_source: String,
    pub fetched_at: DateTime<Utc>,
    pub gex: GexResult,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub symbol: String,
    pub data_source: String,
}

// -----------------------------------------------
// DATA SOURCE SELECTION
// -----------------------------------------------

/// The configured chain fetcher. Both variants produce the same
/// normalized records, so everything downstream is source-agnostic.
pub enum ChainSource {
    Schwab(Arc<SchwabClient>),
    Free(FreeChainClient),
}

impl ChainSource {
    pub fn label(&self) -> &'static str {
        match self {
            ChainSource::Schwab(_) => "schwab",
            ChainSource::Free(_) => "free",
        }
    }

    pub async fn fetch(&self, cfg: &GexConfig) -> Result<(Vec<ContractRecord>, f64)> {
        match self {
            ChainSource::Schwab(client) => fetcher::fetch_options_chain(client, cfg).await,
            ChainSource::Free(client) => client.fetch_options_chain_free(cfg).await,
        }
    }
}

/// Build the chain source selected by `DATA_SOURCE`. For the Schwab
/// source this is where authentication happens: seed the local token
/// cache from the external bundle if the cache is empty, then construct
/// the renewal client — which performs its first renewal, so a
/// misconfigured or expired credential fails loudly here, at startup.
pub async fn build_chain_source(_cfg: &GexConfig) -> Result<ChainSource> {
    match config::get_data_source().as_str() {
        "schwab" => {
            let credentials = Credentials::from_env()?;
            let store = TokenStore::new(config::get_token_cache_path());
            store.seed_if_empty(token_store::bundle_from_env().as_ref())?;

            let client = if store.is_empty() {
                // No cache anywhere: fall back to the env refresh token
                SchwabClient::new(&credentials).await?
            } else {
                SchwabClient::from_store(&credentials, &store).await?
            };
            Ok(ChainSource::Schwab(Arc::new(client)))
        }
        _ => Ok(ChainSource::Free(FreeChainClient::new()?)),
    }
}

// -----------------------------------------------
// APPLICATION STATE
// -----------------------------------------------

#[derive(Clone)]
pub struct AppState {
    source: Arc<ChainSource>,
    cfg: Arc<GexConfig>,
    cache: Arc<RwLock<Option<(Snapshot, Instant)>>>,
}

/// One fetched chain, shared by every request inside the TTL window.
#[derive(Clone)]
struct Snapshot {
    records: Vec<ContractRecord>,
    spot_price: f64,
    fetched_at: DateTime<Utc>,
}

impl AppState {
    pub async fn new(cfg: GexConfig) -> Result<Self> {
        let source = build_chain_source(&cfg).await?;
        Ok(Self {
            source: Arc::new(source),
            cfg: Arc::new(cfg),
            cache: Arc::new(RwLock::new(None)),
        })
    }
}

/// Return the cached snapshot if it is younger than the refresh interval,
/// else fetch a fresh one and cache it with its fetch time.
async fn get_snapshot(state: &AppState) -> Result<Snapshot> {
    let ttl = Duration::from_secs(state.cfg.refresh_interval_secs);

    {
        let cache = state.cache.read().await;
        if let Some((snapshot, fetched_at)) = &*cache {
            if fetched_at.elapsed() < ttl {
                return Ok(snapshot.clone());
            }
        }
    }

    let (records, spot_price) = state.source.fetch(&state.cfg).await?;
    let snapshot = Snapshot {
        records,
        spot_price,
        fetched_at: Utc::now(),
    };

    {
        let mut cache = state.cache.write().await;
        *cache = Some((snapshot.clone(), Instant::now()));
    }

    Ok(snapshot)
}

// -----------------------------------------------
// API HANDLERS
// -----------------------------------------------

/// GET /api/gex?strikes_above=20&strikes_below=20 - GEX surface + series
async fn get_gex(
    Query(query): Query<GexQuery>,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<GexResponse>>, StatusCode> {
    let start_time = Instant::now();

    let snapshot = match get_snapshot(&state).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            return Ok(Json(ApiResponse {
                success: false,
                data: None,
                error: Some(e.to_string()),
                processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
            }))
        }
    };

    // Per-request strike window overrides
    let mut cfg = (*state.cfg).clone();
    if let Some(above) = query.strikes_above {
        cfg.strikes_above_atm = above;
    }
    if let Some(below) = query.strikes_below {
        cfg.strikes_below_atm = below;
    }

    let filtered = gex::filter_strikes_around_atm(&snapshot.records, snapshot.spot_price, &cfg);
    let result = gex::calculate_gex(&filtered, snapshot.spot_price, &cfg);

    Ok(Json(ApiResponse {
        success: true,
        data: Some(GexResponse {
            symbol: config::DISPLAY_SYMBOL.to_string(),
            spot_price: snapshot.spot_price,
            data_source: state.source.label().to_string(),
            fetched_at: snapshot.fetched_at,
            gex: result,
        }),
        error: None,
        processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
    }))
}

/// GET /api/health - liveness + configured data source
async fn get_health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse {
        success: true,
        data: Some(HealthResponse {
            status: "ok".to_string(),
            symbol: config::DISPLAY_SYMBOL.to_string(),
            data_source: state.source.label().to_string(),
        }),
        error: None,
        processing_time_ms: None,
    })
}

// -----------------------------------------------
// SERVER SETUP
// -----------------------------------------------

pub async fn start_server(port: u16, cfg: GexConfig) -> Result<()> {
    let app_state = AppState::new(cfg).await?;
    let data_source = app_state.source.label();

    let app = Router::new()
        .route("/api/gex", get(get_gex))
        .route("/api/health", get(get_health))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 GEX API Server running on http://{} ({} data)", addr, data_source);
    println!("📋 Available endpoints:");
    println!("   GET  /api/gex?strikes_above=20&strikes_below=20");
    println!("   GET  /api/health");
    println!();

    axum::serve(listener, app).await?;
    Ok(())
}
