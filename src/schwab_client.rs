use crate::config::{
    self, Credentials, HTTP_TIMEOUT, TOKEN_DEFAULT_LIFETIME_SECS, TOKEN_SAFETY_MARGIN_SECS,
};
use crate::error::GexError;
use crate::token_store::TokenStore;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{header, Client, Response};
use serde::Deserialize;
use tokio::sync::Mutex;

// -----------------------------------------------
// CLIENT WRAPPER WITH TOKEN LIFECYCLE
// -----------------------------------------------

/// Schwab API client that owns the bearer credential's lifecycle: one
/// renewal at construction, expiry tracking, lazy renewal before each
/// outbound call, and authenticated dispatch. No browser, no prompts —
/// only the refresh-token grant, so it runs headless.
#[derive(Debug)]
pub struct SchwabClient {
    client: Client,
    app_key: String,
    app_secret: String,
    base_url: String,
    token_url: String,
    auth: Mutex<AuthState>,
}

/// The only mutable shared state in the process: bearer token, its expiry,
/// and the (possibly server-rotated) refresh secret. Mutated exclusively
/// under the `auth` mutex.
#[derive(Debug)]
struct AuthState {
    refresh_token: String,
    access_token: String,
    token_expiry: DateTime<Utc>,
}

/// Token endpoint success payload. `refresh_token` is only present when
/// the server rotates it; `expires_in` is seconds of bearer lifetime.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Query for `/marketdata/v1/chains`. `None` fields are omitted from the
/// request entirely.
#[derive(Debug, Clone, Default)]
pub struct ChainQuery {
    pub symbol: String,
    pub contract_type: Option<String>,
    pub strike_count: Option<u32>,
    pub include_underlying_quote: Option<bool>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl SchwabClient {
    /// Build a client against the production endpoints. Performs one
    /// renewal before returning: a client that exists holds a valid
    /// bearer token, there is no partially constructed state.
    pub async fn new(credentials: &Credentials) -> Result<Self, GexError> {
        let refresh_token = credentials.refresh_token.clone().ok_or_else(|| {
            GexError::Configuration(
                "SCHWAB_REFRESH_TOKEN is not set. Run the interactive auth \
                 flow once and export the refresh token"
                    .to_string(),
            )
        })?;
        Self::with_endpoints(
            &credentials.app_key,
            &credentials.app_secret,
            &refresh_token,
            config::SCHWAB_BASE_URL,
            config::SCHWAB_TOKEN_URL,
        )
        .await
    }

    /// Headless variant: take the refresh token from the local token
    /// cache (seeded beforehand by the credential store bridge when the
    /// deployment supplies an external bundle).
    pub async fn from_store(
        credentials: &Credentials,
        store: &TokenStore,
    ) -> Result<Self, GexError> {
        let record = store
            .load()
            .map_err(|e| GexError::DataShape(e.to_string()))?
            .ok_or_else(|| {
                GexError::Configuration(format!(
                    "token cache {} is empty. Seed it or set SCHWAB_REFRESH_TOKEN",
                    store.path().display()
                ))
            })?;
        Self::with_endpoints(
            &credentials.app_key,
            &credentials.app_secret,
            &record.refresh_token,
            config::SCHWAB_BASE_URL,
            config::SCHWAB_TOKEN_URL,
        )
        .await
    }

    /// Build a client against explicit endpoints. Everything above
    /// funnels through here; tests point it at a local mock server.
    pub async fn with_endpoints(
        app_key: &str,
        app_secret: &str,
        refresh_token: &str,
        base_url: &str,
        token_url: &str,
    ) -> Result<Self, GexError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(GexError::from)?;

        let schwab = Self {
            client,
            app_key: app_key.to_string(),
            app_secret: app_secret.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            auth: Mutex::new(AuthState {
                refresh_token: refresh_token.to_string(),
                access_token: String::new(),
                token_expiry: DateTime::<Utc>::MIN_UTC,
            }),
        };

        // Initial acquisition; a renewal failure fails construction.
        {
            let mut auth = schwab.auth.lock().await;
            schwab.refresh_access_token(&mut auth).await?;
        }

        Ok(schwab)
    }

    /// Base64 app_key:app_secret for the OAuth Basic header.
    fn basic_auth_header(&self) -> String {
        let creds = format!("{}:{}", self.app_key, self.app_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(creds)
        )
    }

    /// Exchange the refresh token for a new bearer token. Called with the
    /// auth mutex held. State is mutated only after a fully parsed
    /// success response; any failure leaves the previous token intact.
    async fn refresh_access_token(&self, auth: &mut AuthState) -> Result<(), GexError> {
        let response = self
            .client
            .post(&self.token_url)
            .header(header::AUTHORIZATION, self.basic_auth_header())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", auth.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "token refresh failed");
            return Err(GexError::Renewal {
                status: status.as_u16(),
                detail: body.chars().take(200).collect(),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GexError::DataShape(format!("token response: {}", e)))?;

        auth.access_token = token.access_token;
        if let Some(rotated) = token.refresh_token {
            // The server may rotate the refresh secret; the old one can be
            // invalidated, so adopt the new one immediately.
            auth.refresh_token = rotated;
        }
        let lifetime = token.expires_in.unwrap_or(TOKEN_DEFAULT_LIFETIME_SECS);
        auth.token_expiry =
            Utc::now() + chrono::Duration::seconds(lifetime - TOKEN_SAFETY_MARGIN_SECS);

        tracing::info!("access token refreshed");
        Ok(())
    }

    /// Return a bearer token that is valid right now, renewing first if
    /// the stored one has expired. The mutex spans check, renewal, and
    /// state update: concurrent callers that both observe an expired
    /// token produce exactly one renewal request, and the second caller
    /// sees the refreshed state when its turn comes.
    async fn ensure_token(&self) -> Result<String, GexError> {
        let mut auth = self.auth.lock().await;
        if Utc::now() >= auth.token_expiry {
            self.refresh_access_token(&mut auth).await?;
        }
        Ok(auth.access_token.clone())
    }

    /// Authenticated GET. Ensures a live token, attaches it, and hands
    /// back the raw response — interpreting the body is the caller's job.
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Response, GexError> {
        let token = self.ensure_token().await?;
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .query(params)
            .send()
            .await?;
        Ok(response)
    }

    // -----------------------------------------------
    // MARKET DATA DISPATCH
    // -----------------------------------------------

    /// Quote lookup for a single symbol.
    pub async fn quote(&self, symbol: &str) -> Result<Response, GexError> {
        self.get(&config::schwab_quote_path(symbol), &[]).await
    }

    /// Option chain lookup.
    pub async fn option_chains(&self, query: &ChainQuery) -> Result<Response, GexError> {
        let mut params: Vec<(&str, String)> = vec![("symbol", query.symbol.clone())];
        if let Some(ct) = &query.contract_type {
            params.push(("contractType", ct.clone()));
        }
        if let Some(count) = query.strike_count {
            params.push(("strikeCount", count.to_string()));
        }
        if let Some(include) = query.include_underlying_quote {
            params.push(("includeUnderlyingQuote", include.to_string()));
        }
        if let Some(from) = query.from_date {
            params.push(("fromDate", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = query.to_date {
            params.push(("toDate", to.format("%Y-%m-%d").to_string()));
        }
        self.get(config::SCHWAB_CHAINS_PATH, &params).await
    }
}
