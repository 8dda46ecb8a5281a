use std::sync::Arc;
use std::time::{Duration, Instant};

use gleaner_core::error::AppError;
use gleaner_core::models::CatalogItem;
use gleaner_core::traits::{CatalogClient, Credential};
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const DEFAULT_MARKET: &str = "US";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens are refreshed this long before the upstream expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// HTTP catalog client using reqwest.
///
/// Authenticates with the client-credentials flow and caches the access
/// token until shortly before it expires. A 401 on any data request drops
/// the cached token so the next call fetches a fresh one.
#[derive(Clone)]
pub struct HttpCatalogClient {
    client: Client,
    api_base: String,
    token_url: String,
    market: String,
    client_id: String,
    client_secret: String,
    timeout_secs: u64,
    token: Arc<Mutex<Option<CachedToken>>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn new(credential: &Credential, now: Instant) -> Self {
        let lifetime = credential.expires_in.saturating_sub(EXPIRY_MARGIN);
        Self {
            access_token: credential.access_token.clone(),
            expires_at: now + lifetime,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

impl HttpCatalogClient {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, AppError> {
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(AppError::ConfigError(
                "client id and secret are required".into(),
            ));
        }
        Self::build(client_id, client_secret, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        let rebuilt = Self::build(&self.client_id, &self.client_secret, timeout)?;
        Ok(Self {
            api_base: self.api_base,
            token_url: self.token_url,
            market: self.market,
            ..rebuilt
        })
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    fn build(client_id: &str, client_secret: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("Gleaner/0.1 (catalog harvester)")
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            market: DEFAULT_MARKET.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            timeout_secs: timeout.as_secs(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        Url::parse(&format!("{}/{path}", self.api_base))
            .map_err(|e| AppError::ConfigError(format!("Invalid API base URL: {e}")))
    }

    fn search_url(&self, query: &str, limit: usize, offset: usize) -> Result<Url, AppError> {
        let mut url = self.endpoint("search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("type", "track")
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("market", &self.market);
        Ok(url)
    }

    fn collection_url(&self, id: &str, limit: usize, offset: usize) -> Result<Url, AppError> {
        let mut url = self.endpoint("playlists")?;
        url.path_segments_mut()
            .map_err(|_| AppError::ConfigError("API base URL cannot have a path".into()))?
            .push(id)
            .push("tracks");
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("market", &self.market);
        Ok(url)
    }

    fn batch_url(&self, ids: &[String]) -> Result<Url, AppError> {
        let mut url = self.endpoint("tracks")?;
        url.query_pairs_mut()
            .append_pair("ids", &ids.join(","))
            .append_pair("market", &self.market);
        Ok(url)
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }

    async fn request_token(&self) -> Result<Credential, AppError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .finish();

        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(AppError::ConfigError(format!(
                "Credentials rejected by token endpoint (HTTP {})",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(classify_status(status, response.headers(), &self.token_url));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse token response: {e}")))?;

        tracing::debug!(expires_in = token.expires_in, "Obtained access token");
        Ok(Credential {
            access_token: token.access_token,
            expires_in: Duration::from_secs(token.expires_in),
        })
    }

    /// Current access token, fetching a new one when missing or stale.
    async fn bearer(&self) -> Result<String, AppError> {
        let mut cached = self.token.lock().await;
        let now = Instant::now();
        if let Some(token) = cached.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }
        let credential = self.request_token().await?;
        let token = CachedToken::new(&credential, now);
        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        let bearer = self.bearer().await?;
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                tracing::warn!("Access token rejected, refreshing on next request");
                *self.token.lock().await = None;
            }
            return Err(classify_status(status, response.headers(), url.path()));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse response from {}: {e}", url.path())))
    }
}

/// Map an unsuccessful status to the error taxonomy.
fn classify_status(status: StatusCode, headers: &HeaderMap, target: &str) -> AppError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited {
            retry_after: parse_retry_after(headers),
        },
        StatusCode::FORBIDDEN => AppError::Forbidden(format!("HTTP 403 for {target}")),
        _ => AppError::HttpError(format!("HTTP {} for {target}", status.as_u16())),
    }
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

// ---- Catalog API types ----

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<Paging>,
}

/// Items stay raw until [`decode_item`] so one bad entry cannot fail the page.
#[derive(Deserialize)]
struct Paging {
    #[serde(default)]
    items: Option<Vec<Value>>,
}

impl Paging {
    fn into_items(self) -> Vec<Value> {
        self.items.unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    tracks: Option<Vec<Value>>,
}

/// Decode one page slot. `null` and undecodable items both become `None`.
fn decode_item(value: Value) -> Option<CatalogItem> {
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(item) => Some(item),
        Err(e) => {
            tracing::debug!(error = %e, "Skipping undecodable catalog item");
            None
        }
    }
}

/// Collection pages wrap each item as `{"track": ...}`.
fn decode_collection_entry(entry: Value) -> Option<CatalogItem> {
    match entry {
        Value::Object(mut fields) => fields.remove("track").and_then(decode_item),
        _ => None,
    }
}

impl CatalogClient for HttpCatalogClient {
    async fn fetch_token(&self) -> Result<Credential, AppError> {
        let credential = self.request_token().await?;
        *self.token.lock().await = Some(CachedToken::new(&credential, Instant::now()));
        Ok(credential)
    }

    async fn search(
        &self,
        query: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        let url = self.search_url(query, page_size, offset)?;
        let response: SearchResponse = self.get_json(url).await?;
        let items = response.tracks.map(Paging::into_items).unwrap_or_default();
        Ok(items.into_iter().map(decode_item).collect())
    }

    async fn collection_page(
        &self,
        collection_id: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<Vec<Option<CatalogItem>>, AppError> {
        let url = self.collection_url(collection_id, page_size, offset)?;
        let response: Paging = self.get_json(url).await?;
        Ok(response
            .into_items()
            .into_iter()
            .map(decode_collection_entry)
            .collect())
    }

    async fn fetch_batch(&self, ids: &[String]) -> Result<Vec<Option<CatalogItem>>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.batch_url(ids)?;
        let response: BatchResponse = self.get_json(url).await?;
        Ok(response
            .tracks
            .unwrap_or_default()
            .into_iter()
            .map(decode_item)
            .collect())
    }
}
