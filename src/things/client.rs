use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::token::TokenSource;
use crate::config::Config;
use crate::things::models::{JsonApiResponse, Thing};

/// Registry responses keyed by request URL.
pub type ThingsCache = Cache<String, Arc<JsonApiResponse>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ThingsError {
    #[error("thing not found")]
    NotFound,

    #[error("request failed, not authorized")]
    Unauthorized,

    #[error("request failed with status code {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Decode(String),

    #[error("failed to get client credentials: {0}")]
    Token(String),
}

/// Lookup of registry records and their relations.
#[async_trait]
pub trait ThingsClient: Send + Sync {
    /// Things related to `thing_id` (the `included` section of its document).
    async fn find_related_things(&self, thing_id: &str) -> Result<Vec<Thing>, ThingsError>;

    /// The full record of `thing_id`.
    async fn find_by_id(&self, thing_id: &str) -> Result<Thing, ThingsError>;
}

pub struct HttpThingsClient {
    http_client: Client,
    base_url: String,
    token_source: Option<TokenSource>,
    cache: ThingsCache,
}

impl HttpThingsClient {
    /// Create an unauthenticated client.
    ///
    /// # Errors
    ///
    /// Returns `ThingsError::Request` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        cache_ttl: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ThingsError> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ThingsError::Request(format!("failed to create HTTP client: {e}")))?;

        let cache: ThingsCache = Cache::builder().time_to_live(cache_ttl).build();

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_source: None,
            cache,
        })
    }

    /// Authenticate requests with an OAuth2 client-credentials grant.
    #[must_use]
    pub fn with_client_credentials(
        mut self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        self.token_source = Some(TokenSource::new(
            self.http_client.clone(),
            token_url,
            client_id,
            client_secret,
        ));
        self
    }

    /// Build a client from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns `ThingsError::Request` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ThingsError> {
        let client = Self::new(
            &config.things_url,
            Duration::from_secs(config.things_cache_ttl_seconds),
            Duration::from_secs(config.things_request_timeout_seconds),
        )?;

        if config.has_oauth2() {
            Ok(client.with_client_credentials(
                &config.oauth2_token_url,
                &config.oauth2_client_id,
                &config.oauth2_client_secret,
            ))
        } else {
            tracing::warn!("No OAuth2 token URL configured, registry requests are unauthenticated");
            Ok(client)
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ThingsCache {
        &self.cache
    }

    /// Spawn the background sweep that evicts expired cache entries.
    pub fn spawn_cache_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                cache.run_pending_tasks().await;
                tracing::debug!(entries = cache.entry_count(), "Things cache swept");
            }
        })
    }

    fn thing_url(&self, thing_id: &str) -> String {
        format!("{}/api/v0/things/{}", self.base_url, thing_id)
    }

    async fn fetch(&self, thing_id: &str) -> Result<Arc<JsonApiResponse>, ThingsError> {
        let url = self.thing_url(thing_id);

        if let Some(cached) = self.cache.get(&url).await {
            tracing::debug!(url = %url, "things_cache_hit");
            return Ok(cached);
        }

        let mut request = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.api+json");

        if let Some(token_source) = &self.token_source {
            let token = token_source.access_token().await?;
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ThingsError::Request(format!("GET {url}: {e}")))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => return Err(ThingsError::Unauthorized),
            StatusCode::NOT_FOUND => return Err(ThingsError::NotFound),
            status => return Err(ThingsError::Status(status.as_u16())),
        }

        let text = response
            .text()
            .await
            .map_err(|e| ThingsError::Request(format!("failed to read response body: {e}")))?;

        let document: JsonApiResponse = serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body_preview = %text.chars().take(500).collect::<String>(),
                "Failed to parse things response"
            );
            ThingsError::Decode(e.to_string())
        })?;

        let document = Arc::new(document);
        self.cache.insert(url, document.clone()).await;

        Ok(document)
    }
}

#[async_trait]
impl ThingsClient for HttpThingsClient {
    async fn find_related_things(&self, thing_id: &str) -> Result<Vec<Thing>, ThingsError> {
        let document = self.fetch(thing_id).await?;
        Ok(document.included.clone())
    }

    async fn find_by_id(&self, thing_id: &str) -> Result<Thing, ThingsError> {
        let document = self.fetch(thing_id).await?;
        document.data.clone().ok_or(ThingsError::NotFound)
    }
}
