use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::ThingsError;

/// Refresh tokens this long before the issuer says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        !self.access_token.is_empty()
            && self
                .expires_at
                .is_none_or(|at| Instant::now() + EXPIRY_MARGIN < at)
    }
}

/// OAuth2 client-credentials token source with an in-memory token cache.
pub(crate) struct TokenSource {
    http_client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    current: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub(crate) fn new(
        http_client: Client,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            http_client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            current: Mutex::new(None),
        }
    }

    /// Return a valid access token, fetching a new one when the cached token is stale.
    pub(crate) async fn access_token(&self) -> Result<String, ThingsError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.access_token.clone());
        }

        let response = self
            .http_client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                ThingsError::Token(format!("request to {} failed: {e}", self.token_url))
            })?;

        if !response.status().is_success() {
            return Err(ThingsError::Token(format!(
                "{} returned HTTP {}",
                self.token_url,
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ThingsError::Token(format!("failed to parse token response: {e}")))?;

        if token.access_token.is_empty() {
            return Err(ThingsError::Token(format!(
                "an invalid token was returned from {}",
                self.token_url
            )));
        }

        tracing::debug!(expires_in = ?token.expires_in, "Fetched access token");

        let cached = CachedToken {
            access_token: token.access_token,
            expires_at: token
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        };
        let access_token = cached.access_token.clone();
        *current = Some(cached);

        Ok(access_token)
    }
}
