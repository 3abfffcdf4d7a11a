use std::fmt;
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::api::AuthError;
use crate::cache::{CacheValue, SharedCache};
use crate::config::ClientCredentials;

/// Cache key of the bearer token.
pub const TOKEN_CACHE_KEY: &str = "access_token";

/// Bearer token for the data API. Its lifetime is the cache TTL.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(Arc<str>);

impl AccessToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(****)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Obtains bearer tokens through the OAuth client-credentials grant.
///
/// Holds no token state of its own: the token lives in the shared cache, so
/// any number of managers built over the same cache see the same token.
/// Clone is cheap.
#[derive(Clone)]
pub struct CredentialManager {
    client: Client,
    cache: SharedCache,
    credentials: Arc<ClientCredentials>,
    auth_url: Arc<str>,
}

impl CredentialManager {
    pub fn new(
        client: Client,
        cache: SharedCache,
        credentials: ClientCredentials,
        auth_url: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            client,
            cache,
            credentials: Arc::new(credentials),
            auth_url: auth_url.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Return the cached token, or exchange credentials for a new one.
    ///
    /// Failures are logged and returned; there is no internal retry.
    pub async fn obtain_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(CacheValue::Token(token)) = self.cache.get(TOKEN_CACHE_KEY) {
            debug!("Using cached access token");
            return Ok(token);
        }

        match self.exchange().await {
            Ok(token) => {
                self.cache
                    .set(TOKEN_CACHE_KEY, CacheValue::Token(token.clone()));
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, client_id = %self.credentials.client_id, "Error fetching access token");
                Err(e)
            }
        }
    }

    /// Drop the cached token so the next call performs a fresh exchange.
    pub fn invalidate(&self) {
        if self.cache.remove(TOKEN_CACHE_KEY).is_some() {
            debug!("Invalidated cached access token");
        }
    }

    async fn exchange(&self) -> Result<AccessToken, AuthError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&*self.auth_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::from_status(status, &body));
        }

        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        info!(
            expires_in = parsed.expires_in,
            cache_ttl_secs = self.cache.ttl().as_secs(),
            "Obtained new access token"
        );
        Ok(AccessToken::new(token))
    }
}
