//! Region data client.
//!
//! `RegionFetcher` turns a region identifier into that region's charging
//! points. Per call the protocol is:
//!
//! 1. unknown region: fail without touching the network
//! 2. cached records: return them
//! 3. up to `max_attempts` rounds of token + authenticated GET, with a fixed
//!    backoff after each failed round
//!
//! A successful response is cached under the region's city code, even when
//! its `ChargingPoints` list is absent or empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::auth::{AccessToken, CredentialManager};
use crate::cache::{CacheValue, SharedCache};
use crate::config::Config;
use crate::models::{ChargingPoint, ChargingPointsResponse, Region, RegionSet};

use super::FetchError;

/// Maximum number of regions fetched at once by `fetch_all`.
const MAX_CONCURRENT_REQUESTS: usize = 4;

/// Build the HTTP client shared by the credential manager and fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder().timeout(timeout).build()
}

/// How many rounds a fetch may take and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

/// Fetches and caches charging points per region.
/// Clone is cheap; clones share the cache and the in-flight gates.
#[derive(Clone)]
pub struct RegionFetcher {
    client: Client,
    credentials: CredentialManager,
    cache: SharedCache,
    regions: Arc<RegionSet>,
    retry: RetryPolicy,
    // One gate per region so concurrent misses for the same region share a
    // single network round trip.
    inflight: Arc<HashMap<String, Mutex<()>>>,
}

impl RegionFetcher {
    pub fn new(
        client: Client,
        credentials: CredentialManager,
        cache: SharedCache,
        regions: RegionSet,
        retry: RetryPolicy,
    ) -> Self {
        let inflight = regions
            .iter()
            .map(|r| (r.cache_key().to_string(), Mutex::new(())))
            .collect();
        Self {
            client,
            credentials,
            cache,
            regions: Arc::new(regions),
            retry,
            inflight: Arc::new(inflight),
        }
    }

    /// Wire a fetcher and its credential manager from configuration, over
    /// the given shared cache.
    pub fn from_config(config: &Config, cache: SharedCache) -> Result<Self, FetchError> {
        let credentials = config.credentials()?;
        let client = build_http_client(config.request_timeout())?;
        let manager = CredentialManager::new(
            client.clone(),
            Arc::clone(&cache),
            credentials,
            config.auth_url.as_str(),
        );
        Ok(Self::new(
            client,
            manager,
            cache,
            config.region_set(),
            RetryPolicy::from_config(config),
        ))
    }

    pub fn regions(&self) -> &RegionSet {
        &self.regions
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Charging points for `region`, or an empty sequence on any failure.
    ///
    /// Never returns an error: every failure is logged with its region and
    /// converted to an empty result.
    pub async fn fetch(&self, region: &str) -> Arc<[ChargingPoint]> {
        match self.try_fetch(region).await {
            Ok(records) => records,
            Err(e) => {
                match &e {
                    FetchError::UnknownRegion(_) => {
                        error!(region = %region, error = %e, "Region has no configured endpoint")
                    }
                    FetchError::Auth(_) => {
                        error!(region = %region, error = %e, "Could not obtain access token")
                    }
                    FetchError::InvalidResponse(_) => {
                        warn!(region = %region, error = %e, "Region response could not be parsed")
                    }
                    _ => error!(region = %region, error = %e, "Failed to fetch region data"),
                }
                Arc::from(Vec::new())
            }
        }
    }

    /// Same protocol as [`fetch`](Self::fetch) with the failure kept.
    pub async fn try_fetch(&self, region: &str) -> Result<Arc<[ChargingPoint]>, FetchError> {
        let region = self
            .regions
            .resolve(region)
            .ok_or_else(|| FetchError::UnknownRegion(region.to_string()))?;

        if let Some(records) = self.cached_records(region) {
            debug!(region = %region.name, count = records.len(), "Serving region from cache");
            return Ok(records);
        }

        let _gate = match self.inflight.get(region.cache_key()) {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        // Another caller may have filled the cache while we waited
        if let Some(records) = self.cached_records(region) {
            debug!(region = %region.name, "Region fetched by a concurrent caller");
            return Ok(records);
        }

        self.fetch_with_retry(region).await
    }

    /// Fetch every configured region, in configuration order.
    pub async fn fetch_all(&self) -> Vec<(Region, Arc<[ChargingPoint]>)> {
        stream::iter(self.regions.iter().cloned())
            .map(|region| async move {
                let records = self.fetch(&region.code).await;
                (region, records)
            })
            .buffered(MAX_CONCURRENT_REQUESTS)
            .collect()
            .await
    }

    fn cached_records(&self, region: &Region) -> Option<Arc<[ChargingPoint]>> {
        match self.cache.get(region.cache_key()) {
            Some(CacheValue::Records(records)) => Some(records),
            _ => None,
        }
    }

    async fn fetch_with_retry(&self, region: &Region) -> Result<Arc<[ChargingPoint]>, FetchError> {
        let max_attempts = self.retry.max_attempts;

        for attempt in 1..=max_attempts {
            // A token failure ends the call; the next call starts a new exchange
            let token = self.credentials.obtain_token().await?;

            match self.request_records(region, &token).await {
                Ok(response) => {
                    let missing_list = response.is_missing_list();
                    let records: Arc<[ChargingPoint]> = response.into_records().into();

                    if missing_list {
                        warn!(region = %region.name, "Response has no ChargingPoints list, caching empty result");
                    } else if records.is_empty() {
                        warn!(region = %region.name, "API returned no charging points, caching empty result");
                    } else {
                        info!(region = %region.name, count = records.len(), attempt, "Fetched charging points");
                    }

                    self.cache
                        .set(region.cache_key(), CacheValue::Records(Arc::clone(&records)));
                    return Ok(records);
                }
                Err(e) if e.is_retryable() => {
                    if matches!(e, FetchError::Unauthorized) {
                        self.credentials.invalidate();
                    }
                    warn!(
                        region = %region.name,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Fetching region data failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let exhausted = FetchError::Exhausted {
            region: region.name.clone(),
            attempts: max_attempts,
        };
        error!(region = %region.name, attempts = max_attempts, "{}", exhausted);
        Err(exhausted)
    }

    async fn request_records(
        &self,
        region: &Region,
        token: &AccessToken,
    ) -> Result<ChargingPointsResponse, FetchError> {
        let response = self
            .client
            .get(&region.endpoint)
            .bearer_auth(token.as_str())
            .send()
            .await?;

        // Only 200 carries a body; any other status, 2xx included, is a failed round
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            FetchError::InvalidResponse(format!("{} response could not be parsed: {}", region.code, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::config::ClientCredentials;
    use crate::models::default_regions;

    fn offline_fetcher() -> RegionFetcher {
        let cache: SharedCache = Arc::new(TtlCache::new(10, Duration::from_secs(600)));
        let client = Client::new();
        let manager = CredentialManager::new(
            client.clone(),
            Arc::clone(&cache),
            ClientCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
            },
            // Nothing listens here; any network call would fail
            "http://127.0.0.1:9/token",
        );
        RegionFetcher::new(
            client,
            manager,
            cache,
            RegionSet::new(default_regions("http://127.0.0.1:9", 30)),
            RetryPolicy::default(),
        )
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config {
            max_attempts: 5,
            retry_backoff_ms: 250,
            ..Config::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Duration::from_millis(250));
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }

    #[tokio::test]
    async fn test_unknown_region_is_configuration_error() {
        let fetcher = offline_fetcher();
        let err = fetcher.try_fetch("Nowhere").await.expect_err("unknown region");
        assert!(matches!(err, FetchError::UnknownRegion(ref r) if r == "Nowhere"));
        assert!(fetcher.fetch("Nowhere").await.is_empty());
    }

    #[tokio::test]
    async fn test_cached_region_served_without_network() {
        let fetcher = offline_fetcher();
        let point: ChargingPoint =
            serde_json::from_str(r#"{"StationID":"S1","ChargingRate":"免費"}"#).expect("record");
        fetcher
            .cache()
            .set("Taipei", CacheValue::Records(Arc::from(vec![point.clone()])));

        // Display name and city code share the cache entry
        let records = fetcher.fetch("台北市").await;
        assert_eq!(&records[..], &[point]);
    }
}
