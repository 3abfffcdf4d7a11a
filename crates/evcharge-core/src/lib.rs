//! Charging-point data acquisition for the TDX EV API.
//!
//! The pieces, leaves first:
//!
//! - [`cache::TtlCache`]: capacity-bounded, time-expiring store shared by
//!   everything below
//! - [`auth::CredentialManager`]: client-credentials token exchange, token
//!   kept in the shared cache
//! - [`api::RegionFetcher`]: per-region fetch with caching and bounded retry
//!
//! Build one cache, hand it to [`RegionFetcher::from_config`], and call
//! [`RegionFetcher::fetch`]. `fetch` never fails; an empty sequence means no
//! data could be obtained and the reason has been logged.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod summary;
pub mod utils;

pub use api::{AuthError, FetchError, RegionFetcher, RetryPolicy};
pub use auth::{AccessToken, CredentialManager, SecretStore};
pub use cache::{CacheValue, SharedCache, TtlCache};
pub use config::{ClientCredentials, Config, ConfigError};
pub use models::{ChargingPoint, Region, RegionSet};
pub use summary::RegionSummary;

use std::sync::Arc;

/// Build the single cache instance described by `config`.
pub fn shared_cache(config: &Config) -> SharedCache {
    Arc::new(TtlCache::new(config.cache_capacity, config.cache_ttl()))
}
