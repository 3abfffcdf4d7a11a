//! In-memory TTL cache shared by the credential manager and region fetcher.
//!
//! One `TtlCache` instance is built at startup and handed to both
//! subsystems as a `SharedCache`. The access token lives under
//! `"access_token"`; region records live under each region's city code.
//!
//! Entries expire after the configured TTL (10 minutes by default) and the
//! store never holds more than its capacity.

pub mod manager;

use std::sync::Arc;

use crate::auth::AccessToken;
use crate::models::ChargingPoint;

pub use manager::{EntryInfo, TtlCache};

/// Values stored in the shared cache.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Token(AccessToken),
    Records(Arc<[ChargingPoint]>),
}

impl CacheValue {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::Token(_) => "token",
            CacheValue::Records(_) => "records",
        }
    }
}

/// The single cache instance passed to every component.
pub type SharedCache = Arc<TtlCache<CacheValue>>;
