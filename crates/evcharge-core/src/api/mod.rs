//! Region data client for the TDX charging-point API.
//!
//! `RegionFetcher` resolves a region to its endpoint, serves cached records
//! when it can, and otherwise performs an authenticated GET with a bounded
//! number of attempts and a fixed backoff between them.

pub mod client;
pub mod error;

pub use client::{RegionFetcher, RetryPolicy};
pub use error::{AuthError, FetchError};
