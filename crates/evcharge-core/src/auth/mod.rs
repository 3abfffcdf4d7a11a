//! Authentication for the TDX API.
//!
//! This module provides:
//! - `CredentialManager`: client-credentials token exchange, with the token
//!   cached in the shared TTL cache
//! - `SecretStore`: OS keychain storage for the application secret

pub mod credentials;
pub mod token;

pub use credentials::SecretStore;
pub use token::{AccessToken, CredentialManager};
