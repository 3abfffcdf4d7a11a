use thiserror::Error;

use crate::config::ConfigError;

/// Failure to obtain an access token from the authorization endpoint.
///
/// Never retried by the credential manager itself.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token endpoint returned {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Network error during token exchange: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Token response did not contain an access_token")]
    MissingToken,

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by `RegionFetcher::try_fetch`.
///
/// `RegionFetcher::fetch` logs these and hands back an empty result instead.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("No endpoint configured for region {0:?}")]
    UnknownRegion(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unable to obtain access token: {0}")]
    Auth(#[from] AuthError),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to fetch data for {region} after {attempts} attempts")]
    Exhausted { region: String, attempts: u32 },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut cut = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
}

impl FetchError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = truncate_body(body);
        match status.as_u16() {
            401 => FetchError::Unauthorized,
            429 => FetchError::RateLimited,
            500..=599 => FetchError::ServerError(truncated),
            _ => FetchError::UnexpectedStatus {
                status,
                body: truncated,
            },
        }
    }

    /// Whether another round of the fetch loop may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Unauthorized
                | FetchError::RateLimited
                | FetchError::ServerError(_)
                | FetchError::UnexpectedStatus { .. }
                | FetchError::NetworkError(_)
        )
    }
}

impl AuthError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        AuthError::Rejected {
            status,
            body: truncate_body(body),
        }
    }
}
