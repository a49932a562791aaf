//! Crate-level error type.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants
//! follow the failure taxonomy of the sync pipeline:
//!
//! | Variant         | Raised by            | Retried by the HTTP client |
//! |-----------------|----------------------|----------------------------|
//! | `Auth`          | 401 / 403            | no                         |
//! | `RateLimited`   | 429                  | yes (Retry-After)          |
//! | `Timeout`       | per-attempt deadline | yes (fixed backoff)        |
//! | `Network`       | transport failure    | yes (fixed backoff)        |
//! | `Provider`      | other status / exhausted retries | no             |
//! | `Configuration` | no mappings          | never reaches HTTP         |

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    /// Credentials were rejected. Never retried.
    #[error("{provider}: authentication rejected (HTTP {status})")]
    Auth { provider: String, status: u16 },

    /// The provider throttled the request.
    #[error("{provider}: rate limited (retry after {retry_after:?})")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// One attempt exceeded its wall-clock bound.
    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    /// Transport-level failure (DNS, connect, reset, truncated body).
    #[error("network error on {url}: {detail}")]
    Network { url: String, detail: String },

    /// Terminal provider failure: unexpected status or retries exhausted.
    #[error("{provider}: {detail}")]
    Provider { provider: String, detail: String },

    /// Nothing is mapped for this provider, so there is nothing to fetch.
    #[error("not configured: {0}")]
    Configuration(String),

    #[error("invalid {stage} conversion rate {value}: must be in (0, 1]")]
    InvalidRate { stage: &'static str, value: f64 },

    #[error("store error: {0}")]
    Store(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    ConfigFile(String),
}

impl FunnelError {
    /// Whether the HTTP client should spend another attempt on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FunnelError::RateLimited { .. } | FunnelError::Timeout { .. } | FunnelError::Network { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, FunnelError::Auth { .. })
    }
}

impl From<rusqlite::Error> for FunnelError {
    fn from(e: rusqlite::Error) -> Self {
        FunnelError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FunnelError>;
