//! Authenticated, spaced, retrying JSON client for one provider.

use std::time::Duration;

use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::paginate::{page_items, CursorPage, PageMeta};
use super::rate_limit::IntervalGuard;
use crate::error::{FunnelError, Result};

/// How requests authenticate.
#[derive(Clone)]
pub enum Auth {
    /// Static key in a named header, e.g. `X-API-Key`.
    ApiKeyHeader { header: String, key: String },
    /// HTTP basic auth with the key as user name and an empty password.
    Basic { user: String },
    Bearer(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secrets.
        match self {
            Auth::ApiKeyHeader { header, .. } => write!(f, "ApiKeyHeader({header})"),
            Auth::Basic { .. } => write!(f, "Basic"),
            Auth::Bearer(_) => write!(f, "Bearer"),
        }
    }
}

/// Per-provider client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Provider label used in errors and logs.
    pub provider: String,
    pub base_url: String,
    pub min_interval: Duration,
    /// Wall-clock bound for one attempt (send + body).
    pub request_timeout: Duration,
    /// Total attempts per call, first try included.
    pub max_attempts: u32,
    /// Delay after a 429 without a usable `Retry-After`.
    pub retry_after_fallback: Duration,
    /// Delay after a timeout or transport error.
    pub backoff: Duration,
    /// Upper bound on any retry delay, including provider `Retry-After` hints.
    pub max_retry_delay: Duration,
    pub page_size: u32,
}

impl ClientConfig {
    /// - min_interval: 4 s
    /// - request_timeout: 30 s
    /// - max_attempts: 3
    /// - retry_after_fallback: 10 s
    /// - backoff: 2 s
    /// - max_retry_delay: 60 s
    /// - page_size: 100
    pub fn new(provider: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into(),
            min_interval: Duration::from_secs(4),
            request_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_after_fallback: Duration::from_secs(10),
            backoff: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(60),
            page_size: 100,
        }
    }
}

/// A successful response: parsed JSON body plus page-number metadata when
/// the provider sent an `X-Pagination` header.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: Value,
    pub page: Option<PageMeta>,
}

pub struct RateLimitedClient {
    config: ClientConfig,
    auth: Auth,
    http: reqwest::Client,
    guard: IntervalGuard,
}

impl RateLimitedClient {
    pub fn new(config: ClientConfig, auth: Auth) -> Self {
        // Falls back to a default client instead of panicking in odd environments.
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        let guard = IntervalGuard::new(config.min_interval);
        Self {
            config,
            auth,
            http,
            guard,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// POST `body` as JSON to `endpoint` and return the parsed response.
    pub async fn request(&mut self, endpoint: &str, body: &Value) -> Result<Value> {
        let resp = self.execute(Method::POST, endpoint, &[], Some(body)).await?;
        Ok(resp.body)
    }

    pub async fn get(&mut self, endpoint: &str, query: &[(String, String)]) -> Result<ApiResponse> {
        self.execute(Method::GET, endpoint, query, None).await
    }

    /// GET every page of a page-number endpoint and return all items.
    ///
    /// Stops on the first page whose metadata shows no further page, or
    /// whose metadata is missing.
    pub async fn get_all_pages(&mut self, endpoint: &str, query: &[(String, String)]) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;
        loop {
            let mut q = query.to_vec();
            q.push(("page".to_string(), page.to_string()));
            q.push(("page_size".to_string(), self.config.page_size.to_string()));
            let resp = self.get(endpoint, &q).await?;
            items.extend(page_items(resp.body));
            match resp.page {
                Some(meta) if page < meta.last_page => page += 1,
                _ => break,
            }
        }
        debug!(
            target: "funnel_sync::http",
            provider = %self.config.provider,
            endpoint,
            pages = page,
            items = items.len(),
            "page-number traversal complete"
        );
        Ok(items)
    }

    /// POST a cursor-paginated endpoint until the provider reports no more
    /// data. `base_body` fields are sent on every page alongside `limit`
    /// and `cursor`.
    pub async fn post_all_cursor(&mut self, endpoint: &str, base_body: &Value) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;
        loop {
            let mut body: Map<String, Value> = base_body.as_object().cloned().unwrap_or_default();
            body.insert("limit".into(), Value::from(self.config.page_size));
            if let Some(c) = &cursor {
                body.insert("cursor".into(), Value::String(c.clone()));
            }
            let raw = self.request(endpoint, &Value::Object(body)).await?;
            pages += 1;
            let page: CursorPage = serde_json::from_value(raw).map_err(|e| FunnelError::Provider {
                provider: self.config.provider.clone(),
                detail: format!("malformed page from {endpoint}: {e}"),
            })?;
            let next = page.next().map(str::to_owned);
            items.extend(page.results);
            match next {
                Some(c) if cursor.as_deref() == Some(c.as_str()) => {
                    warn!(
                        target: "funnel_sync::http",
                        provider = %self.config.provider,
                        endpoint,
                        cursor = %c,
                        "provider repeated its cursor, stopping pagination"
                    );
                    break;
                }
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        debug!(
            target: "funnel_sync::http",
            provider = %self.config.provider,
            endpoint,
            pages,
            items = items.len(),
            "cursor traversal complete"
        );
        Ok(items)
    }

    async fn execute(
        &mut self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_err: Option<FunnelError> = None;

        for attempt in 1..=max_attempts {
            self.guard.wait().await;
            let outcome = self.attempt(method.clone(), endpoint, query, body).await;
            self.guard.mark_finished();

            match outcome {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => {
                    if attempt < max_attempts {
                        let delay = self.retry_delay(&e);
                        warn!(
                            target: "funnel_sync::http",
                            provider = %self.config.provider,
                            endpoint,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retryable provider failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let detail = match last_err {
            Some(e) => format!("gave up on {endpoint} after {max_attempts} attempts: {e}"),
            None => format!("gave up on {endpoint} after {max_attempts} attempts"),
        };
        error!(
            target: "funnel_sync::http",
            provider = %self.config.provider,
            endpoint,
            "{detail}"
        );
        Err(FunnelError::Provider {
            provider: self.config.provider.clone(),
            detail,
        })
    }

    fn retry_delay(&self, err: &FunnelError) -> Duration {
        let delay = match err {
            FunnelError::RateLimited { retry_after, .. } => {
                retry_after.unwrap_or(self.config.retry_after_fallback)
            }
            _ => self.config.backoff,
        };
        delay.min(self.config.max_retry_delay)
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// One bounded attempt. Classifies the outcome into the error taxonomy.
    async fn attempt(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.url(endpoint);
        let mut req = self.http.request(method, &url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(b) = body {
            req = req.json(b);
        }
        req = match &self.auth {
            Auth::ApiKeyHeader { header, key } => req.header(header.as_str(), key.as_str()),
            Auth::Basic { user } => req.basic_auth(user, Some("")),
            Auth::Bearer(token) => req.bearer_auth(token),
        };

        let provider = self.config.provider.as_str();
        let call = async {
            let resp = req.send().await.map_err(|e| transport_error(&url, e))?;
            let status = resp.status();

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(FunnelError::Auth {
                    provider: provider.to_string(),
                    status: status.as_u16(),
                });
            }
            if status.as_u16() == 429 {
                let retry_after = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                return Err(FunnelError::RateLimited {
                    provider: provider.to_string(),
                    retry_after,
                });
            }
            if !status.is_success() {
                return Err(FunnelError::Provider {
                    provider: provider.to_string(),
                    detail: format!("HTTP {} from {url}", status.as_u16()),
                });
            }

            let page = resp
                .headers()
                .get(PageMeta::HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(PageMeta::from_header);

            let bytes = resp.bytes().await.map_err(|e| transport_error(&url, e))?;
            let body: Value = if bytes.iter().all(u8::is_ascii_whitespace) {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).map_err(|e| FunnelError::Provider {
                    provider: provider.to_string(),
                    detail: format!("invalid JSON from {url}: {e}"),
                })?
            };

            if body.get("success").and_then(Value::as_bool) == Some(false) {
                let errors = body.get("errors").map(|e| e.to_string()).unwrap_or_default();
                return Err(FunnelError::Provider {
                    provider: provider.to_string(),
                    detail: format!("request to {url} unsuccessful {errors}").trim_end().to_string(),
                });
            }

            Ok(ApiResponse { body, page })
        };

        let bounded = tokio::time::timeout(self.config.request_timeout, call).await;
        match bounded {
            Ok(result) => result,
            Err(_) => Err(FunnelError::Timeout {
                url,
                after: self.config.request_timeout,
            }),
        }
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> FunnelError {
    if e.is_timeout() {
        FunnelError::Timeout {
            url: url.to_string(),
            after: Duration::ZERO,
        }
    } else {
        FunnelError::Network {
            url: url.to_string(),
            detail: e.to_string(),
        }
    }
}

/// Delay-seconds form only; HTTP-date values and seconds too large for a
/// `Duration` fall back to the fixed delay.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 1.5 "), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2026 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after("NaN"), None);
    }

    #[test]
    fn test_parse_retry_after_huge_values_do_not_panic() {
        assert_eq!(parse_retry_after("1e30"), None);
        assert_eq!(parse_retry_after("inf"), None);
        let digits = "9".repeat(40);
        assert_eq!(parse_retry_after(&digits), None);
        // Large but representable values parse and are clamped later.
        assert_eq!(parse_retry_after("86400"), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn test_retry_delay_capped() {
        let mut cfg = ClientConfig::new("crm", "http://x");
        cfg.max_retry_delay = Duration::from_secs(5);
        let client = RateLimitedClient::new(cfg, Auth::Bearer("t".into()));
        let hinted = FunnelError::RateLimited { provider: "crm".into(), retry_after: Some(Duration::from_secs(86_400)) };
        assert_eq!(client.retry_delay(&hinted), Duration::from_secs(5));
    }

    #[test]
    fn test_client_config_defaults() {
        let cfg = ClientConfig::new("crm", "https://api.example");
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.min_interval, Duration::from_secs(4));
        assert_eq!(cfg.page_size, 100);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = RateLimitedClient::new(
            ClientConfig::new("ats", "https://api.example/"),
            Auth::Bearer("t".into()),
        );
        assert_eq!(client.url("/job.list"), "https://api.example/job.list");
        assert_eq!(client.url("job.list"), "https://api.example/job.list");
    }

    #[test]
    fn test_retry_delay_prefers_retry_after() {
        let client = RateLimitedClient::new(ClientConfig::new("crm", "http://x"), Auth::Bearer("t".into()));
        let hinted = FunnelError::RateLimited { provider: "crm".into(), retry_after: Some(Duration::from_secs(3)) };
        let bare = FunnelError::RateLimited { provider: "crm".into(), retry_after: None };
        let net = FunnelError::Network { url: "x".into(), detail: "reset".into() };
        assert_eq!(client.retry_delay(&hinted), Duration::from_secs(3));
        assert_eq!(client.retry_delay(&bare), Duration::from_secs(10));
        assert_eq!(client.retry_delay(&net), Duration::from_secs(2));
    }

    #[test]
    fn test_auth_debug_hides_secret() {
        let auth = Auth::ApiKeyHeader { header: "X-API-Key".into(), key: "s3cret".into() };
        assert!(!format!("{auth:?}").contains("s3cret"));
        assert!(!format!("{:?}", Auth::Bearer("tok".into())).contains("tok"));
    }
}
