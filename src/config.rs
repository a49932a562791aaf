//! # Configuration
//!
//! TOML file read by the CLI. Every section and field is optional; missing
//! values fall back to the defaults documented on each type.
//!
//! ```toml
//! [crm]
//! base_url = "https://api.crm.example/v0"
//! min_interval_ms = 4000
//!
//! [ats]
//! page_size = 100
//!
//! [sync]
//! cache_ttl_secs = 3600
//!
//! [mappings.crm_projects]
//! "1042" = "Backend Engineer"
//!
//! [[roles]]
//! name = "Backend Engineer"
//! monthly_hire_target = 2
//! ```
//!
//! Credentials are not read from this file. The CLI takes them from the
//! environment and writes them into the key-value store.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::StageClass;
use crate::error::{FunnelError, Result};
use crate::funnel::Role;
use crate::http::ClientConfig;
use crate::providers::{HttpApiFactory, RoleMapping};

pub const DEFAULT_CRM_BASE_URL: &str = "https://api.crm.example/v0";
pub const DEFAULT_ATS_BASE_URL: &str = "https://api.ats.example";

/// HTTP settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSettings {
    pub base_url: String,
    pub min_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_after_fallback_secs: u64,
    pub backoff_secs: u64,
    pub max_retry_delay_secs: u64,
    pub page_size: u32,
}

impl ProviderSettings {
    /// - min_interval_ms: `min_interval_ms`
    /// - request_timeout_secs: 30
    /// - max_attempts: 3
    /// - retry_after_fallback_secs: 10
    /// - backoff_secs: 2
    /// - max_retry_delay_secs: 60
    /// - page_size: 100
    pub fn new(base_url: impl Into<String>, min_interval_ms: u64) -> Self {
        Self {
            base_url: base_url.into(),
            min_interval_ms,
            request_timeout_secs: 30,
            max_attempts: 3,
            retry_after_fallback_secs: 10,
            backoff_secs: 2,
            max_retry_delay_secs: 60,
            page_size: 100,
        }
    }

    pub fn crm() -> Self {
        Self::new(DEFAULT_CRM_BASE_URL, 4000)
    }

    pub fn ats() -> Self {
        Self::new(DEFAULT_ATS_BASE_URL, 1000)
    }

    pub fn client_config(&self, provider: &str) -> ClientConfig {
        ClientConfig {
            provider: provider.to_string(),
            base_url: self.base_url.clone(),
            min_interval: Duration::from_millis(self.min_interval_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_attempts: self.max_attempts.max(1),
            retry_after_fallback: Duration::from_secs(self.retry_after_fallback_secs),
            backoff: Duration::from_secs(self.backoff_secs),
            max_retry_delay: Duration::from_secs(self.max_retry_delay_secs),
            page_size: self.page_size.max(1),
        }
    }
}

/// A `[crm]` / `[ats]` table as written; absent keys keep the provider's
/// own defaults, which differ between providers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ProviderOverrides {
    base_url: Option<String>,
    min_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    retry_after_fallback_secs: Option<u64>,
    backoff_secs: Option<u64>,
    max_retry_delay_secs: Option<u64>,
    page_size: Option<u32>,
}

impl ProviderOverrides {
    fn apply(self, mut base: ProviderSettings) -> ProviderSettings {
        if let Some(v) = self.base_url {
            base.base_url = v;
        }
        if let Some(v) = self.min_interval_ms {
            base.min_interval_ms = v;
        }
        if let Some(v) = self.request_timeout_secs {
            base.request_timeout_secs = v;
        }
        if let Some(v) = self.max_attempts {
            base.max_attempts = v;
        }
        if let Some(v) = self.retry_after_fallback_secs {
            base.retry_after_fallback_secs = v;
        }
        if let Some(v) = self.backoff_secs {
            base.backoff_secs = v;
        }
        if let Some(v) = self.max_retry_delay_secs {
            base.max_retry_delay_secs = v;
        }
        if let Some(v) = self.page_size {
            base.page_size = v;
        }
        base
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Age at which a cached provider payload is refetched.
    pub cache_ttl_secs: u64,
    pub calendar_connected: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            calendar_connected: false,
        }
    }
}

impl SyncSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Provider-side ids assigned to roles and stage classes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingSettings {
    pub crm_projects: RoleMapping,
    pub ats_jobs: RoleMapping,
    pub ats_stages: BTreeMap<String, StageClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct Config {
    pub crm: ProviderSettings,
    pub ats: ProviderSettings,
    pub sync: SyncSettings,
    pub mappings: MappingSettings,
    pub roles: Vec<Role>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    crm: ProviderOverrides,
    ats: ProviderOverrides,
    sync: SyncSettings,
    mappings: MappingSettings,
    roles: Vec<Role>,
}

impl From<RawConfig> for Config {
    fn from(raw: RawConfig) -> Self {
        Self {
            crm: raw.crm.apply(ProviderSettings::crm()),
            ats: raw.ats.apply(ProviderSettings::ats()),
            sync: raw.sync,
            mappings: raw.mappings,
            roles: raw.roles,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crm: ProviderSettings::crm(),
            ats: ProviderSettings::ats(),
            sync: SyncSettings::default(),
            mappings: MappingSettings::default(),
            roles: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(|e| FunnelError::ConfigFile(e.to_string()))?;
        for role in &config.roles {
            if role.monthly_hire_target == 0 {
                return Err(FunnelError::ConfigFile(format!(
                    "role {:?}: monthly_hire_target must be at least 1",
                    role.name
                )));
            }
            role.rates.validate()?;
        }
        Ok(config)
    }

    /// Read and parse `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FunnelError::ConfigFile(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn api_factory(&self) -> HttpApiFactory {
        HttpApiFactory {
            crm: self.crm.client_config("crm"),
            ats: self.ats.client_config("ats"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.crm.base_url, DEFAULT_CRM_BASE_URL);
        assert_eq!(config.crm.min_interval_ms, 4000);
        assert_eq!(config.ats.base_url, DEFAULT_ATS_BASE_URL);
        assert_eq!(config.ats.min_interval_ms, 1000);
        assert_eq!(config.sync.cache_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [ats]
            page_size = 50

            [sync]
            calendar_connected = true

            [mappings.crm_projects]
            "1042" = "Backend"
            "1043" = "ignore"

            [mappings.ats_stages]
            s1 = "screen"
            s2 = "hired"

            [[roles]]
            name = "Backend"
            monthly_hire_target = 2
            [roles.rates]
            response_rate = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.ats.page_size, 50);
        assert_eq!(config.ats.base_url, DEFAULT_ATS_BASE_URL);
        assert_eq!(config.ats.min_interval_ms, 1000);
        assert!(config.sync.calendar_connected);
        assert_eq!(config.sync.cache_ttl_secs, 3600);
        assert_eq!(config.mappings.crm_projects.len(), 2);
        assert_eq!(config.mappings.ats_stages["s2"], StageClass::Hired);
        assert_eq!(config.roles[0].rates.response_rate, 0.2);
        assert_eq!(config.roles[0].rates.accept_rate, 0.8);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let err = Config::from_toml_str(
            r#"
            [[roles]]
            name = "Backend"
            monthly_hire_target = 1
            [roles.rates]
            offer_rate = 0.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FunnelError::InvalidRate { .. }));
    }

    #[test]
    fn test_zero_hire_target_rejected() {
        let err = Config::from_toml_str(
            r#"
            [[roles]]
            name = "Design"
            monthly_hire_target = 0
            "#,
        )
        .unwrap_err();
        match err {
            FunnelError::ConfigFile(msg) => assert!(msg.contains("Design"), "{msg}"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = Config::from_toml_str("[crm\nbase_url = 1").unwrap_err();
        assert!(matches!(err, FunnelError::ConfigFile(_)));
    }

    #[test]
    fn test_client_config_conversion() {
        let mut settings = ProviderSettings::crm();
        settings.max_attempts = 0;
        let cfg = settings.client_config("crm");
        assert_eq!(cfg.provider, "crm");
        assert_eq!(cfg.min_interval, Duration::from_secs(4));
        assert_eq!(cfg.max_attempts, 1);
        assert_eq!(cfg.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_retry_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_retry_delay_cap_override() {
        let config = Config::from_toml_str("[ats]\nmax_retry_delay_secs = 15").unwrap();
        assert_eq!(config.api_factory().ats.max_retry_delay, Duration::from_secs(15));
        assert_eq!(config.api_factory().crm.max_retry_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sync]\ncache_ttl_secs = 60").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sync.cache_ttl_secs, 60);

        let missing = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(missing, FunnelError::ConfigFile(_)));
    }
}
