//! Provider API seams and the adapters that turn their data into counts.
//!
//! - [`crm`]: outreach/CRM provider (page-number pagination, `X-API-Key`).
//! - [`ats`]: applicant-tracking provider (cursor pagination, basic auth).
//! - [`outreach`]: CRM activity events → outreach/response counts per role.
//! - [`pipeline`]: ATS applications and offers → screen/final/offer/hire counts.
//!
//! Adapters are generic over the [`CrmApi`] / [`AtsApi`] traits so the
//! classification logic runs unchanged against the HTTP clients or test fakes.

pub mod ats;
pub mod crm;
pub mod outreach;
pub mod pipeline;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub use ats::{AtsApi, AtsApplication, AtsClient, AtsJob, AtsOffer, AtsStage};
pub use crm::{CrmApi, CrmCandidate, CrmClient, CrmEvent, CrmProject};
pub use outreach::{OutreachAdapter, OutreachCounts};
pub use pipeline::{PipelineAdapter, PipelineCounts};

use crate::http::ClientConfig;

/// Provider-side id (project, job) → role name.
pub type RoleMapping = BTreeMap<String, String>;

/// Mapping value that explicitly excludes an id from counting.
pub const IGNORE_ROLE: &str = "ignore";

/// Role mapped to `id`, or `None` when unmapped, blank, or `"ignore"`.
pub fn mapped_role<'a>(mapping: &'a RoleMapping, id: &str) -> Option<&'a str> {
    mapping
        .get(id)
        .map(|r| r.trim())
        .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case(IGNORE_ROLE))
}

/// Every role that at least one id maps to.
pub fn mapped_roles(mapping: &RoleMapping) -> BTreeSet<String> {
    mapping
        .keys()
        .filter_map(|id| mapped_role(mapping, id))
        .map(str::to_string)
        .collect()
}

/// Builds provider API clients from credentials read at initialization.
pub trait ApiFactory: Send + Sync {
    fn crm(&self, api_key: &str) -> Box<dyn CrmApi>;
    fn ats(&self, api_key: &str) -> Box<dyn AtsApi>;
}

/// Production factory: one rate-limited HTTP client per provider.
#[derive(Debug, Clone)]
pub struct HttpApiFactory {
    pub crm: ClientConfig,
    pub ats: ClientConfig,
}

impl ApiFactory for HttpApiFactory {
    fn crm(&self, api_key: &str) -> Box<dyn CrmApi> {
        Box::new(CrmClient::new(self.crm.clone(), api_key))
    }

    fn ats(&self, api_key: &str) -> Box<dyn AtsApi> {
        Box::new(AtsClient::new(self.ats.clone(), api_key))
    }
}

/// Deserialize each item, dropping (and logging) the ones that don't fit.
pub(crate) fn parse_items<T: DeserializeOwned>(items: Vec<Value>, what: &str) -> Vec<T> {
    let total = items.len();
    let parsed: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(target: "funnel_sync::providers", what, error = %e, "skipping malformed item");
                None
            }
        })
        .collect();
    if parsed.len() < total {
        tracing::warn!(
            target: "funnel_sync::providers",
            what,
            skipped = total - parsed.len(),
            "some provider items could not be parsed"
        );
    }
    parsed
}

// ---------------------------------------------------------------------------
// Lenient field deserializers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Str(s) => s,
            RawId::Int(n) => n.to_string(),
        }
    }
}

/// Ids arrive as strings or integers depending on the provider.
pub(crate) fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

pub(crate) fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(String::from))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Number(f64),
    Text(String),
}

/// Unix seconds (or milliseconds when implausibly large) or RFC 3339 text.
/// Unparsable values become `None` rather than failing the whole item.
pub(crate) fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<RawTimestamp>::deserialize(d)?;
    Ok(raw.and_then(|r| match r {
        RawTimestamp::Number(n) if n > 1e12 => Utc.timestamp_millis_opt(n as i64).single(),
        RawTimestamp::Number(n) => Utc.timestamp_opt(n as i64, 0).single(),
        RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "de_id")]
        id: String,
        #[serde(default, deserialize_with = "de_timestamp")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_mapped_role_skips_ignore_and_blank() {
        let mut m = RoleMapping::new();
        m.insert("p1".into(), "Backend".into());
        m.insert("p2".into(), "ignore".into());
        m.insert("p3".into(), "IGNORE".into());
        m.insert("p4".into(), "  ".into());
        assert_eq!(mapped_role(&m, "p1"), Some("Backend"));
        assert_eq!(mapped_role(&m, "p2"), None);
        assert_eq!(mapped_role(&m, "p3"), None);
        assert_eq!(mapped_role(&m, "p4"), None);
        assert_eq!(mapped_role(&m, "missing"), None);
        assert_eq!(mapped_roles(&m).into_iter().collect::<Vec<_>>(), vec!["Backend".to_string()]);
    }

    #[test]
    fn test_de_id_accepts_numbers() {
        let p: Probe = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(p.id, "42");
        assert!(p.at.is_none());
    }

    #[test]
    fn test_de_timestamp_formats() {
        let secs: Probe = serde_json::from_str(r#"{"id":"a","at":1760000000}"#).unwrap();
        let millis: Probe = serde_json::from_str(r#"{"id":"a","at":1760000000000}"#).unwrap();
        let text: Probe = serde_json::from_str(r#"{"id":"a","at":"2025-10-09T08:53:20Z"}"#).unwrap();
        assert_eq!(secs.at, millis.at);
        assert_eq!(secs.at, text.at);

        let junk: Probe = serde_json::from_str(r#"{"id":"a","at":"yesterday"}"#).unwrap();
        assert!(junk.at.is_none());
        let null: Probe = serde_json::from_str(r#"{"id":"a","at":null}"#).unwrap();
        assert!(null.at.is_none());
    }

    #[test]
    fn test_parse_items_drops_malformed() {
        let items = vec![serde_json::json!({"id": "ok"}), serde_json::json!({"nope": 1})];
        let parsed: Vec<CrmCandidate> = parse_items(items, "candidates");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, "ok");
    }
}
