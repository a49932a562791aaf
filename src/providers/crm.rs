//! CRM (outreach) provider: projects, their candidates, and candidate
//! activity events.
//!
//! ## Wire format
//!
//! - `GET /projects`
//! - `GET /projects/{id}/candidates`
//! - `GET /candidates/{id}/events`
//!
//! All three are page-number paginated via the `X-Pagination` header and
//! authenticate with an `X-API-Key` header.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{de_id, de_timestamp, parse_items};
use crate::error::Result;
use crate::http::{Auth, ClientConfig, RateLimitedClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmProject {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmCandidate {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
}

/// One activity event on a candidate, e.g. `{"type":"replied","created_at":1760000000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmEvent {
    #[serde(default, deserialize_with = "super::de_opt_id")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Read access to the CRM. Implemented over HTTP by [`CrmClient`].
#[async_trait]
pub trait CrmApi: Send {
    async fn list_projects(&mut self) -> Result<Vec<CrmProject>>;
    async fn list_candidates(&mut self, project_id: &str) -> Result<Vec<CrmCandidate>>;
    async fn list_events(&mut self, candidate_id: &str) -> Result<Vec<CrmEvent>>;
}

#[async_trait]
impl<T: CrmApi + ?Sized> CrmApi for Box<T> {
    async fn list_projects(&mut self) -> Result<Vec<CrmProject>> {
        (**self).list_projects().await
    }

    async fn list_candidates(&mut self, project_id: &str) -> Result<Vec<CrmCandidate>> {
        (**self).list_candidates(project_id).await
    }

    async fn list_events(&mut self, candidate_id: &str) -> Result<Vec<CrmEvent>> {
        (**self).list_events(candidate_id).await
    }
}

pub struct CrmClient {
    inner: RateLimitedClient,
}

impl CrmClient {
    pub const API_KEY_HEADER: &'static str = "X-API-Key";

    pub fn new(config: ClientConfig, api_key: &str) -> Self {
        let auth = Auth::ApiKeyHeader {
            header: Self::API_KEY_HEADER.to_string(),
            key: api_key.to_string(),
        };
        Self {
            inner: RateLimitedClient::new(config, auth),
        }
    }
}

#[async_trait]
impl CrmApi for CrmClient {
    async fn list_projects(&mut self) -> Result<Vec<CrmProject>> {
        let items = self.inner.get_all_pages("projects", &[]).await?;
        Ok(parse_items(items, "crm projects"))
    }

    async fn list_candidates(&mut self, project_id: &str) -> Result<Vec<CrmCandidate>> {
        let endpoint = format!("projects/{project_id}/candidates");
        let items = self.inner.get_all_pages(&endpoint, &[]).await?;
        Ok(parse_items(items, "crm candidates"))
    }

    async fn list_events(&mut self, candidate_id: &str) -> Result<Vec<CrmEvent>> {
        let endpoint = format!("candidates/{candidate_id}/events");
        let items = self.inner.get_all_pages(&endpoint, &[]).await?;
        Ok(parse_items(items, "crm events"))
    }
}
