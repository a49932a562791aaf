//! ATS (applicant tracking) provider: applications, offers, jobs and
//! interview stages.
//!
//! ## Wire format
//!
//! Every call is `POST /{resource}.list` with a JSON body carrying `limit`
//! and, after the first page, `cursor`. Responses use the cursor envelope
//! `{"results":[...],"moreDataAvailable":bool,"nextCursor":"..."}`.
//! Authentication is HTTP basic with the API key as user name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{de_id, de_opt_id, de_timestamp, parse_items};
use crate::error::Result;
use crate::http::{Auth, ClientConfig, RateLimitedClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtsStage {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtsJob {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsApplication {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub job: Option<IdRef>,
    #[serde(default)]
    pub current_interview_stage: Option<AtsStage>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AtsApplication {
    pub fn job_id(&self) -> Option<&str> {
        self.job.as_ref().map(|j| j.id.as_str())
    }

    pub fn stage_id(&self) -> Option<&str> {
        self.current_interview_stage.as_ref().map(|s| s.id.as_str())
    }

    /// Last update time, falling back to creation time.
    pub fn activity_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }

    pub fn is_hired(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("hired")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsOffer {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub application_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub offer_status: Option<String>,
    #[serde(default)]
    pub acceptance_status: Option<String>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AtsOffer {
    pub fn activity_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }

    /// Status strings worth inspecting, most specific first.
    pub fn statuses(&self) -> impl Iterator<Item = &str> {
        self.acceptance_status
            .as_deref()
            .into_iter()
            .chain(self.offer_status.as_deref())
    }
}

/// Read access to the ATS. Implemented over HTTP by [`AtsClient`].
#[async_trait]
pub trait AtsApi: Send {
    async fn list_applications(&mut self) -> Result<Vec<AtsApplication>>;
    async fn list_offers(&mut self) -> Result<Vec<AtsOffer>>;
    async fn list_jobs(&mut self) -> Result<Vec<AtsJob>>;
    async fn list_interview_stages(&mut self) -> Result<Vec<AtsStage>>;
}

#[async_trait]
impl<T: AtsApi + ?Sized> AtsApi for Box<T> {
    async fn list_applications(&mut self) -> Result<Vec<AtsApplication>> {
        (**self).list_applications().await
    }

    async fn list_offers(&mut self) -> Result<Vec<AtsOffer>> {
        (**self).list_offers().await
    }

    async fn list_jobs(&mut self) -> Result<Vec<AtsJob>> {
        (**self).list_jobs().await
    }

    async fn list_interview_stages(&mut self) -> Result<Vec<AtsStage>> {
        (**self).list_interview_stages().await
    }
}

pub struct AtsClient {
    inner: RateLimitedClient,
}

impl AtsClient {
    pub fn new(config: ClientConfig, api_key: &str) -> Self {
        let auth = Auth::Basic {
            user: api_key.to_string(),
        };
        Self {
            inner: RateLimitedClient::new(config, auth),
        }
    }
}

#[async_trait]
impl AtsApi for AtsClient {
    async fn list_applications(&mut self) -> Result<Vec<AtsApplication>> {
        let items = self.inner.post_all_cursor("application.list", &json!({})).await?;
        Ok(parse_items(items, "ats applications"))
    }

    async fn list_offers(&mut self) -> Result<Vec<AtsOffer>> {
        let items = self.inner.post_all_cursor("offer.list", &json!({})).await?;
        Ok(parse_items(items, "ats offers"))
    }

    async fn list_jobs(&mut self) -> Result<Vec<AtsJob>> {
        let items = self.inner.post_all_cursor("job.list", &json!({})).await?;
        Ok(parse_items(items, "ats jobs"))
    }

    async fn list_interview_stages(&mut self) -> Result<Vec<AtsStage>> {
        let items = self.inner.post_all_cursor("interviewStage.list", &json!({})).await?;
        Ok(parse_items(items, "ats interview stages"))
    }
}
