//! Pipeline adapter: ATS applications and offers → per-role screen, final,
//! offer and hire counts.
//!
//! ## What It Does
//! 1. Lists every application, keeps those updated (or created) inside the
//!    range whose job maps to a role, and buckets each by the class of its
//!    current interview stage. A failed listing fails the whole pass so the
//!    caller falls back to cached or prior counts.
//! 2. Counts a hire at most once per application: the stage class says
//!    hired, or the application status does.
//! 3. Lists offers, keeps in-range offers whose most specific recognised
//!    status is active, approved, sent or accepted, and reconciles them with
//!    the stage-based offers as `max(stage, status)` per role. A failed offer
//!    listing leaves the stage-based offers alone.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ats::{AtsApi, AtsApplication, AtsJob, AtsOffer};
use super::{mapped_role, mapped_roles, RoleMapping};
use crate::calendar::DateRange;
use crate::classify::{classify_stage_name, RuleTable, StageClass};
use crate::error::{FunnelError, Result};
use crate::record::RoleCounts;

/// Stage id → funnel bucket.
pub type StageClasses = BTreeMap<String, StageClass>;

/// Offer status terms; negative terms come first so "inactive" or
/// "declined" never read as live offers.
static OFFER_STATUS_RULES: Lazy<RuleTable<bool>> = Lazy::new(|| {
    RuleTable::new([
        ("inactive", false),
        ("declined", false),
        ("rejected", false),
        ("cancelled", false),
        ("canceled", false),
        ("rescinded", false),
        ("withdrawn", false),
        ("active", true),
        ("approved", true),
        ("sent", true),
        ("accepted", true),
    ])
});

/// Verdict of the most specific status that any rule recognises, so a
/// declined acceptance overrides a sent offer.
fn is_live_offer(offer: &AtsOffer) -> bool {
    offer
        .statuses()
        .find_map(|s| OFFER_STATUS_RULES.classify(s))
        .unwrap_or(false)
}

/// Adapter output; also the cached payload for the ATS provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCounts {
    pub screens: RoleCounts,
    pub finals: RoleCounts,
    pub offers: RoleCounts,
    pub hires: RoleCounts,
}

fn bump(counts: &mut RoleCounts, role: &str) {
    *counts.entry(role.to_string()).or_insert(0) += 1;
}

pub struct PipelineAdapter<A> {
    api: A,
}

impl<A: AtsApi> PipelineAdapter<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    /// Jobs available for mapping; empty when the listing fails.
    pub async fn jobs(&mut self) -> Vec<AtsJob> {
        match self.api.list_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(target: "funnel_sync::pipeline", error = %e, "listing jobs failed");
                Vec::new()
            }
        }
    }

    /// Heuristic class for every interview stage, keyed by stage id.
    pub async fn suggest_stage_classes(&mut self) -> StageClasses {
        match self.api.list_interview_stages().await {
            Ok(stages) => stages
                .into_iter()
                .map(|s| {
                    let class = classify_stage_name(&s.title);
                    (s.id, class)
                })
                .collect(),
            Err(e) => {
                warn!(target: "funnel_sync::pipeline", error = %e, "listing interview stages failed");
                StageClasses::new()
            }
        }
    }

    pub async fn count_pipeline(
        &mut self,
        job_roles: &RoleMapping,
        stage_classes: &StageClasses,
        range: &DateRange,
    ) -> Result<PipelineCounts> {
        let roles = mapped_roles(job_roles);
        if roles.is_empty() {
            return Err(FunnelError::Configuration("no ATS jobs are mapped to roles".to_string()));
        }

        let mut counts = PipelineCounts::default();
        for role in &roles {
            for bucket in [&mut counts.screens, &mut counts.finals, &mut counts.offers, &mut counts.hires] {
                bucket.insert(role.clone(), 0);
            }
        }

        let applications = self.fetch_applications().await?;
        // Offers may omit their job; resolve through the application instead.
        let job_by_application: HashMap<&str, &str> = applications
            .iter()
            .filter_map(|a| a.job_id().map(|j| (a.id.as_str(), j)))
            .collect();

        let mut in_range = 0usize;
        for app in &applications {
            if !app.activity_at().is_some_and(|t| range.contains(t)) {
                continue;
            }
            let Some(role) = app.job_id().and_then(|j| mapped_role(job_roles, j)) else {
                continue;
            };
            in_range += 1;

            let class = app
                .stage_id()
                .and_then(|s| stage_classes.get(s))
                .copied()
                .unwrap_or(StageClass::Ignore);
            match class {
                StageClass::Screen => bump(&mut counts.screens, role),
                StageClass::Final => bump(&mut counts.finals, role),
                StageClass::Offer => bump(&mut counts.offers, role),
                StageClass::Hired => bump(&mut counts.hires, role),
                StageClass::Ignore => {}
            }
            if class != StageClass::Hired && app.is_hired() {
                bump(&mut counts.hires, role);
            }
        }

        let offers = self.fetch_offers().await?;
        let mut status_offers = RoleCounts::new();
        for offer in &offers {
            if !offer.activity_at().is_some_and(|t| range.contains(t)) || !is_live_offer(offer) {
                continue;
            }
            let job = offer.job_id.as_deref().or_else(|| {
                offer
                    .application_id
                    .as_deref()
                    .and_then(|a| job_by_application.get(a).copied())
            });
            if let Some(role) = job.and_then(|j| mapped_role(job_roles, j)) {
                bump(&mut status_offers, role);
            }
        }
        for (role, n) in status_offers {
            let slot = counts.offers.entry(role).or_insert(0);
            *slot = (*slot).max(n);
        }

        info!(
            target: "funnel_sync::pipeline",
            applications = applications.len(),
            in_range,
            offers = offers.len(),
            screens = counts.screens.values().sum::<u32>(),
            finals = counts.finals.values().sum::<u32>(),
            hires = counts.hires.values().sum::<u32>(),
            "pipeline counted"
        );
        Ok(counts)
    }

    /// Never degraded: every count derives from this listing.
    async fn fetch_applications(&mut self) -> Result<Vec<AtsApplication>> {
        self.api.list_applications().await.map_err(|e| {
            warn!(target: "funnel_sync::pipeline", error = %e, "application fetch failed");
            e
        })
    }

    async fn fetch_offers(&mut self) -> Result<Vec<AtsOffer>> {
        match self.api.list_offers().await {
            Ok(offers) => Ok(offers),
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                warn!(target: "funnel_sync::pipeline", error = %e, "offer fetch failed, using stage offers only");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ats::AtsStage;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[derive(Default)]
    struct FakeAts {
        applications: Vec<AtsApplication>,
        offers: Vec<AtsOffer>,
        stages: Vec<AtsStage>,
        offers_fail: bool,
        applications_fail: bool,
        auth_fail: bool,
    }

    #[async_trait]
    impl AtsApi for FakeAts {
        async fn list_applications(&mut self) -> Result<Vec<AtsApplication>> {
            if self.auth_fail {
                return Err(FunnelError::Auth { provider: "ats".into(), status: 403 });
            }
            if self.applications_fail {
                return Err(FunnelError::Provider { provider: "ats".into(), detail: "HTTP 503 from application.list".into() });
            }
            Ok(self.applications.clone())
        }

        async fn list_offers(&mut self) -> Result<Vec<AtsOffer>> {
            if self.offers_fail {
                return Err(FunnelError::Timeout { url: "offer.list".into(), after: std::time::Duration::from_secs(30) });
            }
            Ok(self.offers.clone())
        }

        async fn list_jobs(&mut self) -> Result<Vec<AtsJob>> {
            Err(FunnelError::Network { url: "job.list".into(), detail: "reset".into() })
        }

        async fn list_interview_stages(&mut self) -> Result<Vec<AtsStage>> {
            Ok(self.stages.clone())
        }
    }

    fn app(id: &str, job: &str, stage: &str, status: &str, day: u32) -> AtsApplication {
        serde_json::from_value(json!({
            "id": id,
            "status": status,
            "job": {"id": job},
            "currentInterviewStage": {"id": stage, "title": stage},
            "updatedAt": format!("2026-10-{day:02}T12:00:00Z"),
        }))
        .unwrap()
    }

    fn offer(id: &str, application: &str, status: &str, day: u32) -> AtsOffer {
        serde_json::from_value(json!({
            "id": id,
            "applicationId": application,
            "offerStatus": status,
            "createdAt": format!("2026-10-{day:02}T12:00:00Z"),
        }))
        .unwrap()
    }

    fn october() -> DateRange {
        crate::calendar::month_range(Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap())
    }

    fn jobs() -> RoleMapping {
        [("j1", "Backend"), ("j2", "Design"), ("j3", "ignore")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn stages() -> StageClasses {
        [
            ("s-screen", StageClass::Screen),
            ("s-final", StageClass::Final),
            ("s-offer", StageClass::Offer),
            ("s-hired", StageClass::Hired),
            ("s-archived", StageClass::Ignore),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[tokio::test]
    async fn test_buckets_by_current_stage() {
        let api = FakeAts {
            applications: vec![
                app("a1", "j1", "s-screen", "Active", 3),
                app("a2", "j1", "s-screen", "Active", 4),
                app("a3", "j1", "s-final", "Active", 5),
                app("a4", "j2", "s-offer", "Active", 6),
                app("a5", "j3", "s-screen", "Active", 6),
                app("a6", "j1", "s-unknown", "Active", 7),
            ],
            ..Default::default()
        };
        let counts = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap();
        assert_eq!(counts.screens["Backend"], 2);
        assert_eq!(counts.finals["Backend"], 1);
        assert_eq!(counts.offers["Design"], 1);
        assert_eq!(counts.screens["Design"], 0);
        assert_eq!(counts.hires["Backend"], 0);
        assert!(!counts.screens.contains_key("ignore"));
    }

    #[tokio::test]
    async fn test_hire_counted_once_per_application() {
        let api = FakeAts {
            applications: vec![
                app("a1", "j1", "s-hired", "Hired", 3),
                app("a2", "j1", "s-archived", "Hired", 4),
                app("a3", "j1", "s-hired", "Active", 5),
            ],
            ..Default::default()
        };
        let counts = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap();
        assert_eq!(counts.hires["Backend"], 3);
    }

    #[tokio::test]
    async fn test_out_of_range_applications_skipped() {
        let mut old = app("a1", "j1", "s-screen", "Active", 3);
        old.updated_at = Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).single();
        let api = FakeAts { applications: vec![old], ..Default::default() };
        let counts = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap();
        assert_eq!(counts.screens["Backend"], 0);
    }

    #[tokio::test]
    async fn test_offers_take_max_of_stage_and_status() {
        let api = FakeAts {
            applications: vec![
                app("a1", "j1", "s-offer", "Active", 3),
                app("a2", "j1", "s-final", "Active", 3),
                app("a3", "j1", "s-final", "Active", 3),
                app("a4", "j2", "s-offer", "Active", 3),
                app("a5", "j2", "s-offer", "Active", 3),
            ],
            offers: vec![
                offer("o1", "a1", "Sent", 4),
                offer("o2", "a2", "Approved", 4),
                offer("o3", "a3", "Accepted", 4),
                offer("o4", "a4", "Inactive", 4),
                offer("o5", "a5", "Declined", 4),
            ],
            ..Default::default()
        };
        let counts = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap();
        // Backend: stage 1, status 3. Design: stage 2, status 0.
        assert_eq!(counts.offers["Backend"], 3);
        assert_eq!(counts.offers["Design"], 2);
    }

    #[tokio::test]
    async fn test_declined_acceptance_overrides_sent_offer() {
        let mut declined = offer("o1", "a1", "Sent", 4);
        declined.acceptance_status = Some("Declined".into());
        let mut rescinded = offer("o2", "a2", "Rescinded", 4);
        rescinded.acceptance_status = Some("Pending".into());
        let mut accepted = offer("o3", "a3", "Sent", 4);
        accepted.acceptance_status = Some("Accepted".into());
        let api = FakeAts {
            applications: vec![
                app("a1", "j1", "s-final", "Active", 3),
                app("a2", "j1", "s-final", "Active", 3),
                app("a3", "j2", "s-final", "Active", 3),
            ],
            offers: vec![declined, rescinded, accepted, offer("o4", "a3", "Cancelled", 4)],
            ..Default::default()
        };
        let counts = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap();
        assert_eq!(counts.offers["Backend"], 0);
        assert_eq!(counts.offers["Design"], 1);
    }

    #[tokio::test]
    async fn test_offer_job_id_used_when_present() {
        let mut o: AtsOffer = offer("o1", "unknown-app", "Active", 4);
        o.job_id = Some("j2".into());
        let api = FakeAts { offers: vec![o], ..Default::default() };
        let counts = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap();
        assert_eq!(counts.offers["Design"], 1);
    }

    #[tokio::test]
    async fn test_offer_failure_degrades() {
        let api = FakeAts {
            applications: vec![app("a1", "j1", "s-offer", "Active", 3)],
            offers_fail: true,
            ..Default::default()
        };
        let counts = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap();
        assert_eq!(counts.offers["Backend"], 1);
    }

    #[tokio::test]
    async fn test_application_listing_failure_fails_the_pass() {
        let api = FakeAts {
            applications: vec![app("a1", "j1", "s-hired", "Hired", 3)],
            applications_fail: true,
            ..Default::default()
        };
        let err = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::Provider { .. }));
        assert!(!err.is_auth());
    }

    #[tokio::test]
    async fn test_auth_and_configuration_errors() {
        let api = FakeAts { auth_fail: true, ..Default::default() };
        let err = PipelineAdapter::new(api)
            .count_pipeline(&jobs(), &stages(), &october())
            .await
            .unwrap_err();
        assert!(err.is_auth());

        let err = PipelineAdapter::new(FakeAts::default())
            .count_pipeline(&RoleMapping::new(), &stages(), &october())
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_stage_suggestions_and_jobs() {
        let api = FakeAts {
            stages: vec![
                AtsStage { id: "1".into(), title: "Recruiter Call".into() },
                AtsStage { id: "2".into(), title: "Onsite Loop".into() },
                AtsStage { id: "3".into(), title: "Reference Check".into() },
            ],
            ..Default::default()
        };
        let mut adapter = PipelineAdapter::new(api);
        let suggested = adapter.suggest_stage_classes().await;
        assert_eq!(suggested["1"], StageClass::Screen);
        assert_eq!(suggested["2"], StageClass::Final);
        assert_eq!(suggested["3"], StageClass::Ignore);
        assert!(adapter.jobs().await.is_empty());
    }
}
