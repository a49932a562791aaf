//! Outreach adapter: CRM activity events → per-role outreach and response
//! counts.
//!
//! ## Responsibility
//! Walk every mapped project, its candidates, and each candidate's events
//! (one candidate at a time, through the single owned client), classify
//! in-range events with an [`ActivityKind`] rule table, and tally per role.
//!
//! ## Guarantees
//! - Every role with at least one mapped project appears in the output,
//!   zero when nothing matched.
//! - A failed candidate or event fetch loses only that entity's counts.
//! - Authentication failures are never degraded; they abort the pass.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::crm::{CrmApi, CrmProject};
use super::{mapped_role, mapped_roles, RoleMapping};
use crate::calendar::DateRange;
use crate::classify::{ActivityKind, RuleTable, DEFAULT_ACTIVITY_RULES};
use crate::error::{FunnelError, Result};
use crate::record::RoleCounts;

/// Adapter output; also the cached payload for the CRM provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachCounts {
    pub outreach: RoleCounts,
    pub responses: RoleCounts,
}

pub struct OutreachAdapter<A> {
    api: A,
    rules: RuleTable<ActivityKind>,
}

impl<A: CrmApi> OutreachAdapter<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            rules: DEFAULT_ACTIVITY_RULES.clone(),
        }
    }

    /// Replace the activity vocabulary.
    pub fn with_rules(mut self, rules: RuleTable<ActivityKind>) -> Self {
        self.rules = rules;
        self
    }

    /// Projects available for mapping; empty when the listing fails.
    pub async fn projects(&mut self) -> Vec<CrmProject> {
        match self.api.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(target: "funnel_sync::outreach", error = %e, "listing projects failed");
                Vec::new()
            }
        }
    }

    /// Count outreach and responses per role for events inside `range`.
    ///
    /// Fails with [`FunnelError::Configuration`] before any request when no
    /// project maps to a role, and with [`FunnelError::Auth`] when the
    /// provider rejects the credential.
    pub async fn count_activity(&mut self, project_roles: &RoleMapping, range: &DateRange) -> Result<OutreachCounts> {
        let mapped: Vec<(&str, &str)> = project_roles
            .keys()
            .filter_map(|project| mapped_role(project_roles, project).map(|role| (project.as_str(), role)))
            .collect();
        if mapped.is_empty() {
            return Err(FunnelError::Configuration(
                "no CRM projects are mapped to roles".to_string(),
            ));
        }

        let mut counts = OutreachCounts::default();
        for role in mapped_roles(project_roles) {
            counts.outreach.insert(role.clone(), 0);
            counts.responses.insert(role, 0);
        }

        // A candidate shared by two projects of the same role counts once.
        let mut seen: HashSet<(&str, String)> = HashSet::new();
        let mut events_seen = 0usize;

        for (project, role) in mapped {
            let candidates = match self.api.list_candidates(project).await {
                Ok(c) => c,
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    warn!(target: "funnel_sync::outreach", project, error = %e, "candidate fetch failed, skipping project");
                    continue;
                }
            };

            for candidate in candidates {
                if !seen.insert((role, candidate.id.clone())) {
                    continue;
                }
                let events = match self.api.list_events(&candidate.id).await {
                    Ok(ev) => ev,
                    Err(e) if e.is_auth() => return Err(e),
                    Err(e) => {
                        warn!(
                            target: "funnel_sync::outreach",
                            candidate = %candidate.id,
                            error = %e,
                            "event fetch failed, skipping candidate"
                        );
                        continue;
                    }
                };

                for event in events {
                    let Some(at) = event.created_at else { continue };
                    if !range.contains(at) {
                        continue;
                    }
                    events_seen += 1;
                    let bucket = match self.rules.classify(&event.event_type) {
                        Some(ActivityKind::Outreach) => &mut counts.outreach,
                        Some(ActivityKind::Response) => &mut counts.responses,
                        None => {
                            debug!(target: "funnel_sync::outreach", event_type = %event.event_type, "unclassified event");
                            continue;
                        }
                    };
                    *bucket.entry(role.to_string()).or_insert(0) += 1;
                }
            }
        }

        info!(
            target: "funnel_sync::outreach",
            roles = counts.outreach.len(),
            events = events_seen,
            outreach = counts.outreach.values().sum::<u32>(),
            responses = counts.responses.values().sum::<u32>(),
            "outreach activity counted"
        );
        Ok(counts)
    }
}
