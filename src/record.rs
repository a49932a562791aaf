//! Monthly funnel record, provenance labels, and per-provider sync state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role name → count. Ordered so serialized records are byte-stable.
pub type RoleCounts = BTreeMap<String, u32>;

// ---------------------------------------------------------------------------
// Metric / Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Outreach,
    Responses,
    Screens,
    Finals,
    Offers,
    Hires,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Outreach,
        Metric::Responses,
        Metric::Screens,
        Metric::Finals,
        Metric::Offers,
        Metric::Hires,
    ];
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Outreach => write!(f, "outreach"),
            Metric::Responses => write!(f, "responses"),
            Metric::Screens => write!(f, "screens"),
            Metric::Finals => write!(f, "finals"),
            Metric::Offers => write!(f, "offers"),
            Metric::Hires => write!(f, "hires"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown metric: {s}"))
    }
}

/// Where a merged number came from. Declaration order is the canonical
/// order used when joining labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    Crm,
    Ats,
    Calendar,
    Manual,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::Crm => "crm",
            Source::Ats => "ats",
            Source::Calendar => "calendar",
            Source::Manual => "manual",
        }
    }

    fn from_label(s: &str) -> Option<Source> {
        match s {
            "crm" => Some(Source::Crm),
            "ats" => Some(Source::Ats),
            "calendar" => Some(Source::Calendar),
            "manual" => Some(Source::Manual),
            _ => None,
        }
    }
}

/// `{Ats, Calendar}` → `"ats+calendar"`.
pub fn join_sources(sources: &BTreeSet<Source>) -> String {
    sources.iter().map(|s| s.label()).collect::<Vec<_>>().join("+")
}

/// Inverse of [`join_sources`]; unknown parts are dropped.
pub fn split_label(label: &str) -> BTreeSet<Source> {
    label.split('+').filter_map(|p| Source::from_label(p.trim())).collect()
}

// ---------------------------------------------------------------------------
// MonthlyFunnelRecord
// ---------------------------------------------------------------------------

/// Unified per-role counts for one calendar month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthlyFunnelRecord {
    pub outreach: RoleCounts,
    pub responses: RoleCounts,
    pub screens: RoleCounts,
    pub finals: RoleCounts,
    pub offers: RoleCounts,
    pub hires: RoleCounts,
    pub provenance: BTreeMap<Metric, String>,
}

impl MonthlyFunnelRecord {
    pub fn counts(&self, metric: Metric) -> &RoleCounts {
        match metric {
            Metric::Outreach => &self.outreach,
            Metric::Responses => &self.responses,
            Metric::Screens => &self.screens,
            Metric::Finals => &self.finals,
            Metric::Offers => &self.offers,
            Metric::Hires => &self.hires,
        }
    }

    pub fn counts_mut(&mut self, metric: Metric) -> &mut RoleCounts {
        match metric {
            Metric::Outreach => &mut self.outreach,
            Metric::Responses => &mut self.responses,
            Metric::Screens => &mut self.screens,
            Metric::Finals => &mut self.finals,
            Metric::Offers => &mut self.offers,
            Metric::Hires => &mut self.hires,
        }
    }

    pub fn count(&self, metric: Metric, role: &str) -> u32 {
        self.counts(metric).get(role).copied().unwrap_or(0)
    }

    /// Sources recorded for `metric`, empty when none.
    pub fn sources(&self, metric: Metric) -> BTreeSet<Source> {
        self.provenance
            .get(&metric)
            .map(|l| split_label(l))
            .unwrap_or_default()
    }

    /// Hand-entered activity: adds `count` and tags the metric `manual`.
    pub fn log_manual(&mut self, metric: Metric, role: &str, count: u32) {
        let entry = self.counts_mut(metric).entry(role.to_string()).or_insert(0);
        *entry = entry.saturating_add(count);
        let mut sources = self.sources(metric);
        sources.insert(Source::Manual);
        self.provenance.insert(metric, join_sources(&sources));
    }
}

// ---------------------------------------------------------------------------
// Provider sync state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Crm,
    Ats,
}

impl ProviderId {
    pub fn source(self) -> Source {
        match self {
            ProviderId::Crm => Source::Crm,
            ProviderId::Ats => Source::Ats,
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.source().label())
    }
}

/// Connectivity and health of one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One provider's payload for one month, as written to the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSyncResult<T> {
    pub last_sync: DateTime<Utc>,
    pub payload: T,
}
