//! # Sync Orchestrator
//!
//! ## Responsibility
//! Drive one reconciliation cycle for the current month: read credentials
//! and mappings from the [`KvStore`], pull each configured provider through a
//! read-through cache, merge with calendar counts and the previously
//! persisted record, and persist the result.
//!
//! ## State machine
//! ```text
//! Uninitialized ──initialize()──► Initialized ──sync_all()──► Syncing ──► Idle
//!                                                               ▲           │
//!                                                               └─sync_all()┘
//! ```
//!
//! ## Guarantees
//! - Providers are synced one after the other (CRM, then ATS), each through
//!   its single owned client, so request spacing is never shared.
//! - A provider failure never escapes [`SyncOrchestrator::sync_all`]; it is
//!   recorded in that provider's [`SyncStatus`] and the cycle falls back to
//!   the stale cache payload, then to the prior record.
//! - A cached payload younger than the TTL is served without any request;
//!   one exactly TTL old is refetched.
//! - The monthly record is written only after a successful merge.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calendar::{month_key, month_range};
use crate::clock::{Clock, SystemClock};
use crate::error::{FunnelError, Result};
use crate::merge::merge;
use crate::providers::pipeline::StageClasses;
use crate::providers::{
    ApiFactory, AtsApi, AtsJob, CrmApi, CrmProject, OutreachAdapter, OutreachCounts, PipelineAdapter,
    PipelineCounts, RoleMapping,
};
use crate::record::{CachedSyncResult, Metric, MonthlyFunnelRecord, ProviderId, RoleCounts, SyncStatus};
use crate::store::{keys, load, save, KvStore};

/// Default age at which cached provider payloads expire.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Initialized,
    Syncing,
    Idle,
}

/// A configured provider: its adapter plus the credential it was built with.
struct Slot<A> {
    api_key: String,
    adapter: A,
}

type CrmSlot = Slot<OutreachAdapter<Box<dyn CrmApi>>>;
type AtsSlot = Slot<PipelineAdapter<Box<dyn AtsApi>>>;

pub struct SyncOrchestrator {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    factory: Box<dyn ApiFactory>,
    cache_ttl: Duration,
    crm: Option<CrmSlot>,
    ats: Option<AtsSlot>,
    statuses: BTreeMap<ProviderId, SyncStatus>,
    calendar_connected: bool,
    state: SyncState,
}

impl SyncOrchestrator {
    /// Wall-clock time and a one-hour cache TTL.
    pub fn new(store: Arc<dyn KvStore>, factory: Box<dyn ApiFactory>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            factory,
            cache_ttl: DEFAULT_CACHE_TTL,
            crm: None,
            ats: None,
            statuses: BTreeMap::new(),
            calendar_connected: false,
            state: SyncState::Uninitialized,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn calendar_connected(&self) -> bool {
        self.calendar_connected
    }

    /// Status of every configured provider.
    pub fn sync_status(&self) -> BTreeMap<ProviderId, SyncStatus> {
        self.statuses.clone()
    }

    /// Read credentials and the calendar flag, then build or drop each
    /// provider adapter to match. Safe to call repeatedly; an adapter whose
    /// credential is unchanged is kept along with its request spacing.
    pub async fn initialize(&mut self) -> Result<()> {
        let crm_key = read_credential(self.store.as_ref(), keys::CRM_API_KEY).await?;
        let ats_key = read_credential(self.store.as_ref(), keys::ATS_API_KEY).await?;
        self.calendar_connected = load::<bool>(self.store.as_ref(), keys::CALENDAR_CONNECTED)
            .await?
            .unwrap_or(false);

        match crm_key {
            Some(key) if self.crm.as_ref().is_some_and(|s| s.api_key == key) => {}
            Some(key) => {
                let adapter = OutreachAdapter::new(self.factory.crm(&key));
                self.crm = Some(Slot { api_key: key, adapter });
                self.statuses.entry(ProviderId::Crm).or_default();
            }
            None => {
                self.crm = None;
                self.statuses.remove(&ProviderId::Crm);
            }
        }

        match ats_key {
            Some(key) if self.ats.as_ref().is_some_and(|s| s.api_key == key) => {}
            Some(key) => {
                let adapter = PipelineAdapter::new(self.factory.ats(&key));
                self.ats = Some(Slot { api_key: key, adapter });
                self.statuses.entry(ProviderId::Ats).or_default();
            }
            None => {
                self.ats = None;
                self.statuses.remove(&ProviderId::Ats);
            }
        }

        if self.state == SyncState::Uninitialized {
            self.state = SyncState::Initialized;
        }
        info!(
            target: "funnel_sync::sync",
            crm = self.crm.is_some(),
            ats = self.ats.is_some(),
            calendar = self.calendar_connected,
            "orchestrator initialized"
        );
        Ok(())
    }

    /// Run one reconciliation cycle for the current month and return the
    /// merged record. Initializes first when needed.
    ///
    /// Errors only when the store itself fails; provider failures are
    /// reported through [`SyncOrchestrator::sync_status`].
    pub async fn sync_all(&mut self, calendar_counts: &RoleCounts) -> Result<MonthlyFunnelRecord> {
        if self.state == SyncState::Uninitialized {
            self.initialize().await?;
        }
        self.state = SyncState::Syncing;
        let outcome = self.run_cycle(calendar_counts).await;
        self.state = SyncState::Idle;
        outcome
    }

    async fn run_cycle(&mut self, calendar_counts: &RoleCounts) -> Result<MonthlyFunnelRecord> {
        let now = self.clock.now();
        let range = month_range(now);
        let month = month_key(now.date_naive());
        let record_key = keys::monthly_record(&month);
        let store = Arc::clone(&self.store);

        let prior: MonthlyFunnelRecord = load(store.as_ref(), &record_key).await?.unwrap_or_default();

        let mut crm_counts: Option<OutreachCounts> = None;
        if let Some(slot) = self.crm.as_mut() {
            let adapter = &mut slot.adapter;
            let fetch = async {
                let mapping: RoleMapping = load(store.as_ref(), keys::CRM_PROJECT_ROLES).await?.unwrap_or_default();
                adapter.count_activity(&mapping, &range).await
            };
            let (payload, status) =
                read_through(store.as_ref(), ProviderId::Crm, &month, now, self.cache_ttl, fetch).await;
            self.statuses.insert(ProviderId::Crm, status);
            crm_counts = payload;
        }

        let mut ats_counts: Option<PipelineCounts> = None;
        if let Some(slot) = self.ats.as_mut() {
            let adapter = &mut slot.adapter;
            let fetch = async {
                let jobs: RoleMapping = load(store.as_ref(), keys::ATS_JOB_ROLES).await?.unwrap_or_default();
                let stages: StageClasses = load(store.as_ref(), keys::ATS_STAGE_CLASSES).await?.unwrap_or_default();
                adapter.count_pipeline(&jobs, &stages, &range).await
            };
            let (payload, status) =
                read_through(store.as_ref(), ProviderId::Ats, &month, now, self.cache_ttl, fetch).await;
            self.statuses.insert(ProviderId::Ats, status);
            ats_counts = payload;
        }

        let merged = merge(&prior, crm_counts.as_ref(), ats_counts.as_ref(), calendar_counts);
        save(store.as_ref(), &record_key, &merged).await?;

        info!(
            target: "funnel_sync::sync",
            month = %month,
            crm = crm_counts.is_some(),
            ats = ats_counts.is_some(),
            calendar_roles = calendar_counts.len(),
            "monthly record merged"
        );
        Ok(merged)
    }

    /// Add hand-entered activity to the current month's record.
    pub async fn log_manual(&self, metric: Metric, role: &str, count: u32) -> Result<MonthlyFunnelRecord> {
        let month = month_key(self.clock.now().date_naive());
        let key = keys::monthly_record(&month);
        let mut record: MonthlyFunnelRecord = load(self.store.as_ref(), &key).await?.unwrap_or_default();
        record.log_manual(metric, role, count);
        save(self.store.as_ref(), &key, &record).await?;
        info!(target: "funnel_sync::sync", %metric, role, count, month = %month, "manual activity logged");
        Ok(record)
    }

    /// Classify every ATS interview stage heuristically and store the result
    /// as the stage-class mapping. Existing entries are kept.
    pub async fn refresh_stage_classes(&mut self) -> Result<StageClasses> {
        let Some(slot) = self.ats.as_mut() else {
            return Err(FunnelError::Configuration("ATS credential is not set".to_string()));
        };
        let suggested = slot.adapter.suggest_stage_classes().await;
        let mut classes: StageClasses = load(self.store.as_ref(), keys::ATS_STAGE_CLASSES)
            .await?
            .unwrap_or_default();
        for (stage, class) in suggested {
            classes.entry(stage).or_insert(class);
        }
        save(self.store.as_ref(), keys::ATS_STAGE_CLASSES, &classes).await?;
        Ok(classes)
    }

    /// CRM projects available for mapping; empty when the CRM is not configured.
    pub async fn crm_projects(&mut self) -> Vec<CrmProject> {
        match self.crm.as_mut() {
            Some(slot) => slot.adapter.projects().await,
            None => Vec::new(),
        }
    }

    /// ATS jobs available for mapping; empty when the ATS is not configured.
    pub async fn ats_jobs(&mut self) -> Vec<AtsJob> {
        match self.ats.as_mut() {
            Some(slot) => slot.adapter.jobs().await,
            None => Vec::new(),
        }
    }
}

async fn read_credential(store: &dyn KvStore, key: &str) -> Result<Option<String>> {
    let value: Option<String> = load(store, key).await?;
    Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}

/// Serve `provider`'s cached payload for `month` while it is younger than
/// `ttl`; otherwise run `fetch`, caching a success. A failed fetch falls back
/// to whatever payload is cached, however old.
async fn read_through<T, F>(
    store: &dyn KvStore,
    provider: ProviderId,
    month: &str,
    now: DateTime<Utc>,
    ttl: Duration,
    fetch: F,
) -> (Option<T>, SyncStatus)
where
    T: Serialize + DeserializeOwned,
    F: Future<Output = Result<T>>,
{
    let key = keys::sync_cache(provider, month);
    let cached: Option<CachedSyncResult<T>> = match load(store, &key).await {
        Ok(c) => c,
        Err(e) => {
            warn!(target: "funnel_sync::sync", %provider, error = %e, "unreadable cache entry ignored");
            None
        }
    };

    let cached = match cached {
        Some(entry) if is_fresh(entry.last_sync, now, ttl) => {
            debug!(target: "funnel_sync::sync", %provider, last_sync = %entry.last_sync, "serving cached payload");
            let status = SyncStatus {
                connected: true,
                last_sync: Some(entry.last_sync),
                error: None,
            };
            return (Some(entry.payload), status);
        }
        other => other,
    };

    match fetch.await {
        Ok(payload) => {
            let entry = CachedSyncResult { last_sync: now, payload };
            if let Err(e) = save(store, &key, &entry).await {
                warn!(target: "funnel_sync::sync", %provider, error = %e, "could not write cache entry");
            }
            info!(target: "funnel_sync::sync", %provider, "provider synced");
            let status = SyncStatus {
                connected: true,
                last_sync: Some(now),
                error: None,
            };
            (Some(entry.payload), status)
        }
        Err(e) => {
            warn!(
                target: "funnel_sync::sync",
                %provider,
                error = %e,
                stale_cache = cached.is_some(),
                "provider sync failed"
            );
            let status = SyncStatus {
                connected: false,
                last_sync: cached.as_ref().map(|c| c.last_sync),
                error: Some(e.to_string()),
            };
            (cached.map(|c| c.payload), status)
        }
    }
}

/// Fresh while strictly younger than `ttl`. Entries stamped in the future
/// (clock moved backwards) count as age zero.
fn is_fresh(last_sync: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let age = now.signed_duration_since(last_sync).to_std().unwrap_or(Duration::ZERO);
    age < ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_is_fresh_boundary() {
        let ttl = Duration::from_secs(3600);
        assert!(is_fresh(t0(), t0(), ttl));
        assert!(is_fresh(t0(), t0() + chrono::Duration::seconds(3599), ttl));
        assert!(!is_fresh(t0(), t0() + chrono::Duration::seconds(3600), ttl));
        assert!(is_fresh(t0() + chrono::Duration::seconds(60), t0(), ttl));
    }

    #[tokio::test]
    async fn test_read_through_caches_success() {
        let store = MemoryStore::new();
        let (payload, status) =
            read_through(&store, ProviderId::Crm, "2026-10", t0(), DEFAULT_CACHE_TTL, async { Ok(7u32) }).await;
        assert_eq!(payload, Some(7));
        assert!(status.connected);
        assert_eq!(status.last_sync, Some(t0()));

        // Fresh entry: the fetch future is never polled.
        let later = t0() + chrono::Duration::minutes(30);
        let (payload, status) = read_through(&store, ProviderId::Crm, "2026-10", later, DEFAULT_CACHE_TTL, async {
            Err::<u32, _>(FunnelError::Configuration("unreachable".into()))
        })
        .await;
        assert_eq!(payload, Some(7));
        assert_eq!(status.last_sync, Some(t0()));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_read_through_stale_fallback_on_failure() {
        let store = MemoryStore::new();
        let _ = read_through(&store, ProviderId::Ats, "2026-10", t0(), DEFAULT_CACHE_TTL, async { Ok(3u32) }).await;

        let later = t0() + chrono::Duration::hours(2);
        let (payload, status) = read_through(&store, ProviderId::Ats, "2026-10", later, DEFAULT_CACHE_TTL, async {
            Err::<u32, _>(FunnelError::Auth { provider: "ats".into(), status: 401 })
        })
        .await;
        assert_eq!(payload, Some(3));
        assert!(!status.connected);
        assert!(status.error.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_read_through_no_cache_no_data() {
        let store = MemoryStore::new();
        let (payload, status) = read_through(&store, ProviderId::Crm, "2026-10", t0(), DEFAULT_CACHE_TTL, async {
            Err::<u32, _>(FunnelError::Configuration("no CRM projects are mapped to roles".into()))
        })
        .await;
        assert!(payload.is_none());
        assert!(!status.connected);
        assert!(status.last_sync.is_none());
    }
}
