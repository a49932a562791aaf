//! # funnel-sync
//!
//! Recruiting funnel math and monthly pipeline reconciliation.
//!
//! - [`funnel`]: pure inverse-funnel calculator (outreach needed per hire
//!   target, weekly and daily pacing, per-role focus distribution).
//! - [`http`]: rate-limited, retrying, paginating provider client.
//! - [`providers`]: CRM and ATS APIs plus the adapters that turn their data
//!   into per-role counts.
//! - [`merge`]: the source-precedence policy that produces one record per month.
//! - [`sync`]: the orchestrator tying credentials, cache, providers and
//!   persistence together.
//!
//! ```no_run
//! use std::sync::Arc;
//! use funnel_sync::{Config, MemoryStore, RoleCounts, SyncOrchestrator};
//!
//! # async fn run() -> funnel_sync::Result<()> {
//! let config = Config::default();
//! let mut orchestrator = SyncOrchestrator::new(Arc::new(MemoryStore::new()), Box::new(config.api_factory()));
//! orchestrator.initialize().await?;
//! let record = orchestrator.sync_all(&RoleCounts::new()).await?;
//! println!("{}", serde_json::to_string_pretty(&record)?);
//! # Ok(())
//! # }
//! ```

pub mod calendar;
pub mod classify;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod funnel;
pub mod http;
pub mod merge;
pub mod providers;
pub mod record;
pub mod store;
pub mod sync;

pub use classify::{ActivityKind, RuleTable, StageClass};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{FunnelError, Result};
pub use funnel::{
    learn_rates, month_pace, outreach_distribution, required_outreach, weekly_breakdown, ConversionRates,
    FunnelRequirement, Role, RoleDistribution, WeeklyBreakdown,
};
pub use merge::merge;
pub use providers::{ApiFactory, HttpApiFactory, OutreachCounts, PipelineCounts};
pub use record::{Metric, MonthlyFunnelRecord, ProviderId, RoleCounts, SyncStatus};
pub use store::{KvStore, MemoryStore, SqliteStore};
pub use sync::{SyncOrchestrator, SyncState};
