use std::env;
use std::path::Path;
use std::sync::Arc;

use chrono::{Months, NaiveDate, Utc};
use clap::{CommandFactory, Parser};
use colored::*;
use tracing_subscriber::EnvFilter;

use funnel_sync::calendar::{month_key, weeks_in_month};
use funnel_sync::cli::{Args, Command};
use funnel_sync::funnel::{learn_rates, month_pace, outreach_distribution, required_outreach, weekly_breakdown};
use funnel_sync::record::{Metric, MonthlyFunnelRecord, ProviderId, RoleCounts};
use funnel_sync::store::{keys, load, save, KvStore};
use funnel_sync::{Config, Role, SqliteStore, SyncOrchestrator};

/// Months of history `plan --db` learns from.
const LEARNING_MONTHS: u32 = 3;
/// Smallest stage denominator trusted when learning a rate.
const LEARNING_MIN_SAMPLE: u32 = 20;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("funnel_sync=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Plan { config, hires, db } => plan(config.as_deref(), hires, db.as_deref()).await,
        Command::Sync { config, db, calendar } => sync(config.as_deref(), &db, calendar.as_deref()).await,
        Command::Log {
            metric,
            role,
            count,
            db,
        } => log_manual(metric, &role, count, &db).await,
        Command::Stages { config, db } => stages(config.as_deref(), &db).await,
        Command::Completions { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(shell, &mut cmd, "funnel-sync", &mut std::io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

async fn plan(config_path: Option<&Path>, hires: Option<u32>, db: Option<&Path>) -> CliResult<()> {
    let config = Config::load_or_default(config_path)?;
    let mut roles = if config.roles.is_empty() {
        vec![Role::new("Default", 1)]
    } else {
        config.roles.clone()
    };
    if let Some(h) = hires {
        for role in &mut roles {
            role.monthly_hire_target = h.max(1);
        }
    }

    let today = Utc::now().date_naive();
    if let Some(path) = db {
        let store = SqliteStore::open(path)?;
        let history = recent_records(&store, today).await?;
        for role in &mut roles {
            role.learned_rates = learn_rates(&history, &role.name, &role.rates, LEARNING_MIN_SAMPLE);
        }
    }

    let weeks = weeks_in_month(today);
    let distribution = outreach_distribution(&roles);

    println!("{}", format!("Funnel plan for {}", month_key(today)).bright_cyan().bold());
    for (role, share) in roles.iter().zip(&distribution) {
        let req = required_outreach(role.monthly_hire_target, &role.effective_rates())?;
        let pace = weekly_breakdown(req.outreach, weeks);
        let learned = if role.learned_rates.is_some() {
            " (learned rates)".dimmed().to_string()
        } else {
            String::new()
        };

        println!();
        println!(
            "{} {}{}",
            role.name.bold(),
            format!("{}% of focus", share.distribution_percent).yellow(),
            learned
        );
        println!(
            "  hires {} <- offers {} <- finals {} <- screens {} <- interested {} <- responses {} <- outreach {}",
            req.hires,
            req.offers,
            req.finals,
            req.screens,
            req.interested,
            req.responses,
            req.outreach.to_string().bright_green().bold()
        );
        println!(
            "  outreach pace: {} / month, {} / week, {} / day",
            pace.monthly, pace.weekly, pace.daily
        );
    }
    Ok(())
}

async fn recent_records(store: &dyn KvStore, today: NaiveDate) -> CliResult<Vec<MonthlyFunnelRecord>> {
    let mut history = Vec::new();
    for back in 1..=LEARNING_MONTHS {
        let Some(month) = today.checked_sub_months(Months::new(back)) else {
            continue;
        };
        if let Some(record) = load::<MonthlyFunnelRecord>(store, &keys::monthly_record(&month_key(month))).await? {
            history.push(record);
        }
    }
    Ok(history)
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

/// Copy environment credentials and file configuration into the store,
/// where the orchestrator reads them.
async fn seed_store(store: &dyn KvStore, config: &Config) -> CliResult<()> {
    for (var, key) in [("CRM_API_KEY", keys::CRM_API_KEY), ("ATS_API_KEY", keys::ATS_API_KEY)] {
        if let Ok(value) = env::var(var) {
            save(store, key, &value).await?;
        }
    }
    save(store, keys::CALENDAR_CONNECTED, &config.sync.calendar_connected).await?;
    if !config.mappings.crm_projects.is_empty() {
        save(store, keys::CRM_PROJECT_ROLES, &config.mappings.crm_projects).await?;
    }
    if !config.mappings.ats_jobs.is_empty() {
        save(store, keys::ATS_JOB_ROLES, &config.mappings.ats_jobs).await?;
    }
    if !config.mappings.ats_stages.is_empty() {
        save(store, keys::ATS_STAGE_CLASSES, &config.mappings.ats_stages).await?;
    }
    if !config.roles.is_empty() {
        save(store, keys::ROLES, &config.roles).await?;
    }
    Ok(())
}

fn orchestrator(store: Arc<SqliteStore>, config: &Config) -> SyncOrchestrator {
    SyncOrchestrator::new(store, Box::new(config.api_factory())).with_cache_ttl(config.sync.cache_ttl())
}

async fn sync(config_path: Option<&Path>, db: &Path, calendar: Option<&Path>) -> CliResult<()> {
    let config = Config::load_or_default(config_path)?;
    let store = Arc::new(SqliteStore::open(db)?);
    seed_store(&*store, &config).await?;

    let calendar_counts: RoleCounts = match calendar {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => RoleCounts::new(),
    };

    let mut orch = orchestrator(Arc::clone(&store), &config);
    orch.initialize().await?;
    let record = orch.sync_all(&calendar_counts).await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    eprintln!();
    for (provider, status) in orch.sync_status() {
        print_status(provider, status.connected, status.error.as_deref());
    }
    if orch.calendar_connected() {
        eprintln!("{} {}", "calendar".bold(), "connected".green());
    }

    let roles: Vec<Role> = load(&*store, keys::ROLES).await?.unwrap_or_default();
    let today = Utc::now().date_naive();
    for role in &roles {
        let pace = month_pace(role.monthly_hire_target, record.count(Metric::Hires, &role.name), today);
        eprintln!(
            "{}: {} hire(s) to go, {} per remaining work day",
            role.name.bold(),
            pace.remaining,
            pace.per_work_day
        );
    }
    Ok(())
}

fn print_status(provider: ProviderId, connected: bool, error: Option<&str>) {
    let state = if connected { "connected".green() } else { "disconnected".red() };
    match error {
        Some(e) => eprintln!("{} {} {}", provider.to_string().bold(), state, e.dimmed()),
        None => eprintln!("{} {}", provider.to_string().bold(), state),
    }
}

// ---------------------------------------------------------------------------
// log / stages
// ---------------------------------------------------------------------------

async fn log_manual(metric: Metric, role: &str, count: u32, db: &Path) -> CliResult<()> {
    let store = Arc::new(SqliteStore::open(db)?);
    let orch = orchestrator(store, &Config::default());
    let record = orch.log_manual(metric, role, count).await?;
    println!(
        "{} {} {} for {} (now {})",
        "logged".green(),
        count,
        metric,
        role.bold(),
        record.count(metric, role)
    );
    Ok(())
}

async fn stages(config_path: Option<&Path>, db: &Path) -> CliResult<()> {
    let config = Config::load_or_default(config_path)?;
    let store = Arc::new(SqliteStore::open(db)?);
    seed_store(&*store, &config).await?;

    let mut orch = orchestrator(store, &config);
    orch.initialize().await?;
    let classes = orch.refresh_stage_classes().await?;
    if classes.is_empty() {
        eprintln!("{}", "no interview stages found".yellow());
    }
    for (stage, class) in &classes {
        println!("{stage}\t{class}");
    }
    Ok(())
}
