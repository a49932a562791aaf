use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::record::Metric;

#[derive(Parser, Debug)]
#[command(name = "funnel-sync")]
#[command(version)]
#[command(about = "Recruiting funnel planner and monthly pipeline reconciler")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the outreach each configured role needs this month
    Plan {
        /// TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Override every role's monthly hire target
        #[arg(long)]
        hires: Option<u32>,

        /// Learn conversion rates from the last three months stored here
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Pull CRM and ATS data and merge this month's record
    Sync {
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// SQLite database holding credentials, cache and records
        #[arg(long, default_value = "funnel-sync.db")]
        db: PathBuf,

        /// JSON file of calendar screening counts per role
        #[arg(long)]
        calendar: Option<PathBuf>,
    },

    /// Record hand-entered activity in this month's record
    Log {
        /// outreach, responses, screens, finals, offers or hires
        #[arg(long)]
        metric: Metric,

        #[arg(long)]
        role: String,

        #[arg(long, default_value = "1")]
        count: u32,

        #[arg(long, default_value = "funnel-sync.db")]
        db: PathBuf,
    },

    /// Classify ATS interview stages and store the mapping
    Stages {
        #[arg(long, short)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "funnel-sync.db")]
        db: PathBuf,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_defaults() {
        let args = Args::parse_from(["funnel-sync", "plan"]);
        match args.command {
            Command::Plan { config, hires, db } => {
                assert!(config.is_none());
                assert!(hires.is_none());
                assert!(db.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_plan_with_overrides() {
        let args = Args::parse_from(["funnel-sync", "plan", "-c", "roles.toml", "--hires", "3"]);
        match args.command {
            Command::Plan { config, hires, .. } => {
                assert_eq!(config, Some(PathBuf::from("roles.toml")));
                assert_eq!(hires, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_sync_default_db() {
        let args = Args::parse_from(["funnel-sync", "sync", "--calendar", "cal.json"]);
        match args.command {
            Command::Sync { db, calendar, .. } => {
                assert_eq!(db, PathBuf::from("funnel-sync.db"));
                assert_eq!(calendar, Some(PathBuf::from("cal.json")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_log_metric() {
        let args = Args::parse_from(["funnel-sync", "log", "--metric", "Screens", "--role", "Backend", "--count", "2"]);
        match args.command {
            Command::Log { metric, role, count, .. } => {
                assert_eq!(metric, Metric::Screens);
                assert_eq!(role, "Backend");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_log_rejects_unknown_metric() {
        assert!(Args::try_parse_from(["funnel-sync", "log", "--metric", "coffees", "--role", "x"]).is_err());
    }

    #[test]
    fn test_parse_completions() {
        let args = Args::parse_from(["funnel-sync", "completions", "bash"]);
        assert!(matches!(args.command, Command::Completions { shell: Shell::Bash }));
    }
}
