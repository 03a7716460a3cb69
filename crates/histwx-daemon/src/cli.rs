use chrono::{Duration, NaiveDate};
use clap::Parser;
use std::path::PathBuf;

/// Longest backfill accepted in one invocation
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Parser)]
#[command(
    name = "histwxd",
    version,
    about = "Fetch a day of historical weather for every location and merge it into MySQL"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "HISTWX_CONFIG", default_value = "histwx.toml")]
    pub config: PathBuf,

    /// Day to fetch (YYYY-MM-DD or YYYYMMDD); defaults to yesterday
    #[arg(long, value_parser = parse_date_arg, conflicts_with_all = ["from", "to"])]
    pub date: Option<NaiveDate>,

    /// First day of a backfill range
    #[arg(long, value_parser = parse_date_arg, requires = "to")]
    pub from: Option<NaiveDate>,

    /// Last day of a backfill range, inclusive
    #[arg(long, value_parser = parse_date_arg, requires = "from")]
    pub to: Option<NaiveDate>,

    /// Merge into an in-memory store instead of the database
    #[arg(long)]
    pub dry_run: bool,

    /// Print storage statistics and exit
    #[arg(long)]
    pub stats: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Skip the retry sweep over failed locations
    #[arg(long)]
    pub no_sweep: bool,
}

impl Cli {
    /// The dates to run, oldest first
    pub fn dates(&self, today: NaiveDate) -> Result<Vec<NaiveDate>, String> {
        match (self.date, self.from, self.to) {
            (Some(date), _, _) => Ok(vec![date]),
            (None, Some(from), Some(to)) => {
                if from > to {
                    return Err(format!("--from {} is after --to {}", from, to));
                }
                let days = (to - from).num_days() + 1;
                if days > MAX_RANGE_DAYS {
                    return Err(format!(
                        "range of {} days exceeds the limit of {}",
                        days, MAX_RANGE_DAYS
                    ));
                }
                Ok(from.iter_days().take(days as usize).collect())
            }
            _ => Ok(vec![today - Duration::days(1)]),
        }
    }
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    histwx_core::parse_date(s).map_err(|e| e.to_string())
}
