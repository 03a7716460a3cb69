//! End-of-run summary and storage statistics

use chrono::NaiveDate;
use histwx_archive::MergeCounts;
use histwx_core::{Location, StoreStats};
use histwx_ingest::FetchError;
use std::fmt;

/// Hourly records a complete day has per location
pub const HOURS_PER_DAY: usize = 24;

#[derive(Debug, Clone, PartialEq)]
pub enum LocationStatus {
    Fetched,
    Recovered,
    Failed { attempts: u32, reason: FetchError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationTally {
    pub location: Location,
    pub status: LocationStatus,
    /// Records received from the API
    pub hourly: usize,
    pub daily: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub batches: usize,
    /// One entry per location, in input order
    pub tallies: Vec<LocationTally>,
    pub unclassified: Vec<Location>,
    pub hourly: MergeCounts,
    pub daily: MergeCounts,
}

impl RunSummary {
    fn count(&self, want: impl Fn(&LocationStatus) -> bool) -> usize {
        self.tallies.iter().filter(|t| want(&t.status)).count()
    }

    pub fn fetched(&self) -> usize {
        self.count(|s| matches!(s, LocationStatus::Fetched))
    }

    pub fn recovered(&self) -> usize {
        self.count(|s| matches!(s, LocationStatus::Recovered))
    }

    pub fn failed(&self) -> Vec<&LocationTally> {
        self.tallies
            .iter()
            .filter(|t| matches!(t.status, LocationStatus::Failed { .. }))
            .collect()
    }

    pub fn hourly_received(&self) -> usize {
        self.tallies.iter().map(|t| t.hourly).sum()
    }

    pub fn daily_received(&self) -> usize {
        self.tallies.iter().map(|t| t.daily).sum()
    }

    /// A full day for every location, fetched or not
    pub fn hourly_expected(&self) -> usize {
        self.tallies.len() * HOURS_PER_DAY
    }

    pub fn daily_expected(&self) -> usize {
        self.tallies.len()
    }

    /// Fetched or recovered locations whose data had somewhere to go
    pub fn stored(&self) -> usize {
        self.tallies
            .iter()
            .filter(|t| !matches!(t.status, LocationStatus::Failed { .. }))
            .filter(|t| !self.unclassified.contains(&t.location))
            .count()
    }

    /// No location's data reached storage
    pub fn is_failure(&self) -> bool {
        !self.tallies.is_empty() && self.stored() == 0
    }
}

fn percent(received: usize, expected: usize) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    received as f64 * 100.0 / expected as f64
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run summary for {}", self.date)?;
        writeln!(
            f,
            "  locations: {} total, {} fetched, {} recovered, {} failed, {} unclassified",
            self.tallies.len(),
            self.fetched(),
            self.recovered(),
            self.failed().len(),
            self.unclassified.len()
        )?;
        for (label, received, expected, counts) in [
            ("hourly", self.hourly_received(), self.hourly_expected(), self.hourly),
            ("daily", self.daily_received(), self.daily_expected(), self.daily),
        ] {
            writeln!(
                f,
                "  {}: {}/{} received ({:.1}%), {} inserted, {} updated, {} skipped",
                label,
                received,
                expected,
                percent(received, expected),
                counts.inserted,
                counts.updated,
                counts.skipped
            )?;
        }
        for tally in &self.tallies {
            match &tally.status {
                LocationStatus::Failed { attempts, reason } => writeln!(
                    f,
                    "  {}: failed after {} attempts: {}",
                    tally.location, attempts, reason
                )?,
                status => {
                    let label = match status {
                        LocationStatus::Recovered => "recovered",
                        _ => "fetched",
                    };
                    writeln!(
                        f,
                        "  {}: {}, {}/{} hourly, {} daily",
                        tally.location, label, tally.hourly, HOURS_PER_DAY, tally.daily
                    )?
                }
            }
        }
        for location in &self.unclassified {
            writeln!(f, "  {}: unclassified, nothing stored", location)?;
        }
        Ok(())
    }
}

/// Storage statistics in the shape logged after each run
pub struct StatsReport<'a>(pub &'a StoreStats);

impl fmt::Display for StatsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.0;
        let or_na = |value: Option<String>| value.unwrap_or_else(|| "n/a".to_string());

        writeln!(f, "Database statistics")?;
        writeln!(f, "  hourly rows: {}", stats.hourly_count)?;
        writeln!(f, "  daily rows: {}", stats.daily_count)?;
        writeln!(
            f,
            "  first hourly: {}",
            or_na(stats.first_hourly.map(|t| t.to_string()))
        )?;
        writeln!(
            f,
            "  latest hourly: {}",
            or_na(stats.latest_hourly.map(|t| t.to_string()))
        )?;
        write!(
            f,
            "  latest daily: {}",
            or_na(stats.latest_daily.map(|d| d.to_string()))
        )
    }
}
