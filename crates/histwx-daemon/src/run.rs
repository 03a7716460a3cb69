//! One date end to end: fetch, merge, summarize, sweep

use chrono::NaiveDate;
use histwx_archive::{ArchiveError, ArchiveResult, MergeLayer, MergeReport};
use histwx_config::AppConfig;
use histwx_core::{DailyRecord, Location, RecomputeScope, Stamped, SummarySource, WeatherStore};
use histwx_ingest::{Credential, FetchClient, FetchError, RetryPolicy, WeatherApi};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::report::{LocationStatus, LocationTally, RunSummary};
use crate::scheduler::{BatchScheduler, SchedulerSettings};
use crate::sweep::{RetrySweep, SweepSettings};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(
        "credential expired after {completed} locations; raise api.token_hours or split the run"
    )]
    CredentialExpired { completed: usize },

    #[error("API rejected the credential while fetching {location}: {reason}")]
    CredentialRejected {
        location: Location,
        reason: FetchError,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub scheduler: SchedulerSettings,
    /// `None` disables the retry sweep
    pub sweep: Option<SweepSettings>,
    pub daily_source: SummarySource,
}

impl RunSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let scheduler = SchedulerSettings {
            batch_size: config.batch.size,
            request_delay: config.request_delay(),
            batch_delay: config.batch_delay(),
            progress_interval: config.progress_interval(),
            retry: RetryPolicy::new(
                config.retry.max_retries,
                Duration::from_millis(config.retry.base_delay_ms),
            ),
        };
        let sweep = config.sweep.enabled.then(|| SweepSettings {
            retry: RetryPolicy::new(
                config.sweep.max_retries,
                Duration::from_millis(config.sweep.base_delay_ms),
            ),
            pause: Duration::from_millis(config.sweep.pause_ms),
        });

        Self {
            scheduler,
            sweep,
            daily_source: config.daily.source,
        }
    }
}

/// Write daily rows for freshly fetched locations
///
/// With `Api` the API's own daily records are stored; with `Hourly` each
/// location's row for `date` is rebuilt from its stored hourly rows.
pub async fn store_daily<S: WeatherStore>(
    merge: &MergeLayer<S>,
    source: SummarySource,
    daily: &[Stamped<DailyRecord>],
    locations: &[Location],
    date: NaiveDate,
) -> ArchiveResult<MergeReport> {
    match source {
        SummarySource::Api => merge.merge_daily(daily).await,
        SummarySource::Hourly => {
            let mut report = MergeReport::default();
            for location in locations {
                let scope = RecomputeScope::location_day(location.id.clone(), date);
                report.counts += merge.recompute_daily_from_hourly(&scope).await?;
            }
            Ok(report)
        }
    }
}

pub struct Pipeline<A, S> {
    client: FetchClient<A>,
    merge: MergeLayer<S>,
    settings: RunSettings,
}

impl<A: WeatherApi, S: WeatherStore> Pipeline<A, S> {
    pub fn new(client: FetchClient<A>, merge: MergeLayer<S>, settings: RunSettings) -> Self {
        Self {
            client,
            merge,
            settings,
        }
    }

    pub fn merge(&self) -> &MergeLayer<S> {
        &self.merge
    }

    pub fn client(&self) -> &FetchClient<A> {
        &self.client
    }

    /// Run every stage for one date
    ///
    /// Storage failures and an expired credential end the run with an error.
    /// Fetch failures end up in the summary.
    pub async fn run_date(
        &self,
        locations: &[Location],
        credential: &Credential,
        date: NaiveDate,
    ) -> Result<RunSummary, RunError> {
        let batch = BatchScheduler::new(&self.client, &self.settings.scheduler)
            .run(locations, credential, date)
            .await?;

        let mut hourly = self.merge.merge_hourly(&batch.hourly).await?;
        let mut daily = store_daily(
            &self.merge,
            self.settings.daily_source,
            &batch.daily,
            &batch.succeeded,
            date,
        )
        .await?;

        let mut hourly_counts: HashMap<&Location, usize> = HashMap::new();
        for stamped in &batch.hourly {
            *hourly_counts.entry(&stamped.location).or_default() += 1;
        }
        let mut daily_counts: HashMap<&Location, usize> = HashMap::new();
        for stamped in &batch.daily {
            *daily_counts.entry(&stamped.location).or_default() += 1;
        }

        let mut tallies: HashMap<Location, LocationTally> = batch
            .succeeded
            .iter()
            .map(|location| {
                let tally = LocationTally {
                    location: location.clone(),
                    status: LocationStatus::Fetched,
                    hourly: hourly_counts.get(location).copied().unwrap_or(0),
                    daily: daily_counts.get(location).copied().unwrap_or(0),
                };
                (location.clone(), tally)
            })
            .collect();

        let failed = match &self.settings.sweep {
            Some(settings) if !batch.failed.is_empty() => {
                let sweep = RetrySweep::new(
                    &self.client,
                    &self.merge,
                    settings,
                    self.settings.daily_source,
                );
                let result = sweep.retry(batch.failed, credential, date).await?;
                hourly += result.hourly;
                daily += result.daily;
                for r in result.recovered {
                    let tally = LocationTally {
                        location: r.location.clone(),
                        status: LocationStatus::Recovered,
                        hourly: r.hourly,
                        daily: r.daily,
                    };
                    tallies.insert(r.location, tally);
                }
                result.still_failed
            }
            _ => batch.failed,
        };

        for f in failed {
            let tally = LocationTally {
                location: f.location.clone(),
                status: LocationStatus::Failed {
                    attempts: f.attempts,
                    reason: f.reason,
                },
                hourly: 0,
                daily: 0,
            };
            tallies.insert(f.location, tally);
        }

        // report in input order
        let tallies: Vec<LocationTally> = locations
            .iter()
            .filter_map(|location| tallies.remove(location))
            .collect();

        let mut unclassified = hourly.unclassified;
        for location in daily.unclassified {
            if !unclassified.contains(&location) {
                unclassified.push(location);
            }
        }

        let summary = RunSummary {
            date,
            batches: batch.batches,
            tallies,
            unclassified,
            hourly: hourly.counts,
            daily: daily.counts,
        };
        info!("{}", summary);
        Ok(summary)
    }
}
