//! Batched, throttled pass over every location for one date

use chrono::NaiveDate;
use histwx_core::{DailyRecord, HourlyRecord, Location, Stamped};
use histwx_ingest::{
    Credential, FailedFetch, FetchClient, FetchError, FetchOutcome, RetryPolicy, WeatherApi,
};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info};

use crate::run::RunError;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub batch_size: usize,
    /// Pause between requests inside a batch
    pub request_delay: Duration,
    /// Pause between batches
    pub batch_delay: Duration,
    pub progress_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            batch_size: 20,
            request_delay: Duration::from_millis(500),
            batch_delay: Duration::from_secs(2),
            progress_interval: Duration::from_secs(60),
            retry: RetryPolicy::primary(),
        }
    }
}

/// Everything the primary pass produced, in location order
#[derive(Debug, Default)]
pub struct BatchRun {
    pub hourly: Vec<Stamped<HourlyRecord>>,
    pub daily: Vec<Stamped<DailyRecord>>,
    pub succeeded: Vec<Location>,
    pub failed: Vec<FailedFetch>,
    pub batches: usize,
}

impl BatchRun {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Point-in-time view of a run's progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done as f64 * 100.0 / self.total as f64
    }

    /// Locations per second
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.done as f64 / secs
        } else {
            0.0
        }
    }

    pub fn eta(&self) -> Option<Duration> {
        let rate = self.rate();
        (rate > 0.0).then(|| Duration::from_secs_f64((self.total - self.done) as f64 / rate))
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.1}%), elapsed {}s, {:.2} locations/s",
            self.done,
            self.total,
            self.percent(),
            self.elapsed.as_secs(),
            self.rate()
        )?;
        match self.eta() {
            Some(eta) => write!(f, ", ETA {}s", eta.as_secs()),
            None => write!(f, ", ETA unknown"),
        }
    }
}

/// Emits progress at a fixed interval and on the final location
pub struct ProgressTracker {
    total: usize,
    done: usize,
    started: Instant,
    last_report: Instant,
    interval: Duration,
}

impl ProgressTracker {
    pub fn new(total: usize, interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            total,
            done: 0,
            started: now,
            last_report: now,
            interval,
        }
    }

    pub fn done(&self) -> usize {
        self.done
    }

    /// Count one finished location; returns a snapshot when one is due
    pub fn advance(&mut self) -> Option<Progress> {
        self.done += 1;
        let now = Instant::now();
        if self.done < self.total && now.duration_since(self.last_report) < self.interval {
            return None;
        }
        self.last_report = now;
        Some(Progress {
            done: self.done,
            total: self.total,
            elapsed: now.duration_since(self.started),
        })
    }
}

pub struct BatchScheduler<'a, A> {
    client: &'a FetchClient<A>,
    settings: &'a SchedulerSettings,
}

impl<'a, A: WeatherApi> BatchScheduler<'a, A> {
    pub fn new(client: &'a FetchClient<A>, settings: &'a SchedulerSettings) -> Self {
        Self { client, settings }
    }

    /// Fetch every location once, sequentially
    ///
    /// A failed location is recorded and the pass moves on. Only an expired
    /// credential stops the pass early.
    pub async fn run(
        &self,
        locations: &[Location],
        credential: &Credential,
        date: NaiveDate,
    ) -> Result<BatchRun, RunError> {
        let batch_size = self.settings.batch_size.max(1);
        let total_batches = locations.len().div_ceil(batch_size);
        let mut tracker = ProgressTracker::new(locations.len(), self.settings.progress_interval);
        let mut run = BatchRun::default();

        info!(
            "Fetching {} locations for {} in {} batches of up to {}",
            locations.len(),
            date,
            total_batches,
            batch_size
        );

        for (index, batch) in locations.chunks(batch_size).enumerate() {
            if index > 0 {
                sleep(self.settings.batch_delay).await;
            }
            run.batches += 1;
            info!("Batch {}/{} ({} locations)", index + 1, total_batches, batch.len());

            for (position, location) in batch.iter().enumerate() {
                if position > 0 {
                    sleep(self.settings.request_delay).await;
                }
                if credential.is_expired() {
                    return Err(RunError::CredentialExpired {
                        completed: tracker.done(),
                    });
                }

                match self
                    .client
                    .fetch(credential, location, date, &self.settings.retry)
                    .await
                {
                    FetchOutcome::Fetched(weather) => {
                        info!(
                            location = %location,
                            "Fetched {} hourly and {} daily records",
                            weather.hourly.len(),
                            weather.daily.len()
                        );
                        let (hourly, daily) = weather.into_stamped();
                        run.hourly.extend(hourly);
                        run.daily.extend(daily);
                        run.succeeded.push(location.clone());
                    }
                    FetchOutcome::Failed(failed)
                        if failed.reason == FetchError::CredentialExpired =>
                    {
                        return Err(RunError::CredentialExpired {
                            completed: tracker.done(),
                        });
                    }
                    FetchOutcome::Failed(failed) if failed.reason.is_auth_rejected() => {
                        return Err(RunError::CredentialRejected {
                            location: failed.location,
                            reason: failed.reason,
                        });
                    }
                    FetchOutcome::Failed(failed) => {
                        error!(
                            location = %location,
                            attempts = failed.attempts,
                            "Fetch failed: {}",
                            failed.reason
                        );
                        run.failed.push(failed);
                    }
                }

                if let Some(progress) = tracker.advance() {
                    info!("Progress: {}", progress);
                }
            }
        }

        info!(
            "Primary pass done: {}/{} locations fetched, {} hourly records",
            run.succeeded.len(),
            locations.len(),
            run.hourly.len()
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{credential, date, locations, MockApi};
    use chrono::{Duration as ChronoDuration, Utc};

    fn settings(batch_size: usize) -> SchedulerSettings {
        SchedulerSettings {
            batch_size,
            retry: RetryPolicy::new(0, Duration::from_secs(2)),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_partition_and_outcome_totals() {
        let locations = locations(7);
        let client = FetchClient::new(MockApi::new().failing(&locations[4].id, usize::MAX));
        let settings = settings(3);

        let started = Instant::now();
        let run = BatchScheduler::new(&client, &settings)
            .run(&locations, &credential(), date())
            .await
            .unwrap();

        assert_eq!(run.batches, 3);
        assert_eq!(run.attempted(), 7);
        assert_eq!(run.succeeded.len(), 6);
        assert_eq!(run.failed.len(), 1);
        assert_eq!(run.failed[0].location, locations[4]);
        assert_eq!(run.hourly.len(), 6 * 24);
        assert_eq!(run.daily.len(), 6);

        // batches of 3, 3, 1: four in-batch pauses and two between batches
        assert_eq!(started.elapsed(), Duration::from_millis(4 * 500 + 2 * 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_follow_location_order() {
        let locations = locations(3);
        let client = FetchClient::new(MockApi::new());
        let settings = settings(20);

        let run = BatchScheduler::new(&client, &settings)
            .run(&locations, &credential(), date())
            .await
            .unwrap();

        assert_eq!(run.batches, 1);
        assert_eq!(run.succeeded, locations);
        assert_eq!(run.hourly[0].location, locations[0]);
        assert_eq!(run.hourly[24].location, locations[1]);
        assert_eq!(run.daily[2].location, locations[2]);

        let order: Vec<_> = client.api().calls().into_iter().map(|(id, _)| id).collect();
        let ids: Vec<_> = locations.iter().map(|l| l.id.clone()).collect();
        assert_eq!(order, ids);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_location_list() {
        let client = FetchClient::new(MockApi::new());
        let settings = settings(20);
        let run = BatchScheduler::new(&client, &settings)
            .run(&[], &credential(), date())
            .await
            .unwrap();
        assert_eq!(run.batches, 0);
        assert_eq!(run.attempted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_credential_aborts() {
        let client = FetchClient::new(MockApi::new());
        let settings = settings(20);
        let now = Utc::now();
        let expired = Credential::new(
            "t",
            now - ChronoDuration::hours(11),
            now - ChronoDuration::hours(1),
        );

        let err = BatchScheduler::new(&client, &settings)
            .run(&locations(2), &expired, date())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::CredentialExpired { completed: 0 }));
        assert!(client.api().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credential_aborts_pass() {
        let locations = locations(3);
        let client = FetchClient::new(MockApi::new().rejecting(&locations[1].id));
        let settings = SchedulerSettings::default();

        let err = BatchScheduler::new(&client, &settings)
            .run(&locations, &credential(), date())
            .await
            .unwrap_err();

        match err {
            RunError::CredentialRejected { location, reason } => {
                assert_eq!(location, locations[1]);
                assert_eq!(reason, FetchError::Status { status: 401 });
            }
            other => panic!("expected a rejection, got {:?}", other),
        }
        assert_eq!(client.api().calls_for(&locations[1].id), 1);
        assert_eq!(client.api().calls_for(&locations[2].id), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_due_on_interval_and_last() {
        let mut tracker = ProgressTracker::new(3, Duration::from_secs(60));
        assert!(tracker.advance().is_none());

        tokio::time::advance(Duration::from_secs(60)).await;
        let progress = tracker.advance().unwrap();
        assert_eq!(progress.done, 2);
        assert_eq!(progress.elapsed, Duration::from_secs(60));

        let last = tracker.advance().unwrap();
        assert_eq!(last.done, 3);
        assert_eq!(last.percent(), 100.0);
    }

    #[test]
    fn test_progress_display() {
        let progress = Progress {
            done: 5,
            total: 20,
            elapsed: Duration::from_secs(10),
        };
        assert_eq!(
            progress.to_string(),
            "5/20 (25.0%), elapsed 10s, 0.50 locations/s, ETA 30s"
        );

        let fresh = Progress {
            done: 0,
            total: 20,
            elapsed: Duration::ZERO,
        };
        assert!(fresh.to_string().ends_with("ETA unknown"));
    }
}
