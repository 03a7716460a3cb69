//! Second chance for locations the primary pass gave up on

use chrono::NaiveDate;
use histwx_archive::{MergeLayer, MergeReport};
use histwx_core::{Location, SummarySource, WeatherStore};
use histwx_ingest::{
    Credential, FailedFetch, FetchClient, FetchError, FetchOutcome, RetryPolicy, WeatherApi,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::run::{store_daily, RunError};

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub retry: RetryPolicy,
    /// Wait before each sweep attempt
    pub pause: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::sweep(),
            pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Default)]
pub struct SweepResult {
    pub recovered: Vec<Recovered>,
    pub still_failed: Vec<FailedFetch>,
    pub hourly: MergeReport,
    pub daily: MergeReport,
}

/// A location the sweep fetched, with what it received
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub location: Location,
    pub hourly: usize,
    pub daily: usize,
}

pub struct RetrySweep<'a, A, S> {
    client: &'a FetchClient<A>,
    merge: &'a MergeLayer<S>,
    settings: &'a SweepSettings,
    daily_source: SummarySource,
}

impl<'a, A: WeatherApi, S: WeatherStore> RetrySweep<'a, A, S> {
    pub fn new(
        client: &'a FetchClient<A>,
        merge: &'a MergeLayer<S>,
        settings: &'a SweepSettings,
        daily_source: SummarySource,
    ) -> Self {
        Self {
            client,
            merge,
            settings,
            daily_source,
        }
    }

    /// Retry each failed location with the sweep budget, merging every
    /// recovered location as soon as it arrives
    pub async fn retry(
        &self,
        failed: Vec<FailedFetch>,
        credential: &Credential,
        date: NaiveDate,
    ) -> Result<SweepResult, RunError> {
        let mut result = SweepResult::default();
        if failed.is_empty() {
            return Ok(result);
        }
        info!("Retry sweep over {} failed locations", failed.len());

        for previous in failed {
            sleep(self.settings.pause).await;
            if credential.is_expired() {
                return Err(RunError::CredentialExpired {
                    completed: result.recovered.len() + result.still_failed.len(),
                });
            }

            let location = previous.location;
            match self
                .client
                .fetch(credential, &location, date, &self.settings.retry)
                .await
            {
                FetchOutcome::Fetched(weather) => {
                    let (hourly, daily) = weather.into_stamped();
                    info!(location = %location, "Recovered {} hourly records", hourly.len());

                    result.hourly += self.merge.merge_hourly(&hourly).await?;
                    result.daily += store_daily(
                        self.merge,
                        self.daily_source,
                        &daily,
                        std::slice::from_ref(&location),
                        date,
                    )
                    .await?;
                    result.recovered.push(Recovered {
                        location,
                        hourly: hourly.len(),
                        daily: daily.len(),
                    });
                }
                FetchOutcome::Failed(failed) if failed.reason == FetchError::CredentialExpired => {
                    return Err(RunError::CredentialExpired {
                        completed: result.recovered.len() + result.still_failed.len(),
                    });
                }
                FetchOutcome::Failed(failed) if failed.reason.is_auth_rejected() => {
                    return Err(RunError::CredentialRejected {
                        location: failed.location,
                        reason: failed.reason,
                    });
                }
                FetchOutcome::Failed(failed) => {
                    warn!(
                        location = %location,
                        attempts = previous.attempts + failed.attempts,
                        "Still failing after sweep: {}",
                        failed.reason
                    );
                    result.still_failed.push(FailedFetch {
                        attempts: previous.attempts + failed.attempts,
                        ..failed
                    });
                }
            }
        }

        info!(
            "Retry sweep recovered {}, {} still failing",
            result.recovered.len(),
            result.still_failed.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{classifier_for, credential, date, locations, MockApi};
    use histwx_archive::MemoryStore;
    use tokio::time::Instant;

    fn failed(location: &Location) -> FailedFetch {
        FailedFetch {
            location: location.clone(),
            attempts: 4,
            reason: FetchError::Status { status: 503 },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_location_merged_immediately() {
        let locations = locations(2);
        let client = FetchClient::new(
            MockApi::new()
                .failing(&locations[0].id, 2)
                .failing(&locations[1].id, usize::MAX),
        );
        let merge = MergeLayer::new(MemoryStore::new(), classifier_for(&locations));
        let settings = SweepSettings {
            retry: RetryPolicy::new(2, Duration::from_secs(5)),
            pause: Duration::from_secs(1),
        };
        let sweep = RetrySweep::new(&client, &merge, &settings, SummarySource::Hourly);

        let started = Instant::now();
        let result = sweep
            .retry(
                locations.iter().map(failed).collect(),
                &credential(),
                date(),
            )
            .await
            .unwrap();

        assert_eq!(result.recovered.len(), 1);
        assert_eq!(result.recovered[0].location, locations[0]);
        assert_eq!(result.recovered[0].hourly, 24);
        assert_eq!(result.hourly.counts.inserted, 24);
        assert_eq!(result.daily.counts.inserted, 1);

        assert_eq!(result.still_failed.len(), 1);
        assert_eq!(result.still_failed[0].location, locations[1]);
        assert_eq!(result.still_failed[0].attempts, 4 + 3);

        // pause + 5s + 10s for the first, pause + 5s + 10s for the second
        assert_eq!(started.elapsed(), Duration::from_secs(2 * (1 + 5 + 10)));

        let daily = merge.store().daily_rows().await;
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].record_count, Some(24));
    }

    #[tokio::test(start_paused = true)]
    async fn test_identifier_carried_not_name() {
        let twins = vec![
            Location::new("101010100", "新区"),
            Location::new("101280601", "新区"),
        ];
        let client = FetchClient::new(MockApi::new());
        let merge = MergeLayer::new(MemoryStore::new(), classifier_for(&twins));
        let settings = SweepSettings::default();
        let sweep = RetrySweep::new(&client, &merge, &settings, SummarySource::Api);

        let result = sweep
            .retry(vec![failed(&twins[1])], &credential(), date())
            .await
            .unwrap();

        assert_eq!(result.recovered[0].location.id, "101280601");
        assert_eq!(client.api().calls_for("101280601"), 1);
        assert_eq!(client.api().calls_for("101010100"), 0);
        assert_eq!(result.daily.counts.inserted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credential_aborts_sweep() {
        let locations = locations(2);
        let client = FetchClient::new(MockApi::new().rejecting(&locations[0].id));
        let merge = MergeLayer::new(MemoryStore::new(), classifier_for(&locations));
        let settings = SweepSettings::default();
        let sweep = RetrySweep::new(&client, &merge, &settings, SummarySource::Hourly);

        let err = sweep
            .retry(
                locations.iter().map(failed).collect(),
                &credential(),
                date(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::CredentialRejected { .. }));
        assert_eq!(client.api().calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_to_sweep() {
        let client = FetchClient::new(MockApi::new());
        let merge = MergeLayer::new(MemoryStore::new(), classifier_for(&[]));
        let settings = SweepSettings::default();
        let sweep = RetrySweep::new(&client, &merge, &settings, SummarySource::Hourly);

        let result = sweep.retry(vec![], &credential(), date()).await.unwrap();
        assert!(result.recovered.is_empty());
        assert!(client.api().calls().is_empty());
    }
}
