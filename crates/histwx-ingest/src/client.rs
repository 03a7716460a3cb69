//! Historical weather fetch client with bounded retry

use chrono::NaiveDate;
use histwx_core::{format_api_date, DailyRecord, HourlyRecord, Location, Stamped};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::credential::Credential;
use crate::payload::ApiResponse;
use crate::retry::RetryPolicy;
use crate::{FetchError, IngestError, IngestResult};

const HISTORICAL_PATH: &str = "v7/historical/weather";

/// One request to the remote API, no retries
#[async_trait::async_trait]
pub trait WeatherApi: Send + Sync {
    async fn historical(
        &self,
        credential: &Credential,
        location_id: &str,
        date: NaiveDate,
    ) -> Result<ApiResponse, FetchError>;
}

/// `WeatherApi` over HTTPS
pub struct HttpWeatherApi {
    client: Client,
    base_url: Url,
}

impl HttpWeatherApi {
    pub fn new(base_url: &str, timeout: Duration) -> IngestResult<Self> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| IngestError::Client(format!("{}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| IngestError::Client(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn endpoint(&self) -> Result<Url, FetchError> {
        self.base_url
            .join(HISTORICAL_PATH)
            .map_err(|e| FetchError::Transport(e.to_string()))
    }

    /// Check the API host answers at all
    ///
    /// Any HTTP response counts; only transport failures are reported.
    pub async fn probe(&self) -> Result<(), FetchError> {
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!(status = %response.status(), "API host reachable");
        Ok(())
    }
}

#[async_trait::async_trait]
impl WeatherApi for HttpWeatherApi {
    async fn historical(
        &self,
        credential: &Credential,
        location_id: &str,
        date: NaiveDate,
    ) -> Result<ApiResponse, FetchError> {
        let date = format_api_date(date);
        let response = self
            .client
            .get(self.endpoint()?)
            .query(&[("location", location_id), ("date", date.as_str())])
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        ApiResponse::from_json(&body)
    }
}

/// Everything the API returned for one location and date
#[derive(Debug, Clone, PartialEq)]
pub struct LocationWeather {
    pub location: Location,
    pub hourly: Vec<HourlyRecord>,
    pub daily: Vec<DailyRecord>,
}

impl LocationWeather {
    pub fn is_empty(&self) -> bool {
        self.hourly.is_empty() && self.daily.is_empty()
    }

    /// Tag every record with the location it belongs to
    pub fn into_stamped(self) -> (Vec<Stamped<HourlyRecord>>, Vec<Stamped<DailyRecord>>) {
        let location = self.location;
        let hourly = self
            .hourly
            .into_iter()
            .map(|r| Stamped::new(location.clone(), r))
            .collect();
        let daily = self
            .daily
            .into_iter()
            .map(|r| Stamped::new(location.clone(), r))
            .collect();
        (hourly, daily)
    }
}

/// A location whose retry budget ran out
#[derive(Debug, Clone, PartialEq)]
pub struct FailedFetch {
    pub location: Location,
    pub attempts: u32,
    pub reason: FetchError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(LocationWeather),
    Failed(FailedFetch),
}

impl FetchOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched(_))
    }
}

/// Retrying wrapper over a `WeatherApi`
///
/// A failed location is a value, not an error: `fetch` always returns.
pub struct FetchClient<A> {
    api: A,
}

impl<A: WeatherApi> FetchClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn fetch(
        &self,
        credential: &Credential,
        location: &Location,
        date: NaiveDate,
        policy: &RetryPolicy,
    ) -> FetchOutcome {
        let max_attempts = policy.max_attempts();
        let mut attempts = 0;

        loop {
            if credential.is_expired() {
                return FetchOutcome::Failed(FailedFetch {
                    location: location.clone(),
                    attempts,
                    reason: FetchError::CredentialExpired,
                });
            }

            attempts += 1;
            let error = match self.api.historical(credential, &location.id, date).await {
                Ok(ApiResponse::Success { hourly, daily }) => {
                    debug!(
                        location = %location,
                        hourly = hourly.len(),
                        daily = daily.len(),
                        attempts,
                        "Fetched"
                    );
                    return FetchOutcome::Fetched(LocationWeather {
                        location: location.clone(),
                        hourly,
                        daily,
                    });
                }
                Ok(ApiResponse::Error { code, message }) => FetchError::Api { code, message },
                Err(e) => e,
            };

            if !error.is_retryable() || attempts >= max_attempts {
                warn!(
                    location = %location,
                    attempts,
                    "Giving up on {}: {}",
                    date,
                    error
                );
                return FetchOutcome::Failed(FailedFetch {
                    location: location.clone(),
                    attempts,
                    reason: error,
                });
            }

            let delay = policy.delay_for(attempts);
            warn!(
                location = %location,
                attempt = attempts,
                of = max_attempts,
                "Request failed ({}), retrying in {:?}",
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
