//! Scriptable API and fixtures shared by the unit tests

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use histwx_archive::LocationClassifier;
use histwx_core::{Classification, DailyRecord, HourlyRecord, Location};
use histwx_ingest::{ApiResponse, Credential, FetchError, WeatherApi};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::time::Instant;

/// Serves 24 hourly records and one daily record per location, except for
/// locations told to fail a number of times first
#[derive(Default)]
pub struct MockApi {
    failures: Mutex<HashMap<String, usize>>,
    rejected: HashSet<String>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `times` requests for this location before succeeding
    pub fn failing(self, location_id: &str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(location_id.to_string(), times);
        self
    }

    /// Answer 401 for this location on every request
    pub fn rejecting(mut self, location_id: &str) -> Self {
        self.rejected.insert(location_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, location_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == location_id)
            .count()
    }
}

#[async_trait::async_trait]
impl WeatherApi for MockApi {
    async fn historical(
        &self,
        _credential: &Credential,
        location_id: &str,
        date: NaiveDate,
    ) -> Result<ApiResponse, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((location_id.to_string(), Instant::now()));

        if self.rejected.contains(location_id) {
            return Err(FetchError::Status { status: 401 });
        }
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(location_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::Status { status: 503 });
            }
        }

        Ok(day_of_weather(date))
    }
}

pub fn day_of_weather(date: NaiveDate) -> ApiResponse {
    let hourly = (0..24)
        .map(|hour| HourlyRecord {
            time: Some(format!("{}T{:02}:00+08:00", date.format("%Y-%m-%d"), hour)),
            temp: Some(20.0 + hour as f64 / 2.0),
            precip: Some(0.0),
            humidity: Some(60.0),
            ..Default::default()
        })
        .collect();
    let daily = vec![DailyRecord {
        date: Some(date.format("%Y-%m-%d").to_string()),
        temp_min: Some(20.0),
        temp_max: Some(31.5),
        ..Default::default()
    }];
    ApiResponse::Success { hourly, daily }
}

pub fn credential() -> Credential {
    let now = Utc::now();
    Credential::new("test-token", now, now + ChronoDuration::hours(10))
}

pub fn locations(n: usize) -> Vec<Location> {
    (0..n)
        .map(|i| Location::new(format!("1011201{:02}", i + 1), format!("区{}", i + 1)))
        .collect()
}

pub fn classifier_for(locations: &[Location]) -> LocationClassifier {
    LocationClassifier::from_entries(locations.iter().map(|l| {
        (
            l.id.clone(),
            Classification {
                province: "山东".into(),
                city: "济南".into(),
            },
        )
    }))
    .unwrap()
}

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 21).unwrap()
}
