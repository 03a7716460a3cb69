//! In-process `WeatherStore` with the same keyed upsert semantics as MySQL

use chrono::{NaiveDate, NaiveDateTime};
use histwx_core::{
    rollup_daily, DailySummary, HourlyObservation, RecomputeScope, StoreResult, StoreStats,
    UpsertOutcome, WeatherStore,
};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    hourly: BTreeMap<(String, NaiveDateTime), HourlyObservation>,
    daily: BTreeMap<(String, NaiveDate), DailySummary>,
}

/// Ordered in-memory tables; backs `--dry-run`
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn hourly_rows(&self) -> Vec<HourlyObservation> {
        self.tables.lock().await.hourly.values().cloned().collect()
    }

    pub async fn daily_rows(&self) -> Vec<DailySummary> {
        self.tables.lock().await.daily.values().cloned().collect()
    }

    pub async fn daily(&self, location_id: &str, date: NaiveDate) -> Option<DailySummary> {
        self.tables
            .lock()
            .await
            .daily
            .get(&(location_id.to_string(), date))
            .cloned()
    }
}

fn outcome<T>(previous: Option<T>) -> UpsertOutcome {
    match previous {
        Some(_) => UpsertOutcome::Updated,
        None => UpsertOutcome::Inserted,
    }
}

#[async_trait::async_trait]
impl WeatherStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn upsert_hourly(&self, row: &HourlyObservation) -> StoreResult<UpsertOutcome> {
        let key = (row.location_id.clone(), row.datetime);
        let previous = self.tables.lock().await.hourly.insert(key, row.clone());
        Ok(outcome(previous))
    }

    async fn upsert_daily(&self, row: &DailySummary) -> StoreResult<UpsertOutcome> {
        let key = (row.location_id.clone(), row.date);
        let previous = self.tables.lock().await.daily.insert(key, row.clone());
        Ok(outcome(previous))
    }

    async fn daily_aggregates(&self, scope: &RecomputeScope) -> StoreResult<Vec<DailySummary>> {
        let tables = self.tables.lock().await;
        Ok(rollup_daily(
            tables
                .hourly
                .values()
                .filter(|o| {
                    scope.matches(&o.location_id, &o.location_name, o.datetime.date())
                }),
        ))
    }

    async fn stats(&self, location_id: Option<&str>) -> StoreResult<StoreStats> {
        let tables = self.tables.lock().await;
        let wanted = |id: &str| location_id.map_or(true, |l| l == id);

        let hourly: Vec<_> = tables
            .hourly
            .values()
            .filter(|o| wanted(&o.location_id))
            .map(|o| o.datetime)
            .collect();
        let daily: Vec<_> = tables
            .daily
            .values()
            .filter(|d| wanted(&d.location_id))
            .map(|d| d.date)
            .collect();

        Ok(StoreStats {
            hourly_count: hourly.len() as i64,
            daily_count: daily.len() as i64,
            first_hourly: hourly.iter().min().copied(),
            latest_hourly: hourly.iter().max().copied(),
            latest_daily: daily.iter().max().copied(),
        })
    }
}
