//! `WeatherStore` implementation backed by MySQL

use crate::DbClient;
use histwx_core::{
    DailySummary, HourlyObservation, RecomputeScope, StoreResult, StoreStats, UpsertOutcome,
    WeatherStore,
};

#[async_trait::async_trait]
impl WeatherStore for DbClient {
    async fn ping(&self) -> StoreResult<()> {
        Ok(DbClient::ping(self).await?)
    }

    async fn upsert_hourly(&self, row: &HourlyObservation) -> StoreResult<UpsertOutcome> {
        Ok(self.upsert_hourly_row(row).await?)
    }

    async fn upsert_daily(&self, row: &DailySummary) -> StoreResult<UpsertOutcome> {
        Ok(self.upsert_daily_row(row).await?)
    }

    async fn daily_aggregates(&self, scope: &RecomputeScope) -> StoreResult<Vec<DailySummary>> {
        Ok(self.daily_aggregates_for(scope).await?)
    }

    async fn stats(&self, location_id: Option<&str>) -> StoreResult<StoreStats> {
        Ok(self.table_stats(location_id).await?)
    }
}
