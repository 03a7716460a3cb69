//! Query operations for the weather tables

use crate::schema::{DailyAggregateRow, HourlyRow};
use crate::{DbClient, DbResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use histwx_core::{DailySummary, HourlyObservation, RecomputeScope, StoreStats, UpsertOutcome};
use sqlx::Row;
use tracing::{debug, instrument};

const UPSERT_HOURLY: &str = r#"
    INSERT INTO hourly_weather (
        location_id, location_name, province, city, datetime,
        temp_celsius, humidity_percent, precip_mm, pressure_hpa,
        wind_scale, wind_speed_kmh, wind_dir, text
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        location_name = VALUES(location_name),
        province = VALUES(province),
        city = VALUES(city),
        temp_celsius = VALUES(temp_celsius),
        humidity_percent = VALUES(humidity_percent),
        precip_mm = VALUES(precip_mm),
        pressure_hpa = VALUES(pressure_hpa),
        wind_scale = VALUES(wind_scale),
        wind_speed_kmh = VALUES(wind_speed_kmh),
        wind_dir = VALUES(wind_dir),
        text = VALUES(text)
"#;

const UPSERT_DAILY: &str = r#"
    INSERT INTO daily_weather (
        location_id, location_name, province, city, date,
        temp_min_celsius, temp_max_celsius, temp_avg_celsius,
        precip_mm, humidity_percent, pressure_hpa, wind_speed_kmh,
        record_count, source
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON DUPLICATE KEY UPDATE
        location_name = VALUES(location_name),
        province = VALUES(province),
        city = VALUES(city),
        temp_min_celsius = VALUES(temp_min_celsius),
        temp_max_celsius = VALUES(temp_max_celsius),
        temp_avg_celsius = VALUES(temp_avg_celsius),
        precip_mm = VALUES(precip_mm),
        humidity_percent = VALUES(humidity_percent),
        pressure_hpa = VALUES(pressure_hpa),
        wind_speed_kmh = VALUES(wind_speed_kmh),
        record_count = VALUES(record_count),
        source = VALUES(source)
"#;

const DAILY_AGGREGATES: &str = r#"
    SELECT
        location_id,
        MAX(location_name) AS location_name,
        MAX(province) AS province,
        MAX(city) AS city,
        DATE(datetime) AS date,
        CAST(MIN(temp_celsius) AS DOUBLE) AS temp_min,
        CAST(MAX(temp_celsius) AS DOUBLE) AS temp_max,
        CAST(AVG(temp_celsius) AS DOUBLE) AS temp_avg,
        CAST(SUM(COALESCE(precip_mm, 0)) AS DOUBLE) AS precip_total,
        CAST(AVG(humidity_percent) AS DOUBLE) AS humidity_avg,
        CAST(AVG(pressure_hpa) AS DOUBLE) AS pressure_avg,
        CAST(AVG(wind_speed_kmh) AS DOUBLE) AS wind_speed_avg,
        COUNT(*) AS record_count
    FROM hourly_weather
    WHERE (? IS NULL OR location_id = ?)
      AND (? IS NULL OR location_name = ?)
      AND (? IS NULL OR (datetime >= ? AND datetime < ?))
    GROUP BY location_id, DATE(datetime)
    ORDER BY location_id, date
"#;

impl DbClient {
    /// Insert or overwrite one hourly row.
    ///
    /// The existence probe and the upsert share a transaction, so the
    /// outcome is exact even when the incoming values equal the stored ones.
    #[instrument(skip(self, row), fields(location = %row.location_id, at = %row.datetime))]
    pub async fn upsert_hourly_row(&self, row: &HourlyObservation) -> DbResult<UpsertOutcome> {
        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query(
            "SELECT 1 FROM hourly_weather WHERE location_id = ? AND datetime = ? FOR UPDATE",
        )
        .bind(&row.location_id)
        .bind(row.datetime)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(UPSERT_HOURLY)
            .bind(&row.location_id)
            .bind(&row.location_name)
            .bind(&row.province)
            .bind(&row.city)
            .bind(row.datetime)
            .bind(row.temp)
            .bind(row.humidity)
            .bind(row.precip)
            .bind(row.pressure)
            .bind(row.wind_scale.as_deref())
            .bind(row.wind_speed)
            .bind(row.wind_dir.as_deref())
            .bind(row.text.as_deref())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let outcome = if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        debug!(?outcome, "Upserted hourly row");
        Ok(outcome)
    }

    /// Insert or overwrite one daily row; every non-key column is replaced
    #[instrument(skip(self, row), fields(location = %row.location_id, date = %row.date))]
    pub async fn upsert_daily_row(&self, row: &DailySummary) -> DbResult<UpsertOutcome> {
        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query(
            "SELECT 1 FROM daily_weather WHERE location_id = ? AND date = ? FOR UPDATE",
        )
        .bind(&row.location_id)
        .bind(row.date)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(UPSERT_DAILY)
            .bind(&row.location_id)
            .bind(&row.location_name)
            .bind(&row.province)
            .bind(&row.city)
            .bind(row.date)
            .bind(row.temp_min)
            .bind(row.temp_max)
            .bind(row.temp_avg)
            .bind(row.precip_total)
            .bind(row.humidity_avg)
            .bind(row.pressure_avg)
            .bind(row.wind_speed_avg)
            .bind(row.record_count)
            .bind(row.source.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let outcome = if existing.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        debug!(?outcome, "Upserted daily row");
        Ok(outcome)
    }

    /// Aggregate stored hourly rows per (location, calendar date)
    #[instrument(skip(self))]
    pub async fn daily_aggregates_for(
        &self,
        scope: &RecomputeScope,
    ) -> DbResult<Vec<DailySummary>> {
        let (id, name, date) = match scope {
            RecomputeScope::All => (None, None, None),
            RecomputeScope::Location { id, name, date } => {
                (Some(id.as_str()), name.as_deref(), *date)
            }
        };
        // half-open range so the datetime index can be used
        let day_start = date.map(|d| d.and_time(NaiveTime::MIN));
        let day_end = date
            .and_then(|d| d.succ_opt())
            .map(|d| d.and_time(NaiveTime::MIN));

        let rows = sqlx::query_as::<_, DailyAggregateRow>(DAILY_AGGREGATES)
            .bind(id)
            .bind(id)
            .bind(name)
            .bind(name)
            .bind(day_start)
            .bind(day_start)
            .bind(day_end)
            .fetch_all(self.pool())
            .await?;

        debug!("Aggregated {} location-days from hourly rows", rows.len());
        Ok(rows.into_iter().map(DailySummary::from).collect())
    }

    /// Row counts and recency, optionally restricted to one location
    #[instrument(skip(self))]
    pub async fn table_stats(&self, location_id: Option<&str>) -> DbResult<StoreStats> {
        let hourly = sqlx::query(
            r#"
            SELECT COUNT(*) AS hourly_count,
                   MIN(datetime) AS first_hourly,
                   MAX(datetime) AS latest_hourly
            FROM hourly_weather
            WHERE (? IS NULL OR location_id = ?)
            "#,
        )
        .bind(location_id)
        .bind(location_id)
        .fetch_one(self.pool())
        .await?;

        let daily = sqlx::query(
            r#"
            SELECT COUNT(*) AS daily_count,
                   MAX(date) AS latest_daily
            FROM daily_weather
            WHERE (? IS NULL OR location_id = ?)
            "#,
        )
        .bind(location_id)
        .bind(location_id)
        .fetch_one(self.pool())
        .await?;

        Ok(StoreStats {
            hourly_count: hourly.try_get("hourly_count")?,
            daily_count: daily.try_get("daily_count")?,
            first_hourly: hourly.try_get::<Option<NaiveDateTime>, _>("first_hourly")?,
            latest_hourly: hourly.try_get::<Option<NaiveDateTime>, _>("latest_hourly")?,
            latest_daily: daily.try_get::<Option<NaiveDate>, _>("latest_daily")?,
        })
    }

    /// Fetch one stored hourly row by key
    #[instrument(skip(self))]
    pub async fn get_hourly(
        &self,
        location_id: &str,
        datetime: NaiveDateTime,
    ) -> DbResult<Option<HourlyRow>> {
        let row = sqlx::query_as::<_, HourlyRow>(
            r#"
            SELECT location_id, location_name, province, city, datetime,
                   CAST(temp_celsius AS DOUBLE) AS temp_celsius,
                   CAST(humidity_percent AS DOUBLE) AS humidity_percent,
                   CAST(precip_mm AS DOUBLE) AS precip_mm,
                   CAST(pressure_hpa AS DOUBLE) AS pressure_hpa,
                   wind_scale,
                   CAST(wind_speed_kmh AS DOUBLE) AS wind_speed_kmh,
                   wind_dir, text
            FROM hourly_weather
            WHERE location_id = ? AND datetime = ?
            "#,
        )
        .bind(location_id)
        .bind(datetime)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Count rows in hourly_weather for one location
    #[instrument(skip(self))]
    pub async fn count_hourly(&self, location_id: &str) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM hourly_weather WHERE location_id = ?")
            .bind(location_id)
            .fetch_one(self.pool())
            .await?;

        Ok(row.try_get("count")?)
    }
}
