//! Row types for the two weather tables
//!
//! `hourly_weather` is unique on (location_id, datetime) and
//! `daily_weather` on (location_id, date). Numeric columns are DECIMAL in
//! the production schema, so every numeric read casts to DOUBLE.

use chrono::{NaiveDate, NaiveDateTime};
use histwx_core::{DailySummary, SummarySource};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One stored hourly row, as read back with numeric casts applied
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct HourlyRow {
    pub location_id: String,
    pub location_name: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub datetime: NaiveDateTime,
    pub temp_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub precip_mm: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub wind_scale: Option<String>,
    pub wind_speed_kmh: Option<f64>,
    pub wind_dir: Option<String>,
    pub text: Option<String>,
}

/// Per-(location, date) aggregate over `hourly_weather`
#[derive(Debug, Clone, FromRow)]
pub struct DailyAggregateRow {
    pub location_id: String,
    pub location_name: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub date: NaiveDate,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_avg: Option<f64>,
    pub precip_total: Option<f64>,
    pub humidity_avg: Option<f64>,
    pub pressure_avg: Option<f64>,
    pub wind_speed_avg: Option<f64>,
    pub record_count: i64,
}

impl From<DailyAggregateRow> for DailySummary {
    fn from(row: DailyAggregateRow) -> Self {
        DailySummary {
            location_id: row.location_id,
            location_name: row.location_name.unwrap_or_default(),
            province: row.province.unwrap_or_default(),
            city: row.city.unwrap_or_default(),
            date: row.date,
            temp_min: row.temp_min,
            temp_max: row.temp_max,
            temp_avg: row.temp_avg,
            precip_total: row.precip_total.unwrap_or(0.0),
            humidity_avg: row.humidity_avg,
            pressure_avg: row.pressure_avg,
            wind_speed_avg: row.wind_speed_avg,
            record_count: Some(row.record_count),
            source: SummarySource::Hourly,
        }
    }
}
