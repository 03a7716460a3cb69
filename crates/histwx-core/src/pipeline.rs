use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::types::{DailySummary, HourlyObservation};

/// Whether an upsert created a new row or overwrote an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Which hourly rows a daily recompute reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeScope {
    All,
    Location {
        id: String,
        name: Option<String>,
        /// Restrict to one calendar date; `None` covers every stored date
        date: Option<NaiveDate>,
    },
}

impl RecomputeScope {
    pub fn location(id: impl Into<String>) -> Self {
        RecomputeScope::Location {
            id: id.into(),
            name: None,
            date: None,
        }
    }

    /// One location's rows for a single date
    pub fn location_day(id: impl Into<String>, date: NaiveDate) -> Self {
        RecomputeScope::Location {
            id: id.into(),
            name: None,
            date: Some(date),
        }
    }

    pub fn matches(&self, location_id: &str, location_name: &str, date: NaiveDate) -> bool {
        match self {
            RecomputeScope::All => true,
            RecomputeScope::Location {
                id,
                name,
                date: day,
            } => {
                id == location_id
                    && name.as_deref().map_or(true, |n| n == location_name)
                    && day.map_or(true, |d| d == date)
            }
        }
    }
}

/// Row counts and recency for the two tables
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub hourly_count: i64,
    pub daily_count: i64,
    pub first_hourly: Option<NaiveDateTime>,
    pub latest_hourly: Option<NaiveDateTime>,
    pub latest_daily: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Connection-level failure; the caller's merge cannot continue
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The store refused this one row; other rows are unaffected
    #[error("row rejected by storage: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed storage for hourly observations and daily summaries.
///
/// Every upsert is its own atomic unit: the (location, timestamp) or
/// (location, date) key is the only consistency boundary.
#[async_trait::async_trait]
pub trait WeatherStore: Send + Sync {
    /// Check the store is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Insert or overwrite one hourly row (last write wins)
    async fn upsert_hourly(&self, row: &HourlyObservation) -> StoreResult<UpsertOutcome>;

    /// Insert or overwrite one daily row (last write wins)
    async fn upsert_daily(&self, row: &DailySummary) -> StoreResult<UpsertOutcome>;

    /// Summarize stored hourly rows per (location, date) within `scope`
    async fn daily_aggregates(&self, scope: &RecomputeScope) -> StoreResult<Vec<DailySummary>>;

    /// Row counts and latest timestamps, optionally for one location
    async fn stats(&self, location_id: Option<&str>) -> StoreResult<StoreStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_matching() {
        let day = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();
        let next = day.succ_opt().unwrap();
        assert!(RecomputeScope::All.matches("a", "x", day));

        let by_id = RecomputeScope::location("a");
        assert!(by_id.matches("a", "x", day));
        assert!(by_id.matches("a", "x", next));
        assert!(!by_id.matches("b", "x", day));

        let by_id_and_name = RecomputeScope::Location {
            id: "a".into(),
            name: Some("x".into()),
            date: None,
        };
        assert!(by_id_and_name.matches("a", "x", day));
        assert!(!by_id_and_name.matches("a", "y", day));

        let one_day = RecomputeScope::location_day("a", day);
        assert!(one_day.matches("a", "x", day));
        assert!(!one_day.matches("a", "x", next));
    }

    #[test]
    fn test_store_error_kind() {
        assert!(StoreError::Unavailable("down".into()).is_unavailable());
        assert!(!StoreError::Rejected("too long".into()).is_unavailable());
    }
}
