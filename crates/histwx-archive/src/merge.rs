//! Keyed upsert of fetched records into the hourly and daily tables

use histwx_core::{
    normalize_timestamp, parse_date, Classification, DailyRecord, DailySummary, HourlyObservation,
    HourlyRecord, Location, RecomputeScope, Stamped, StoreError, SummarySource, TimestampError,
    UpsertOutcome, WeatherStore,
};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::AddAssign;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::{ArchiveResult, LocationClassifier};

/// A single record that cannot become a row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    BadTimestamp(#[from] TimestampError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeCounts {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl MergeCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    /// Rows actually written
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

impl AddAssign for MergeCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Result of one merge call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub counts: MergeCounts,
    /// Locations with no province/city entry; none of their records were written
    pub unclassified: Vec<Location>,
}

impl MergeReport {
    fn mark_unclassified(&mut self, location: &Location) {
        if !self.unclassified.contains(location) {
            self.unclassified.push(location.clone());
        }
    }
}

impl AddAssign for MergeReport {
    fn add_assign(&mut self, other: Self) {
        self.counts += other.counts;
        for location in other.unclassified {
            self.mark_unclassified(&location);
        }
    }
}

/// Build an hourly row; `time` is the only required field
pub fn hourly_observation(
    location: &Location,
    classification: &Classification,
    record: &HourlyRecord,
) -> Result<HourlyObservation, MalformedRecord> {
    let time = record
        .time
        .as_deref()
        .ok_or(MalformedRecord::MissingField("time"))?;

    Ok(HourlyObservation {
        location_id: location.id.clone(),
        location_name: location.name.clone(),
        province: classification.province.clone(),
        city: classification.city.clone(),
        datetime: normalize_timestamp(time)?,
        temp: record.temp,
        humidity: record.humidity,
        precip: record.precip.unwrap_or(0.0),
        pressure: record.pressure,
        wind_scale: record.wind_scale.clone(),
        wind_speed: record.wind_speed,
        wind_dir: record.wind_dir.clone(),
        text: record.text.clone(),
    })
}

/// Build a daily row from the API's own summary; `date` is required
pub fn api_daily_summary(
    location: &Location,
    classification: &Classification,
    record: &DailyRecord,
) -> Result<DailySummary, MalformedRecord> {
    let date = record
        .date
        .as_deref()
        .ok_or(MalformedRecord::MissingField("date"))?;

    Ok(DailySummary {
        location_id: location.id.clone(),
        location_name: location.name.clone(),
        province: classification.province.clone(),
        city: classification.city.clone(),
        date: parse_date(date)?,
        temp_min: record.temp_min,
        temp_max: record.temp_max,
        temp_avg: None,
        precip_total: record.precip.unwrap_or(0.0),
        humidity_avg: record.humidity,
        pressure_avg: record.pressure,
        wind_speed_avg: None,
        record_count: None,
        source: SummarySource::Api,
    })
}

/// Writes fetched records through a `WeatherStore`
///
/// Malformed records and rows the store rejects are skipped and counted. A
/// store that becomes unavailable ends the call with an error.
pub struct MergeLayer<S> {
    store: S,
    classifier: LocationClassifier,
}

impl<S: WeatherStore> MergeLayer<S> {
    pub fn new(store: S, classifier: LocationClassifier) -> Self {
        Self { store, classifier }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn classifier(&self) -> &LocationClassifier {
        &self.classifier
    }

    /// Look up each location once per call, logging misses
    fn classify<'a>(
        &'a self,
        location: &Location,
        cache: &mut HashMap<String, Option<&'a Classification>>,
        report: &mut MergeReport,
    ) -> Option<&'a Classification> {
        *cache.entry(location.id.clone()).or_insert_with(|| {
            match self.classifier.classify(&location.id) {
                Ok(c) => Some(c),
                Err(e) => {
                    error!(location = %location, "{}", e);
                    report.mark_unclassified(location);
                    None
                }
            }
        })
    }

    /// Upsert one row, folding row-level rejection into `skipped`
    fn tally(
        counts: &mut MergeCounts,
        result: Result<UpsertOutcome, StoreError>,
        what: &str,
    ) -> Result<(), StoreError> {
        match result {
            Ok(outcome) => counts.record(outcome),
            Err(e) if e.is_unavailable() => return Err(e),
            Err(e) => {
                warn!("Skipping {}: {}", what, e);
                counts.skipped += 1;
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn merge_hourly(
        &self,
        records: &[Stamped<HourlyRecord>],
    ) -> ArchiveResult<MergeReport> {
        let mut report = MergeReport::default();
        let mut cache = HashMap::new();

        for stamped in records {
            let Some(classification) = self.classify(&stamped.location, &mut cache, &mut report)
            else {
                continue;
            };

            let row = match hourly_observation(&stamped.location, classification, &stamped.record) {
                Ok(row) => row,
                Err(e) => {
                    warn!(location = %stamped.location, "Skipping hourly record: {}", e);
                    report.counts.skipped += 1;
                    continue;
                }
            };

            let result = self.store.upsert_hourly(&row).await;
            Self::tally(&mut report.counts, result, "hourly row")?;
        }

        info!(
            inserted = report.counts.inserted,
            updated = report.counts.updated,
            skipped = report.counts.skipped,
            "Hourly merge complete"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn merge_daily(
        &self,
        records: &[Stamped<DailyRecord>],
    ) -> ArchiveResult<MergeReport> {
        let mut report = MergeReport::default();
        let mut cache = HashMap::new();

        for stamped in records {
            let Some(classification) = self.classify(&stamped.location, &mut cache, &mut report)
            else {
                continue;
            };

            let row = match api_daily_summary(&stamped.location, classification, &stamped.record) {
                Ok(row) => row,
                Err(e) => {
                    warn!(location = %stamped.location, "Skipping daily record: {}", e);
                    report.counts.skipped += 1;
                    continue;
                }
            };

            let result = self.store.upsert_daily(&row).await;
            Self::tally(&mut report.counts, result, "daily row")?;
        }

        info!(
            inserted = report.counts.inserted,
            updated = report.counts.updated,
            skipped = report.counts.skipped,
            "Daily merge complete"
        );
        Ok(report)
    }

    /// Rebuild daily rows for `scope` from stored hourly rows
    #[instrument(skip(self))]
    pub async fn recompute_daily_from_hourly(
        &self,
        scope: &RecomputeScope,
    ) -> ArchiveResult<MergeCounts> {
        let summaries = self.store.daily_aggregates(scope).await?;
        debug!("Recomputing {} daily summaries", summaries.len());

        let mut counts = MergeCounts::default();
        for summary in &summaries {
            let result = self.store.upsert_daily(summary).await;
            Self::tally(&mut counts, result, "recomputed daily row")?;
        }
        Ok(counts)
    }
}
