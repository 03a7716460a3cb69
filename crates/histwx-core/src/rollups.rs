//! Daily rollups computed from hourly observations
//!
//! Mirrors what the database does server-side for the recompute path:
//! nulls are ignored by MIN/MAX/AVG, and precipitation is summed with
//! nulls coalesced to zero.

use crate::types::{DailySummary, HourlyObservation, SummarySource};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Aggregation applied by an [`Accumulator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateType {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

/// Null-aware accumulator over optional observations
#[derive(Debug, Clone)]
pub struct Accumulator {
    observations: Vec<f64>,
    aggregate_type: AggregateType,
    null_as: Option<f64>,
}

impl Accumulator {
    /// Accumulator that skips nulls entirely
    pub fn new(aggregate_type: AggregateType) -> Self {
        Self {
            observations: Vec::new(),
            aggregate_type,
            null_as: None,
        }
    }

    /// Accumulator that substitutes `fill` for nulls
    pub fn coalescing(aggregate_type: AggregateType, fill: f64) -> Self {
        Self {
            null_as: Some(fill),
            ..Self::new(aggregate_type)
        }
    }

    pub fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value.or(self.null_as) {
            self.observations.push(v);
        }
    }

    pub fn result(&self) -> Option<f64> {
        if self.observations.is_empty() {
            return None;
        }

        Some(match self.aggregate_type {
            AggregateType::Min => self
                .observations
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min),
            AggregateType::Max => self
                .observations
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max),
            AggregateType::Sum => self.observations.iter().sum(),
            AggregateType::Avg => {
                let sum: f64 = self.observations.iter().sum();
                sum / self.observations.len() as f64
            }
            AggregateType::Count => self.observations.len() as f64,
        })
    }

    /// Number of non-null (or coalesced) values seen
    pub fn count(&self) -> usize {
        self.observations.len()
    }
}

/// Running aggregates for one (location, date) group
#[derive(Debug, Clone)]
struct DayGroup {
    location_name: String,
    province: String,
    city: String,
    temp_min: Accumulator,
    temp_max: Accumulator,
    temp_avg: Accumulator,
    precip: Accumulator,
    humidity: Accumulator,
    pressure: Accumulator,
    wind_speed: Accumulator,
    rows: i64,
}

impl DayGroup {
    fn new(obs: &HourlyObservation) -> Self {
        Self {
            location_name: obs.location_name.clone(),
            province: obs.province.clone(),
            city: obs.city.clone(),
            temp_min: Accumulator::new(AggregateType::Min),
            temp_max: Accumulator::new(AggregateType::Max),
            temp_avg: Accumulator::new(AggregateType::Avg),
            precip: Accumulator::coalescing(AggregateType::Sum, 0.0),
            humidity: Accumulator::new(AggregateType::Avg),
            pressure: Accumulator::new(AggregateType::Avg),
            wind_speed: Accumulator::new(AggregateType::Avg),
            rows: 0,
        }
    }

    fn add(&mut self, obs: &HourlyObservation) {
        self.temp_min.add(obs.temp);
        self.temp_max.add(obs.temp);
        self.temp_avg.add(obs.temp);
        self.precip.add(Some(obs.precip));
        self.humidity.add(obs.humidity);
        self.pressure.add(obs.pressure);
        self.wind_speed.add(obs.wind_speed);
        self.rows += 1;
    }

    fn finish(self, location_id: String, date: NaiveDate) -> DailySummary {
        DailySummary {
            location_id,
            location_name: self.location_name,
            province: self.province,
            city: self.city,
            date,
            temp_min: self.temp_min.result(),
            temp_max: self.temp_max.result(),
            temp_avg: self.temp_avg.result(),
            precip_total: self.precip.result().unwrap_or(0.0),
            humidity_avg: self.humidity.result(),
            pressure_avg: self.pressure.result(),
            wind_speed_avg: self.wind_speed.result(),
            record_count: Some(self.rows),
            source: SummarySource::Hourly,
        }
    }
}

/// Group hourly observations by (location, calendar date) and summarize each group.
///
/// Output is ordered by location id, then date. Denormalized name/province/city
/// are taken from the last row seen in each group.
pub fn rollup_daily<'a, I>(observations: I) -> Vec<DailySummary>
where
    I: IntoIterator<Item = &'a HourlyObservation>,
{
    let mut groups: BTreeMap<(String, NaiveDate), DayGroup> = BTreeMap::new();

    for obs in observations {
        let key = (obs.location_id.clone(), obs.datetime.date());
        let group = groups.entry(key).or_insert_with(|| DayGroup::new(obs));
        group.location_name.clone_from(&obs.location_name);
        group.province.clone_from(&obs.province);
        group.city.clone_from(&obs.city);
        group.add(obs);
    }

    groups
        .into_iter()
        .map(|((location_id, date), group)| group.finish(location_id, date))
        .collect()
}
