//! Core data types for locations, API records and stored rows

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::normalize::{deserialize_lenient_f64, deserialize_lenient_string};

/// A location to ingest, as supplied by the location source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Opaque region code, sent as the API `location` parameter
    #[serde(rename = "location_id")]
    pub id: String,

    /// Human-readable name; not unique across regions
    #[serde(rename = "location_name")]
    pub name: String,
}

impl Location {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// Province/city a location belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub province: String,
    pub city: String,
}

/// One element of the API `weatherHourly` array
///
/// Every field is optional here; required-field checks happen in the merge
/// layer so a single bad element does not poison the whole response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyRecord {
    /// e.g. `2025-07-21T00:00+08:00`
    #[serde(default)]
    pub time: Option<String>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub temp: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub humidity: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub precip: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub pressure: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub wind_scale: Option<String>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub wind_speed: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub wind_dir: Option<String>,

    /// Condition text, e.g. "多云"
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub text: Option<String>,
}

/// One `weatherDaily` entry as supplied by the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    /// e.g. `2025-07-21`
    #[serde(default)]
    pub date: Option<String>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub temp_min: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub temp_max: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub humidity: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub precip: Option<f64>,

    #[serde(default, deserialize_with = "deserialize_lenient_f64")]
    pub pressure: Option<f64>,
}

/// An API record tagged with the location it was fetched for
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub location: Location,
    pub record: T,
}

impl<T> Stamped<T> {
    pub fn new(location: Location, record: T) -> Self {
        Self { location, record }
    }
}

/// Row of the `hourly_weather` table, keyed by (location_id, datetime)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyObservation {
    pub location_id: String,
    pub location_name: String,
    pub province: String,
    pub city: String,

    /// Naive local time, truncated to the minute
    pub datetime: NaiveDateTime,

    pub temp: Option<f64>,
    pub humidity: Option<f64>,

    /// Never null: absent precipitation is stored as 0.0
    pub precip: f64,

    pub pressure: Option<f64>,
    pub wind_scale: Option<String>,
    pub wind_speed: Option<f64>,
    pub wind_dir: Option<String>,
    pub text: Option<String>,
}

/// Where a daily summary row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// The API's own `weatherDaily` payload
    Api,
    /// Recomputed from stored hourly rows
    Hourly,
}

impl SummarySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummarySource::Api => "api",
            SummarySource::Hourly => "hourly",
        }
    }
}

impl fmt::Display for SummarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummarySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(SummarySource::Api),
            "hourly" => Ok(SummarySource::Hourly),
            other => Err(format!("unknown daily summary source: {}", other)),
        }
    }
}

/// Row of the `daily_weather` table, keyed by (location_id, date)
///
/// API-sourced rows carry min/max temperature, humidity, precipitation and
/// pressure; recomputed rows additionally carry averages and the number of
/// hourly rows they were built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub location_id: String,
    pub location_name: String,
    pub province: String,
    pub city: String,
    pub date: NaiveDate,

    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_avg: Option<f64>,

    /// Nulls coalesced to zero before summing
    pub precip_total: f64,

    pub humidity_avg: Option<f64>,
    pub pressure_avg: Option<f64>,
    pub wind_speed_avg: Option<f64>,

    /// Hourly rows aggregated; `None` for API-sourced rows
    pub record_count: Option<i64>,

    pub source: SummarySource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hourly_record_accepts_string_numbers() {
        let json = r#"{
            "time": "2025-07-21T00:00+08:00",
            "temp": "28",
            "icon": "101",
            "text": "多云",
            "precip": "0.0",
            "wind360": "164",
            "windDir": "东南风",
            "windScale": "1-2",
            "windSpeed": "3",
            "humidity": "86",
            "pressure": "1001"
        }"#;
        let record: HourlyRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.time.as_deref(), Some("2025-07-21T00:00+08:00"));
        assert_eq!(record.temp, Some(28.0));
        assert_eq!(record.precip, Some(0.0));
        assert_eq!(record.wind_scale.as_deref(), Some("1-2"));
        assert_eq!(record.wind_speed, Some(3.0));
        assert_eq!(record.wind_dir.as_deref(), Some("东南风"));
        assert_eq!(record.pressure, Some(1001.0));
    }

    #[test]
    fn test_hourly_record_missing_fields_are_none() {
        let record: HourlyRecord =
            serde_json::from_str(r#"{"time":"2025-07-21T01:00+08:00","temp":""}"#).unwrap();

        assert_eq!(record.temp, None);
        assert_eq!(record.precip, None);
        assert_eq!(record.humidity, None);
        assert_eq!(record.text, None);
    }

    #[test]
    fn test_daily_record_camel_case() {
        let json = r#"{"date":"2025-07-21","tempMax":33,"tempMin":"23","humidity":"67","precip":"1.2","pressure":"1003","sunrise":"05:15"}"#;
        let record: DailyRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.date.as_deref(), Some("2025-07-21"));
        assert_eq!(record.temp_max, Some(33.0));
        assert_eq!(record.temp_min, Some(23.0));
        assert_eq!(record.precip, Some(1.2));
    }

    #[test]
    fn test_summary_source_parse() {
        assert_eq!("api".parse::<SummarySource>(), Ok(SummarySource::Api));
        assert_eq!(" Hourly ".parse::<SummarySource>(), Ok(SummarySource::Hourly));
        assert!("raw".parse::<SummarySource>().is_err());
    }

    #[test]
    fn test_location_display() {
        let loc = Location::new("101120101", "济南");
        assert_eq!(loc.to_string(), "济南(101120101)");
    }
}
