use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use histwx_archive::{LocationClassifier, MemoryStore, MergeLayer};
use histwx_config::AppConfig;
use histwx_core::{SummarySource, WeatherStore};
use histwx_daemon::{LocationStatus, Pipeline, RunSettings, StatsReport};
use histwx_ingest::{load_locations, ApiResponse, Credential, FetchClient, FetchError, WeatherApi};
use std::fs;

/// Jinan answers normally, Shanghe is refused by the API, every other
/// location gets a normal day
struct FixtureApi;

fn day_body(date: NaiveDate) -> String {
    let day = date.format("%Y-%m-%d");
    let hours: Vec<String> = (0..24)
        .map(|h| {
            format!(
                r#"{{"time":"{}T{:02}:00+08:00","temp":"{}","humidity":"60","precip":"0.5","pressure":"1003"}}"#,
                day,
                h,
                22 + h % 8
            )
        })
        .collect();
    format!(
        r#"{{"code":"200","weatherDaily":{{"date":"{}","tempMax":"29","tempMin":"22","precip":"12.0"}},"weatherHourly":[{}]}}"#,
        day,
        hours.join(",")
    )
}

#[async_trait]
impl WeatherApi for FixtureApi {
    async fn historical(
        &self,
        _credential: &Credential,
        location_id: &str,
        date: NaiveDate,
    ) -> Result<ApiResponse, FetchError> {
        if location_id == "101120103" {
            return ApiResponse::from_json(r#"{"code":"402"}"#);
        }
        ApiResponse::from_json(&day_body(date))
    }
}

fn credential() -> Credential {
    let now = Utc::now();
    Credential::new("fixture", now, now + ChronoDuration::hours(10))
}

fn settings(source: SummarySource) -> RunSettings {
    let mut config = AppConfig::default();
    config.retry.max_retries = 1;
    config.retry.base_delay_ms = 10;
    config.sweep.max_retries = 1;
    config.sweep.base_delay_ms = 10;
    config.daily.source = source;
    RunSettings::from_config(&config)
}

#[tokio::test(start_paused = true)]
async fn test_backfill_from_csv_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let locations_csv = dir.path().join("locations.csv");
    fs::write(
        &locations_csv,
        "location_id,location_name\n\
         # Jinan districts\n\
         101120101,济南\n\
         101120103,商河\n\
         101120101,济南\n\
         101120104,章丘\n",
    )
    .unwrap();
    let classifier_csv = dir.path().join("cities.csv");
    fs::write(
        &classifier_csv,
        "\u{feff}location_id,province,city\n\
         101120101,山东,济南\n\
         101120103,山东,济南\n",
    )
    .unwrap();

    let locations = load_locations(&locations_csv).unwrap();
    assert_eq!(locations.len(), 3);
    let classifier = LocationClassifier::from_csv_path(&classifier_csv).unwrap();
    assert_eq!(classifier.missing(&locations).len(), 1);

    let pipeline = Pipeline::new(
        FetchClient::new(FixtureApi),
        MergeLayer::new(MemoryStore::new(), classifier),
        settings(SummarySource::Hourly),
    );
    let credential = credential();

    let first_day = NaiveDate::from_ymd_opt(2025, 7, 20).unwrap();
    let first = pipeline
        .run_date(&locations, &credential, first_day)
        .await
        .unwrap();

    assert_eq!(first.fetched(), 2);
    assert_eq!(first.recovered(), 0);
    assert!(!first.is_failure());
    assert_eq!(first.hourly.inserted, 24);
    assert_eq!(first.daily.inserted, 1);
    assert_eq!(first.unclassified.len(), 1);
    assert_eq!(first.unclassified[0].id, "101120104");
    assert_eq!(first.hourly_received(), 48);
    assert_eq!(first.hourly_expected(), 72);

    let refused = &first.tallies[1];
    assert_eq!(refused.location.id, "101120103");
    match &refused.status {
        LocationStatus::Failed { attempts, reason } => {
            assert_eq!(*attempts, 4);
            assert!(matches!(reason, FetchError::Api { code, .. } if code == "402"));
        }
        other => panic!("expected a failure, got {:?}", other),
    }

    let second_day = first_day.succ_opt().unwrap();
    let second = pipeline
        .run_date(&locations, &credential, second_day)
        .await
        .unwrap();
    assert_eq!(second.hourly.inserted, 24);
    assert_eq!(second.daily.inserted, 1);
    assert_eq!(second.daily.updated, 0);

    let store = pipeline.merge().store();
    assert_eq!(store.hourly_rows().await.len(), 48);

    let summary = store.daily("101120101", second_day).await.unwrap();
    assert_eq!(summary.record_count, Some(24));
    assert_eq!(summary.temp_min, Some(22.0));
    assert_eq!(summary.temp_max, Some(29.0));
    assert_eq!(summary.precip_total, 12.0);
    assert_eq!(summary.source, SummarySource::Hourly);

    let stats = store.stats(None).await.unwrap();
    let report = StatsReport(&stats).to_string();
    assert!(report.contains("hourly rows: 48"));
    assert!(report.contains("daily rows: 2"));
    assert!(report.contains("latest daily: 2025-07-21"));
}

#[tokio::test(start_paused = true)]
async fn test_api_daily_rows_stored_as_received() {
    let locations = vec![histwx_core::Location::new("101120101", "济南")];
    let classifier = LocationClassifier::from_entries([(
        "101120101".to_string(),
        histwx_core::Classification {
            province: "山东".into(),
            city: "济南".into(),
        },
    )])
    .unwrap();
    let pipeline = Pipeline::new(
        FetchClient::new(FixtureApi),
        MergeLayer::new(MemoryStore::new(), classifier),
        settings(SummarySource::Api),
    );

    let date = NaiveDate::from_ymd_opt(2025, 7, 21).unwrap();
    let summary = pipeline.run_date(&locations, &credential(), date).await.unwrap();
    assert_eq!(summary.daily.inserted, 1);

    let daily = pipeline.merge().store().daily("101120101", date).await.unwrap();
    assert_eq!(daily.source, SummarySource::Api);
    assert_eq!(daily.record_count, None);
    assert_eq!(daily.precip_total, 12.0);
}

#[test]
fn test_shipped_location_data_is_consistent() {
    let data = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../data");
    let locations = load_locations(data.join("locations.csv")).unwrap();
    assert_eq!(locations.len(), 13);
    assert_eq!(locations[0].id, "101120101");

    let classifier = LocationClassifier::from_csv_path(data.join("cities.csv")).unwrap();
    assert!(classifier.missing(&locations).is_empty());
}
