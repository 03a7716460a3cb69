//! Typed decoding of the historical-weather response envelope

use histwx_core::{deserialize_lenient_string, DailyRecord, HourlyRecord};
use serde::{Deserialize, Deserializer};

use crate::FetchError;

/// The only `code` value the API uses for success
pub const SUCCESS_CODE: &str = "200";

/// A decoded response, either a payload or an API-level error
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Success {
        hourly: Vec<HourlyRecord>,
        daily: Vec<DailyRecord>,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ApiResponse {
    /// Decode a response body once; nothing downstream sees raw JSON
    pub fn from_json(body: &str) -> Result<Self, FetchError> {
        let envelope: Envelope =
            serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(envelope.into())
    }
}

/// `weatherDaily` is an object in some API versions and an array in others
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn deserialize_one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<OneOrMany<T>>::deserialize(deserializer)?
        .map(Vec::from)
        .unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    code: Option<String>,

    #[serde(default, deserialize_with = "deserialize_one_or_many")]
    weather_hourly: Vec<HourlyRecord>,

    #[serde(default, deserialize_with = "deserialize_one_or_many")]
    weather_daily: Vec<DailyRecord>,

    /// Newer error shape: `{"error": {"status": 401, "title": ..}}`
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    status: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl From<Envelope> for ApiResponse {
    fn from(envelope: Envelope) -> Self {
        if let Some(error) = envelope.error {
            let code = error.status.unwrap_or_else(|| "unknown".to_string());
            let message = error
                .detail
                .or(error.title)
                .unwrap_or_else(|| describe_code(&code).to_string());
            return ApiResponse::Error { code, message };
        }

        match envelope.code {
            Some(code) if code == SUCCESS_CODE => ApiResponse::Success {
                hourly: envelope.weather_hourly,
                daily: envelope.weather_daily,
            },
            Some(code) => {
                let message = describe_code(&code).to_string();
                ApiResponse::Error { code, message }
            }
            None => ApiResponse::Error {
                code: "missing".to_string(),
                message: "response carried no status code".to_string(),
            },
        }
    }
}

fn describe_code(code: &str) -> &'static str {
    match code {
        "204" => "no data for this location and date",
        "400" => "bad request parameters",
        "401" => "authentication failed",
        "402" => "quota exhausted",
        "403" => "access denied",
        "404" => "no such location or date",
        "429" => "rate limit exceeded",
        "500" => "upstream server error",
        _ => "unrecognized API status code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAILY_OBJECT: &str = r#"{
        "code": "200",
        "fxLink": "https://example.invalid/jinan",
        "weatherDaily": {
            "date": "2025-07-21", "tempMax": "33", "tempMin": "23",
            "humidity": "67", "precip": "1.2", "pressure": "1003"
        },
        "weatherHourly": [
            {"time": "2025-07-21T00:00+08:00", "temp": "28", "precip": "0.0"},
            {"time": "2025-07-21T01:00+08:00", "temp": "27", "precip": ""}
        ]
    }"#;

    #[test]
    fn test_daily_object_becomes_single_element() {
        match ApiResponse::from_json(DAILY_OBJECT).unwrap() {
            ApiResponse::Success { hourly, daily } => {
                assert_eq!(hourly.len(), 2);
                assert_eq!(hourly[1].precip, None);
                assert_eq!(daily.len(), 1);
                assert_eq!(daily[0].temp_max, Some(33.0));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_daily_array_kept_as_is() {
        let body = r#"{
            "code": 200,
            "weatherDaily": [
                {"date": "2025-07-20", "tempMax": 31},
                {"date": "2025-07-21", "tempMax": 33}
            ]
        }"#;
        match ApiResponse::from_json(body).unwrap() {
            ApiResponse::Success { hourly, daily } => {
                assert!(hourly.is_empty());
                assert_eq!(daily.len(), 2);
                assert_eq!(daily[1].date.as_deref(), Some("2025-07-21"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_null_or_absent_daily_is_empty() {
        let body = r#"{"code":"200","weatherDaily":null,"weatherHourly":[{"time":"2025-07-21T00:00+08:00"}]}"#;
        let response = ApiResponse::from_json(body).unwrap();
        assert_eq!(
            response,
            ApiResponse::Success {
                hourly: vec![HourlyRecord {
                    time: Some("2025-07-21T00:00+08:00".into()),
                    ..Default::default()
                }],
                daily: vec![],
            }
        );
    }

    #[test]
    fn test_non_success_code_is_error() {
        let response = ApiResponse::from_json(r#"{"code":"402"}"#).unwrap();
        assert_eq!(
            response,
            ApiResponse::Error {
                code: "402".into(),
                message: "quota exhausted".into()
            }
        );
    }

    #[test]
    fn test_error_object_shape() {
        let body = r#"{"error":{"status":401,"type":"x","title":"Unauthorized","detail":"Invalid token"}}"#;
        assert_eq!(
            ApiResponse::from_json(body).unwrap(),
            ApiResponse::Error {
                code: "401".into(),
                message: "Invalid token".into()
            }
        );
    }

    #[test]
    fn test_garbage_body_is_decode_error() {
        let err = ApiResponse::from_json("<html>busy</html>").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
