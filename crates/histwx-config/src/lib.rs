//! Run configuration: a TOML file overlaid with environment variables

use histwx_core::{Location, SummarySource};
use histwx_obs::LogFormat;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Upper bound on any retry budget
pub const MAX_RETRY_BUDGET: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Load `.env` from the working directory or its parents, if there is one
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub key_id: String,
    pub project_id: String,
    pub private_key_path: PathBuf,
    /// Credential validity
    pub token_hours: i64,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.qweather.com".to_string(),
            key_id: String::new(),
            project_id: String::new(),
            private_key_path: PathBuf::from("ed25519-private.pem"),
            token_hours: 10,
            timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub batch_delay_ms: u64,
    pub request_delay_ms: u64,
    pub progress_interval_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: 20,
            batch_delay_ms: 2000,
            request_delay_ms: 500,
            progress_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub pause_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 5,
            base_delay_ms: 5000,
            pause_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    pub source: SummarySource,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            source: SummarySource::Hourly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub locations: Option<PathBuf>,
    pub classifier: Option<PathBuf>,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            locations: None,
            classifier: None,
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Either a full URL or the component form
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            name: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Also write `<log_dir>/histwx_<YYYYMMDD>.log`
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            file: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    pub sweep: SweepConfig,
    pub daily: DailyConfig,
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
    /// Used when `paths.locations` is not set
    pub locations: Vec<Location>,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; a missing file yields the defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&s).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay values from an environment lookup
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(host) = var("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = var("DB_PORT") {
            self.database.port = port
                .trim()
                .parse()
                .map_err(|_| invalid("DB_PORT", format!("'{}' is not a port", port)))?;
        }
        if let Some(user) = var("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = var("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(name) = var("DB_NAME") {
            self.database.name = Some(name);
        }

        if let Some(path) = var("HISTWX_PRIVATE_KEY_PATH") {
            self.api.private_key_path = PathBuf::from(path);
        }
        if let Some(key_id) = var("HISTWX_KEY_ID") {
            self.api.key_id = key_id;
        }
        if let Some(project_id) = var("HISTWX_PROJECT_ID") {
            self.api.project_id = project_id;
        }
        if let Some(base_url) = var("HISTWX_API_BASE") {
            self.api.base_url = base_url;
        }

        if let Some(path) = var("HISTWX_LOCATIONS") {
            self.paths.locations = Some(PathBuf::from(path));
        }
        if let Some(path) = var("CITY_CSV_PATH") {
            self.paths.classifier = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.size == 0 {
            return Err(invalid("batch.size", "must be greater than zero"));
        }
        if self.api.token_hours <= 0 {
            return Err(invalid("api.token_hours", "must be greater than zero"));
        }
        if self.api.timeout_secs == 0 {
            return Err(invalid("api.timeout_secs", "must be greater than zero"));
        }

        let url = Url::parse(&self.api.base_url)
            .map_err(|e| invalid("api.base_url", format!("'{}': {}", self.api.base_url, e)))?;
        if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(
                "api.base_url",
                format!("'{}' is not an absolute http(s) URL", self.api.base_url),
            ));
        }

        for (key, budget) in [
            ("retry.max_retries", self.retry.max_retries),
            ("sweep.max_retries", self.sweep.max_retries),
        ] {
            if budget > MAX_RETRY_BUDGET {
                return Err(invalid(
                    key,
                    format!("{} exceeds the limit of {}", budget, MAX_RETRY_BUDGET),
                ));
            }
        }

        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.batch.request_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch.batch_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.batch.progress_interval_secs)
    }
}
