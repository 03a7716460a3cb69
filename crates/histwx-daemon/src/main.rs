use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use clap::Parser;
use histwx_archive::{LocationClassifier, MemoryStore, MergeLayer};
use histwx_config::{AppConfig, DatabaseConfig};
use histwx_core::{Location, WeatherStore};
use histwx_daemon::cli::Cli;
use histwx_daemon::{Pipeline, RunSettings, StatsReport};
use histwx_db::{DbClient, DbConnectionBuilder};
use histwx_ingest::{CredentialIssuer, FetchClient, HttpWeatherApi};
use histwx_obs::LogFormat;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    histwx_config::load_dotenv();
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => Ok(code),
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if cli.no_sweep {
        config.sweep.enabled = false;
    }

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        config.log.format
    };
    let log_dir = config.log.file.then_some(config.paths.log_dir.as_path());
    let log_path = histwx_obs::init("histwxd", format, log_dir)?;
    if let Some(path) = log_path {
        info!("Logging to {}", path.display());
    }

    let dates = cli
        .dates(Local::now().date_naive())
        .map_err(anyhow::Error::msg)?;

    if cli.dry_run {
        info!("Dry run: merging into memory, the database is not touched");
        return execute_with(&cli, &config, MemoryStore::new(), &dates).await;
    }

    let db = connect(&config.database).await?;
    let code = execute_with(&cli, &config, db.clone(), &dates).await;
    db.close().await;
    code
}

async fn connect(database: &DatabaseConfig) -> Result<DbClient> {
    let client = match (&database.url, &database.name) {
        (Some(url), _) => DbClient::new(url, database.max_connections).await,
        (None, Some(name)) => {
            let options = DbConnectionBuilder::new(name)
                .host(&database.host)
                .port(database.port)
                .username(&database.user)
                .password(&database.password)
                .build();
            DbClient::with_options(options, database.max_connections).await
        }
        (None, None) => bail!("No database configured: set DATABASE_URL or DB_NAME"),
    };
    client.context("Failed to connect to the database")
}

async fn execute_with<S: WeatherStore>(
    cli: &Cli,
    config: &AppConfig,
    store: S,
    dates: &[NaiveDate],
) -> Result<ExitCode> {
    store.ping().await.context("Storage is unreachable")?;

    if cli.stats {
        let stats = store.stats(None).await.context("Failed to read statistics")?;
        println!("{}", StatsReport(&stats));
        return Ok(ExitCode::SUCCESS);
    }

    let api = HttpWeatherApi::new(&config.api.base_url, config.api.timeout())?;
    api.probe()
        .await
        .with_context(|| format!("API host {} is unreachable", config.api.base_url))?;

    let issuer = CredentialIssuer::from_pem_file(
        &config.api.private_key_path,
        config.api.key_id.clone(),
        config.api.project_id.clone(),
    )
    .context("Failed to load the signing key")?;
    let credential = issuer
        .issue(ChronoDuration::hours(config.api.token_hours))
        .context("Failed to issue an API credential")?;

    let locations = load_locations(config)?;
    let classifier = load_classifier(config)?;
    for location in classifier.missing(&locations) {
        warn!(location = %location, "No province/city configured, its data will not be stored");
    }

    let pipeline = Pipeline::new(
        FetchClient::new(api),
        MergeLayer::new(store, classifier),
        RunSettings::from_config(config),
    );

    let mut code = ExitCode::SUCCESS;
    for &date in dates {
        let summary = pipeline
            .run_date(&locations, &credential, date)
            .await
            .with_context(|| format!("Run for {} aborted", date))?;
        if summary.is_failure() {
            error!("No location's data could be stored for {}", date);
            code = ExitCode::FAILURE;
        }
    }

    match pipeline.merge().store().stats(None).await {
        Ok(stats) => info!("{}", StatsReport(&stats)),
        Err(e) => warn!("Could not read statistics: {}", e),
    }
    Ok(code)
}

fn load_locations(config: &AppConfig) -> Result<Vec<Location>> {
    let locations = match &config.paths.locations {
        Some(path) => histwx_ingest::load_locations(path)?,
        None => histwx_ingest::dedup_locations(config.locations.iter().cloned()),
    };
    if locations.is_empty() {
        bail!("No locations configured: set paths.locations or add [[locations]] entries");
    }
    info!("Loaded {} locations", locations.len());
    Ok(locations)
}

fn load_classifier(config: &AppConfig) -> Result<LocationClassifier> {
    match &config.paths.classifier {
        Some(path) => Ok(LocationClassifier::from_csv_path(path)?),
        None => bail!("No classifier configured: set paths.classifier or CITY_CSV_PATH"),
    }
}
