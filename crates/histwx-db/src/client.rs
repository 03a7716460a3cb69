//! Database client and connection management

use crate::DbResult;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::time::Duration;

/// Database client wrapping sqlx connection pool
#[derive(Clone)]
pub struct DbClient {
    pool: MySqlPool,
}

impl DbClient {
    /// Create a new database client from connection string
    pub async fn new(database_url: &str, max_connections: u32) -> DbResult<Self> {
        let pool = Self::pool_options(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a new database client with custom options
    pub async fn with_options(opts: MySqlConnectOptions, max_connections: u32) -> DbResult<Self> {
        let pool = Self::pool_options(max_connections)
            .connect_with(opts)
            .await?;

        Ok(Self { pool })
    }

    fn pool_options(max_connections: u32) -> MySqlPoolOptions {
        MySqlPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
    }

    /// Get reference to underlying pool for direct queries
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Test the database connection
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Build MySQL connection options from components
///
/// Used when the deployment provides `DB_HOST`/`DB_USER`/... instead of a URL.
pub struct DbConnectionBuilder {
    host: String,
    port: u16,
    database: String,
    username: String,
    password: Option<String>,
}

impl DbConnectionBuilder {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            database: database.into(),
            username: "root".to_string(),
            password: None,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    pub fn build(self) -> MySqlConnectOptions {
        let mut opts = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .charset("utf8mb4");

        if let Some(password) = self.password {
            opts = opts.password(&password);
        }

        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_builder_defaults() {
        let builder = DbConnectionBuilder::new("weather_db");
        assert_eq!(builder.host, "localhost");
        assert_eq!(builder.port, 3306);
        assert_eq!(builder.username, "root");
        assert!(builder.password.is_none());
    }

    #[test]
    fn test_empty_password_is_no_password() {
        let builder = DbConnectionBuilder::new("weather_db")
            .host("db.internal")
            .port(3307)
            .username("ingest")
            .password("");
        assert!(builder.password.is_none());
        assert_eq!(builder.host, "db.internal");
        assert_eq!(builder.port, 3307);

        let opts = builder.password("secret").build();
        assert_eq!(opts.get_host(), "db.internal");
        assert_eq!(opts.get_port(), 3307);
        assert_eq!(opts.get_username(), "ingest");
        assert_eq!(opts.get_database(), Some("weather_db"));
    }
}
