use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Shared connection pool handed to every service
pub type DbPool = DatabaseConnection;

/// Database engines the quote store runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &str) -> Result<Self, ServiceError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Backend::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Backend::Sqlite)
        } else {
            Err(ServiceError::InternalError(
                "database_url must start with postgres:// or sqlite:".into(),
            ))
        }
    }
}

/// Pool sizing and timeouts
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    /// Small pool for tooling and tests
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for PoolSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections.min(cfg.db_max_connections),
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

pub async fn connect(settings: &PoolSettings) -> Result<DbPool, ServiceError> {
    let backend = Backend::from_url(&settings.url)?;
    debug!(
        ?backend,
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "opening quote store"
    );

    let mut options = ConnectOptions::new(settings.url.clone());
    options
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .connect_timeout(settings.connect_timeout)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(options).await.map_err(|e| {
        error!(?backend, error = %e, "could not open quote store");
        ServiceError::DatabaseError(e)
    })?;
    info!(?backend, "quote store ready");
    Ok(pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    connect(&PoolSettings::from(cfg)).await
}

/// Applies pending migrations from the embedded migrator
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match crate::migrator::Migrator::up(pool, None).await {
        Ok(()) => {
            info!(elapsed = ?started.elapsed(), "migrations applied");
            Ok(())
        }
        Err(e) => {
            error!(elapsed = ?started.elapsed(), error = %e, "migrations failed");
            Err(ServiceError::MigrationError(e.to_string()))
        }
    }
}

/// Round-trips a ping; used by `/health`
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    pool.ping().await.map_err(|e| {
        error!(error = %e, "database ping failed");
        ServiceError::DatabaseError(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn connects_and_migrates_sqlite() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("quotes.db").display());
        let pool = connect(&PoolSettings::for_url(url)).await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
        assert!(run_migrations(&pool).await.is_ok());
        // second run is a no-op
        assert!(run_migrations(&pool).await.is_ok());
    }

    #[test]
    fn backend_follows_url_scheme() {
        assert_eq!(Backend::from_url("postgres://u@h/db").unwrap(), Backend::Postgres);
        assert_eq!(Backend::from_url("sqlite::memory:").unwrap(), Backend::Sqlite);
        assert!(Backend::from_url("mysql://h/db").is_err());
    }

    #[test]
    fn pool_settings_follow_app_config() {
        let mut cfg = AppConfig::new(
            "sqlite://x.db".into(),
            "secret".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 2;
        let settings = PoolSettings::from(&cfg);
        assert_eq!(settings.url, "sqlite://x.db");
        assert_eq!(settings.max_connections, 1);
        assert_eq!(settings.min_connections, 1);
    }
}
