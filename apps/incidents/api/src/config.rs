use core_config::{AppInfo, ConfigError, FromEnv, app_info, env_parse, server::ServerConfig};
use database::postgres::PostgresConfig;
use domain_incidents::EmbeddingConfig;
use std::time::Duration;

pub use core_config::Environment;

/// Application-specific configuration
/// Composes shared config components from the `config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub database: PostgresConfig,
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    /// Deadline for each storage call
    pub storage_timeout: Duration,
    /// Apply pending migrations on startup
    pub run_migrations: bool,
    pub environment: Environment,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let database = PostgresConfig::from_env()?; // Required - will fail if not set
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080
        let embedding = EmbeddingConfig::from_env()?;

        let storage_timeout_secs: u64 = env_parse("STORAGE_TIMEOUT_SECS", "10")?;
        if storage_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STORAGE_TIMEOUT_SECS".to_string(),
                details: "must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(Self {
            app: app_info!(),
            database,
            server,
            embedding,
            storage_timeout: Duration::from_secs(storage_timeout_secs),
            run_migrations: env_parse("RUN_MIGRATIONS", "true")?,
            environment,
        })
    }
}
