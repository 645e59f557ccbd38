use deadpool_postgres::{Config as PoolConfig, ManagerConfig, RecyclingMethod, Runtime};
use mysql_async::{OptsBuilder, PoolConstraints, PoolOpts};
use tokio_postgres::NoTls;

use super::{DataSourcePool, DataSourceRegistry, DatabaseType, DialectInfo, NamedDataSource};
use crate::api::middleware::AppError;
use crate::models::DataSourceProperties;

/// Creates named datasources (and their physical pools) from configuration.
///
/// Pool creation never opens a connection; the first checkout does. MySQL pools
/// spawn their recycler on the current tokio runtime, so building them needs one.
#[derive(Debug, Default)]
pub struct CentralizedDataSourceFactory;

impl CentralizedDataSourceFactory {
    pub fn new() -> Self {
        Self
    }

    /// Build one named datasource
    pub fn get(&self, properties: &DataSourceProperties) -> Result<NamedDataSource, AppError> {
        Self::validate(properties)?;

        let database_type: DatabaseType = properties.database_type.parse()?;
        let dialect = DialectInfo::new(database_type, properties.database_version);

        let pool = match database_type {
            DatabaseType::PostgreSQL => DataSourcePool::Postgres(Self::create_postgres_pool(properties)?),
            DatabaseType::MySQL | DatabaseType::MariaDB => {
                DataSourcePool::MySql(Self::create_mysql_pool(properties)?)
            }
            _ => {
                tracing::debug!(
                    "Datasource {} uses {}; connections come from the external driver pool",
                    properties.name,
                    database_type
                );
                DataSourcePool::External
            }
        };

        tracing::info!(
            "Created datasource {} for {} (max_size: {})",
            properties.name,
            Self::mask_credentials(&properties.url),
            properties.max_pool_size
        );

        Ok(NamedDataSource::new(properties.clone(), dialect, pool))
    }

    /// Build and register every configured datasource.
    ///
    /// The first failure aborts startup; a partially populated registry is never returned.
    pub fn build_registry(
        &self,
        definitions: &[DataSourceProperties],
    ) -> Result<DataSourceRegistry, AppError> {
        let mut registry = DataSourceRegistry::new();
        for properties in definitions {
            registry.register(self.get(properties)?)?;
        }

        if !registry.is_empty() {
            let keys: Vec<String> = registry.keys().iter().map(|k| k.to_string()).collect();
            tracing::info!("Loaded datasources:\n\t{}", keys.join("\n\t"));
        }

        Ok(registry)
    }

    fn validate(properties: &DataSourceProperties) -> Result<(), AppError> {
        if properties.name.trim().is_empty() {
            return Err(AppError::Configuration("datasource name must not be empty".to_string()));
        }
        if properties.group.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "datasource {} has no group",
                properties.name
            )));
        }
        if properties.url.trim().is_empty() {
            return Err(AppError::Configuration(format!(
                "datasource {} has no url",
                properties.name
            )));
        }
        if properties.weight == 0 {
            return Err(AppError::Configuration(format!(
                "datasource {} has weight 0",
                properties.name
            )));
        }
        if properties.max_pool_size == 0 {
            return Err(AppError::Configuration(format!(
                "datasource {} has max_pool_size 0",
                properties.name
            )));
        }
        Ok(())
    }

    /// Recycling issues ROLLBACK, closing any transaction a dropped resource left open
    fn postgres_pool_config(properties: &DataSourceProperties) -> PoolConfig {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(properties.url.clone());
        cfg.application_name = properties.properties.get("application_name").cloned();
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Custom("ROLLBACK".to_string()),
        });
        cfg
    }

    fn create_postgres_pool(properties: &DataSourceProperties) -> Result<deadpool_postgres::Pool, AppError> {
        let pool = Self::postgres_pool_config(properties)
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                tracing::error!("Failed to create connection pool for {}: {}", properties.name, e);
                AppError::Configuration(format!(
                    "Failed to create connection pool for {}: {}",
                    properties.name, e
                ))
            })?;

        pool.resize(properties.max_pool_size);
        Ok(pool)
    }

    /// COM_RESET_CONNECTION on return rolls back whatever a dropped resource left open
    fn mysql_pool_opts(properties: &DataSourceProperties) -> Result<PoolOpts, AppError> {
        let constraints = PoolConstraints::new(0, properties.max_pool_size).ok_or_else(|| {
            AppError::Configuration(format!(
                "Invalid pool size for {}: {}",
                properties.name, properties.max_pool_size
            ))
        })?;

        Ok(PoolOpts::default()
            .with_constraints(constraints)
            .with_reset_connection(true))
    }

    fn create_mysql_pool(properties: &DataSourceProperties) -> Result<mysql_async::Pool, AppError> {
        let opts = mysql_async::Opts::from_url(&properties.url).map_err(|e| {
            AppError::Configuration(format!(
                "Invalid MySQL url for {}: {}",
                properties.name, e
            ))
        })?;

        let builder = OptsBuilder::from_opts(opts).pool_opts(Self::mysql_pool_opts(properties)?);
        Ok(mysql_async::Pool::new(builder))
    }

    /// Mask credentials in connection URL for safe logging
    pub(crate) fn mask_credentials(url: &str) -> String {
        if let Ok(parsed_url) = url::Url::parse(url) {
            let mut masked = parsed_url.clone();
            if parsed_url.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        } else {
            "[invalid-url]".to_string()
        }
    }
}
