use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};

use crate::models::DataSourceProperties;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub dialect: DialectConfig,
    pub dynamic_datasource: DynamicDataSourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Switches for the clause transformers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectConfig {
    pub order_by_enabled: bool,
    pub pagination_enabled: bool,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            order_by_enabled: true,
            pagination_enabled: true,
        }
    }
}

/// Router allocation and write pattern for one group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupAllocation {
    pub group: String,
    #[serde(default)]
    pub router: Option<String>,
    /// Regular expression matched against the invocation's method name
    #[serde(default)]
    pub write_pattern: Option<String>,
}

/// Static operation to datasource declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodKeyDeclaration {
    pub operation: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DynamicDataSourceConfig {
    pub enabled: bool,
    #[serde(default)]
    pub default_group: Option<String>,
    #[serde(default)]
    pub default_router: Option<String>,
    #[serde(default)]
    pub datasources: Vec<DataSourceProperties>,
    #[serde(default)]
    pub allocations: Vec<GroupAllocation>,
    #[serde(default)]
    pub method_keys: Vec<MethodKeyDeclaration>,
}

impl Config {
    /// Defaults, then the optional `DATASOURCE_CONFIG` file, then environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        // Pick up .env before reading any variable
        let _ = dotenv::dotenv();

        let file_name = env::var("DATASOURCE_CONFIG").unwrap_or_else(|_| "datasource".to_string());
        let mut builder = Self::defaults()?.add_source(File::with_name(&file_name).required(false));

        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|e| ConfigError::Message(format!("invalid PORT {}: {}", port, e)))?;
            builder = builder.set_override("server.port", port)?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        if let Ok(router) = env::var("DEFAULT_ROUTER") {
            builder = builder.set_override("dynamic_datasource.default_router", router)?;
        }

        if let Ok(group) = env::var("DEFAULT_GROUP") {
            builder = builder.set_override("dynamic_datasource.default_group", group)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Defaults plus a required configuration file, without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::from(path.as_ref()).required(true))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("logging.level", "info")?
            .set_default("dialect.order_by_enabled", true)?
            .set_default("dialect.pagination_enabled", true)?
            .set_default("dynamic_datasource.enabled", true)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
