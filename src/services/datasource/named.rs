use std::fmt;

use super::DialectInfo;
use crate::models::{DataSourceKey, DataSourceProperties, DataSourceSummary};

/// Physical pool behind a named datasource
#[derive(Clone)]
pub enum DataSourcePool {
    Postgres(deadpool_postgres::Pool),
    MySql(mysql_async::Pool),
    /// Pool owned by an external driver; only metadata is held here
    External,
}

impl DataSourcePool {
    pub fn is_pooled(&self) -> bool {
        !matches!(self, DataSourcePool::External)
    }
}

impl fmt::Debug for DataSourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourcePool::Postgres(pool) => {
                let status = pool.status();
                f.debug_struct("Postgres")
                    .field("size", &status.size)
                    .field("max_size", &status.max_size)
                    .finish()
            }
            DataSourcePool::MySql(_) => f.write_str("MySql"),
            DataSourcePool::External => f.write_str("External"),
        }
    }
}

/// A configured, ready-to-use datasource together with its key and dialect metadata
#[derive(Debug, Clone)]
pub struct NamedDataSource {
    key: DataSourceKey,
    dialect: DialectInfo,
    properties: DataSourceProperties,
    pool: DataSourcePool,
}

impl NamedDataSource {
    pub fn new(properties: DataSourceProperties, dialect: DialectInfo, pool: DataSourcePool) -> Self {
        Self {
            key: properties.key(),
            dialect,
            properties,
            pool,
        }
    }

    pub fn key(&self) -> &DataSourceKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn dialect(&self) -> DialectInfo {
        self.dialect
    }

    pub fn properties(&self) -> &DataSourceProperties {
        &self.properties
    }

    pub fn pool(&self) -> &DataSourcePool {
        &self.pool
    }

    pub fn weight(&self) -> u32 {
        self.properties.weight
    }

    pub fn summary(&self) -> DataSourceSummary {
        DataSourceSummary {
            id: self.key.id().to_string(),
            group: self.key.group().to_string(),
            role: self.key.role(),
            database_type: self.dialect.database_type.as_str().to_string(),
            database_version: self.dialect.major_version,
            pooled: self.pool.is_pooled(),
        }
    }
}
