// Named datasources, their registry and the factory that builds them
pub mod factory;
pub mod named;
pub mod registry;

pub use factory::CentralizedDataSourceFactory;
pub use named::{DataSourcePool, NamedDataSource};
pub use registry::DataSourceRegistry;

use serde::{Deserialize, Serialize};
use sqlparser::dialect::{
    Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use std::fmt;
use std::str::FromStr;

use crate::api::middleware::AppError;

/// Database product behind a datasource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
    MariaDB,
    SQLite,
    SqlServer,
    Oracle,
    DB2,
    H2,
    Generic,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
            DatabaseType::MariaDB => "mariadb",
            DatabaseType::SQLite => "sqlite",
            DatabaseType::SqlServer => "sqlserver",
            DatabaseType::Oracle => "oracle",
            DatabaseType::DB2 => "db2",
            DatabaseType::H2 => "h2",
            DatabaseType::Generic => "generic",
        }
    }
}

impl FromStr for DatabaseType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseType::PostgreSQL),
            "mysql" => Ok(DatabaseType::MySQL),
            "mariadb" => Ok(DatabaseType::MariaDB),
            "sqlite" => Ok(DatabaseType::SQLite),
            "sqlserver" | "mssql" => Ok(DatabaseType::SqlServer),
            "oracle" => Ok(DatabaseType::Oracle),
            "db2" => Ok(DatabaseType::DB2),
            "h2" => Ok(DatabaseType::H2),
            "generic" | "ansi" => Ok(DatabaseType::Generic),
            _ => Err(AppError::Configuration(format!(
                "Unsupported database type: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a dialect expresses row-window pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `OFFSET m ROWS FETCH FIRST n ROWS ONLY`
    OffsetFetch { requires_order_by: bool },
    /// `ROW_NUMBER() OVER (ORDER BY ..)` window wrapped in a filtering subquery (SQL Server before 2012)
    RowNumberWindow,
    /// Nested `ROWNUM` filters (Oracle before 12c)
    RowNumFilter,
}

/// Product and version metadata of a datasource, consumed by clause transformers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectInfo {
    pub database_type: DatabaseType,
    /// Major version; `None` means "assume a current release"
    pub major_version: Option<u32>,
}

impl DialectInfo {
    pub fn new(database_type: DatabaseType, major_version: Option<u32>) -> Self {
        Self {
            database_type,
            major_version,
        }
    }

    pub fn pagination_style(&self) -> PaginationStyle {
        match self.database_type {
            DatabaseType::PostgreSQL
            | DatabaseType::MySQL
            | DatabaseType::MariaDB
            | DatabaseType::SQLite
            | DatabaseType::H2
            | DatabaseType::Generic => PaginationStyle::LimitOffset,
            // SQL Server 2012 is major version 11
            DatabaseType::SqlServer => match self.major_version {
                Some(v) if v < 11 => PaginationStyle::RowNumberWindow,
                _ => PaginationStyle::OffsetFetch {
                    requires_order_by: true,
                },
            },
            DatabaseType::Oracle => match self.major_version {
                Some(v) if v < 12 => PaginationStyle::RowNumFilter,
                _ => PaginationStyle::OffsetFetch {
                    requires_order_by: false,
                },
            },
            DatabaseType::DB2 => PaginationStyle::OffsetFetch {
                requires_order_by: false,
            },
        }
    }

    /// Parser dialect used to read statements targeted at this product
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self.database_type {
            DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
            DatabaseType::MySQL | DatabaseType::MariaDB => Box::new(MySqlDialect {}),
            DatabaseType::SQLite => Box::new(SQLiteDialect {}),
            DatabaseType::SqlServer => Box::new(MsSqlDialect {}),
            DatabaseType::Oracle | DatabaseType::DB2 | DatabaseType::H2 | DatabaseType::Generic => {
                Box::new(GenericDialect {})
            }
        }
    }
}

impl fmt::Display for DialectInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.major_version {
            Some(v) => write!(f, "{} {}", self.database_type, v),
            None => write!(f, "{}", self.database_type),
        }
    }
}
