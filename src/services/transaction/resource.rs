use async_trait::async_trait;
use mysql_async::prelude::Queryable;

use super::TransactionDefinition;
use crate::api::middleware::AppError;
use crate::models::DataSourceKey;
use crate::services::datasource::{DataSourcePool, NamedDataSource};

/// A resource enlisted in a transaction under a datasource key.
///
/// Completing a resource consumes it, which also returns its connection to the pool.
#[async_trait]
pub trait TransactionalResource: Send {
    fn key(&self) -> &DataSourceKey;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

/// Acquires a transactional resource for a datasource
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn acquire(
        &self,
        datasource: &NamedDataSource,
        definition: &TransactionDefinition,
    ) -> Result<Box<dyn TransactionalResource>, AppError>;
}

/// Checks a connection out of the datasource's pool and opens a transaction on it
#[derive(Debug, Default)]
pub struct PooledResourceProvider;

impl PooledResourceProvider {
    pub fn new() -> Self {
        Self
    }

    fn postgres_begin(definition: &TransactionDefinition) -> String {
        let mut sql = String::from("BEGIN");
        if let Some(level) = definition.isolation.sql() {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level);
        }
        if definition.read_only {
            sql.push_str(" READ ONLY");
        }
        sql
    }

    fn mysql_begin(definition: &TransactionDefinition) -> Vec<String> {
        let mut statements = Vec::with_capacity(2);
        if let Some(level) = definition.isolation.sql() {
            statements.push(format!("SET TRANSACTION ISOLATION LEVEL {}", level));
        }
        if definition.read_only {
            statements.push("START TRANSACTION READ ONLY".to_string());
        } else {
            statements.push("START TRANSACTION".to_string());
        }
        statements
    }
}

#[async_trait]
impl ResourceProvider for PooledResourceProvider {
    async fn acquire(
        &self,
        datasource: &NamedDataSource,
        definition: &TransactionDefinition,
    ) -> Result<Box<dyn TransactionalResource>, AppError> {
        match datasource.pool() {
            DataSourcePool::Postgres(pool) => {
                let client = pool.get().await.map_err(|e| {
                    AppError::Connection(format!(
                        "Failed to get connection for {} from pool: {}",
                        datasource.key(),
                        e
                    ))
                })?;
                client
                    .batch_execute(&Self::postgres_begin(definition))
                    .await
                    .map_err(|e| AppError::Connection(format!("Failed to begin transaction on {}: {}", datasource.key(), e)))?;
                Ok(Box::new(PostgresConnectionResource {
                    key: datasource.key().clone(),
                    client,
                }))
            }
            DataSourcePool::MySql(pool) => {
                let mut conn = pool.get_conn().await.map_err(|e| {
                    AppError::Connection(format!(
                        "Failed to get connection for {} from pool: {}",
                        datasource.key(),
                        e
                    ))
                })?;
                for statement in Self::mysql_begin(definition) {
                    conn.query_drop(statement)
                        .await
                        .map_err(|e| AppError::Connection(format!("Failed to begin transaction on {}: {}", datasource.key(), e)))?;
                }
                Ok(Box::new(MySqlConnectionResource {
                    key: datasource.key().clone(),
                    conn,
                }))
            }
            DataSourcePool::External => Err(AppError::Connection(format!(
                "datasource {} has no managed pool; enlist it through its own provider",
                datasource.key()
            ))),
        }
    }
}

/// Pooled PostgreSQL connection with an open transaction
pub struct PostgresConnectionResource {
    key: DataSourceKey,
    client: deadpool_postgres::Object,
}

impl PostgresConnectionResource {
    pub fn client(&self) -> &deadpool_postgres::Object {
        &self.client
    }
}

#[async_trait]
impl TransactionalResource for PostgresConnectionResource {
    fn key(&self) -> &DataSourceKey {
        &self.key
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| AppError::Transaction(format!("COMMIT failed on {}: {}", self.key, e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| AppError::Transaction(format!("ROLLBACK failed on {}: {}", self.key, e)))
    }
}

/// Pooled MySQL connection with an open transaction
pub struct MySqlConnectionResource {
    key: DataSourceKey,
    conn: mysql_async::Conn,
}

impl MySqlConnectionResource {
    pub fn conn_mut(&mut self) -> &mut mysql_async::Conn {
        &mut self.conn
    }
}

#[async_trait]
impl TransactionalResource for MySqlConnectionResource {
    fn key(&self) -> &DataSourceKey {
        &self.key
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MySqlConnectionResource { key, mut conn } = *self;
        conn.query_drop("COMMIT")
            .await
            .map_err(|e| AppError::Transaction(format!("COMMIT failed on {}: {}", key, e)))
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        let MySqlConnectionResource { key, mut conn } = *self;
        conn.query_drop("ROLLBACK")
            .await
            .map_err(|e| AppError::Transaction(format!("ROLLBACK failed on {}: {}", key, e)))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::{Arc, Mutex};

    pub type Journal = Arc<Mutex<Vec<String>>>;

    /// Resource that records how it was completed
    pub struct RecordingResource {
        key: DataSourceKey,
        journal: Journal,
        fail_commit: bool,
        fail_rollback: bool,
    }

    impl RecordingResource {
        pub fn new(key: DataSourceKey) -> (Box<dyn TransactionalResource>, Journal) {
            let journal = Journal::default();
            (Self::with_journal(key, journal.clone(), false), journal)
        }

        pub fn with_journal(key: DataSourceKey, journal: Journal, fail_commit: bool) -> Box<dyn TransactionalResource> {
            Box::new(Self {
                key,
                journal,
                fail_commit,
                fail_rollback: false,
            })
        }

        /// Resource whose commit and rollback both fail
        pub fn failing_rollback(key: DataSourceKey, journal: Journal) -> Box<dyn TransactionalResource> {
            Box::new(Self {
                key,
                journal,
                fail_commit: true,
                fail_rollback: true,
            })
        }
    }

    #[async_trait]
    impl TransactionalResource for RecordingResource {
        fn key(&self) -> &DataSourceKey {
            &self.key
        }

        async fn commit(self: Box<Self>) -> Result<(), AppError> {
            if self.fail_commit {
                self.journal.lock().unwrap().push(format!("commit-failed:{}", self.key.id()));
                return Err(AppError::Transaction(format!("commit failed on {}", self.key)));
            }
            self.journal.lock().unwrap().push(format!("commit:{}", self.key.id()));
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), AppError> {
            if self.fail_rollback {
                self.journal.lock().unwrap().push(format!("rollback-failed:{}", self.key.id()));
                return Err(AppError::Connection(format!("rollback failed on {}", self.key)));
            }
            self.journal.lock().unwrap().push(format!("rollback:{}", self.key.id()));
            Ok(())
        }
    }

    /// Provider handing out recording resources, optionally failing
    pub struct RecordingProvider {
        pub journal: Journal,
        pub fail: bool,
    }

    #[async_trait]
    impl ResourceProvider for RecordingProvider {
        async fn acquire(
            &self,
            datasource: &NamedDataSource,
            _definition: &TransactionDefinition,
        ) -> Result<Box<dyn TransactionalResource>, AppError> {
            if self.fail {
                return Err(AppError::Connection(format!("{} unavailable", datasource.key())));
            }
            self.journal.lock().unwrap().push(format!("acquire:{}", datasource.id()));
            Ok(RecordingResource::with_journal(datasource.key().clone(), self.journal.clone(), false))
        }
    }
}
