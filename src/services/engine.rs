use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::middleware::AppError;
use crate::config::{Config, DialectConfig, DynamicDataSourceConfig};
use crate::models::{DataSourceKey, DataSourceSummary, InvocationDescriptor};
use crate::services::datasource::{
    CentralizedDataSourceFactory, DataSourceRegistry, DialectInfo, NamedDataSource,
};
use crate::services::dialect::{SqlRequest, SqlStatementWrapper, TransformerPipeline};
use crate::services::routing::{DataSourceKeySelector, SelectorBuilder};
use crate::services::transaction::{ResourceProvider, TransactionContext, TransactionManager};

/// Blank names from configuration mean "not configured"
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A statement ready for dispatch on one datasource
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub key: DataSourceKey,
    pub dialect: DialectInfo,
    pub sql: String,
    pub changed: bool,
}

/// The routing datasource: resolves every invocation to exactly one named
/// datasource, enlists it in the caller's transaction and rewrites the SQL
/// for that datasource's dialect.
pub struct DynamicDataSource {
    registry: Arc<DataSourceRegistry>,
    selector: DataSourceKeySelector,
    pipeline: TransformerPipeline,
    transaction_manager: TransactionManager,
}

impl DynamicDataSource {
    pub fn new(selector: DataSourceKeySelector, pipeline: TransformerPipeline) -> Self {
        Self {
            registry: selector.registry().clone(),
            selector,
            pipeline,
            transaction_manager: TransactionManager::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::from_settings(&config.dynamic_datasource, &config.dialect)
    }

    /// Build pools, registry, allocation table and pipeline; any inconsistency fails startup
    pub fn from_settings(
        settings: &DynamicDataSourceConfig,
        dialect: &DialectConfig,
    ) -> Result<Self, AppError> {
        let registry = if settings.enabled {
            CentralizedDataSourceFactory::new().build_registry(&settings.datasources)?
        } else {
            warn!("Dynamic datasource routing is disabled; no datasource is registered");
            DataSourceRegistry::new()
        };
        let registry = Arc::new(registry);

        let mut builder = SelectorBuilder::new(registry.clone());
        builder.register_builtin_routers()?;

        if let Some(router) = non_blank(&settings.default_router) {
            builder.default_router(router);
        }
        if settings.enabled {
            if let Some(group) = non_blank(&settings.default_group) {
                builder.default_group(group);
            }
            for allocation in &settings.allocations {
                if let Some(router) = &allocation.router {
                    builder.allocate_router(&allocation.group, router);
                }
                if let Some(pattern) = &allocation.write_pattern {
                    builder.allocate_write_matcher(&allocation.group, pattern)?;
                }
            }
            for declaration in &settings.method_keys {
                builder
                    .key_registry_mut()
                    .declare(&declaration.operation, &declaration.key);
            }
        }

        let selector = builder.build()?;
        let pipeline = TransformerPipeline::standard(dialect);
        info!(
            "Dynamic datasource ready: {} datasource(s), transformers {:?}",
            registry.len(),
            pipeline.names()
        );

        Ok(Self::new(selector, pipeline))
    }

    pub fn registry(&self) -> &DataSourceRegistry {
        &self.registry
    }

    pub fn selector(&self) -> &DataSourceKeySelector {
        &self.selector
    }

    pub fn pipeline(&self) -> &TransformerPipeline {
        &self.pipeline
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.transaction_manager
    }

    pub fn datasources(&self) -> Vec<DataSourceSummary> {
        self.registry.iter().map(NamedDataSource::summary).collect()
    }

    pub fn datasource(&self, id: &str) -> Result<&NamedDataSource, AppError> {
        self.registry
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("datasource {}", id)))
    }

    /// Pick the datasource an invocation runs on
    pub fn resolve(&self, invocation: &InvocationDescriptor) -> Result<&NamedDataSource, AppError> {
        let key = self.selector.select(invocation)?;
        self.registry.get(key.id()).ok_or_else(|| {
            AppError::Routing(format!("selected datasource {} is not registered", key))
        })
    }

    /// Route the invocation and rewrite `sql` for the chosen datasource
    pub fn prepare(
        &self,
        invocation: &InvocationDescriptor,
        sql: &str,
        request: SqlRequest,
    ) -> Result<PreparedStatement, AppError> {
        let datasource = self.resolve(invocation)?;
        self.prepare_on(datasource, sql, request)
    }

    /// Rewrite `sql` for a known datasource without routing
    pub fn prepare_on(
        &self,
        datasource: &NamedDataSource,
        sql: &str,
        request: SqlRequest,
    ) -> Result<PreparedStatement, AppError> {
        let wrapper = SqlStatementWrapper::parse(sql, datasource.dialect(), request)?;
        let wrapper = self.pipeline.apply(wrapper)?;
        Ok(PreparedStatement {
            key: datasource.key().clone(),
            dialect: datasource.dialect(),
            changed: wrapper.is_changed(),
            sql: wrapper.sql(),
        })
    }

    /// Bind a resource for `key` to the current transaction unless one is already bound.
    ///
    /// Returns whether a new resource was acquired. Without an active transaction this is
    /// a no-op. A failed acquisition marks the transaction rollback-only.
    pub async fn enlist(
        &self,
        ctx: &mut TransactionContext,
        key: &DataSourceKey,
        provider: &dyn ResourceProvider,
    ) -> Result<bool, AppError> {
        let Some(transaction) = ctx.current() else {
            return Ok(false);
        };
        if transaction.has_resource(Some(key)) {
            return Ok(false);
        }
        let definition = transaction.definition().clone();

        let datasource = self.registry.get(key.id()).ok_or_else(|| {
            AppError::Routing(format!("datasource {} is not registered", key))
        })?;

        match provider.acquire(datasource, &definition).await {
            Ok(resource) => {
                if let Some(transaction) = ctx.current_mut() {
                    debug!("Enlisted {} in transaction {}", key, transaction.id());
                    transaction.bind_resource(Some(key.clone()), resource);
                }
                Ok(true)
            }
            Err(e) => {
                if let Some(transaction) = ctx.current_mut() {
                    transaction.set_rollback_only();
                }
                Err(e)
            }
        }
    }

    /// Full per-call flow: route, enlist in the current transaction, rewrite
    pub async fn dispatch(
        &self,
        ctx: &mut TransactionContext,
        invocation: &InvocationDescriptor,
        sql: &str,
        request: SqlRequest,
        provider: &dyn ResourceProvider,
    ) -> Result<PreparedStatement, AppError> {
        let prepared = self.prepare(invocation, sql, request)?;
        self.enlist(ctx, &prepared.key, provider).await?;
        Ok(prepared)
    }
}
