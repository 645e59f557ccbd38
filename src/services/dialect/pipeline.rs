use std::sync::Arc;

use tracing::debug;

use super::{
    ClauseTransformer, OrderByTransformer, PaginationTransformer, SqlRequest, SqlStatementWrapper,
};
use crate::api::middleware::AppError;
use crate::config::DialectConfig;
use crate::services::datasource::DialectInfo;

/// Ordered list of clause transformers, applied one after another
#[derive(Clone)]
pub struct TransformerPipeline {
    transformers: Vec<Arc<dyn ClauseTransformer>>,
}

impl TransformerPipeline {
    pub fn builder() -> TransformerPipelineBuilder {
        TransformerPipelineBuilder::default()
    }

    /// ORDER BY first so that pagination can rely on it
    pub fn standard(config: &DialectConfig) -> Self {
        Self {
            transformers: vec![
                Arc::new(OrderByTransformer::new(config.order_by_enabled)),
                Arc::new(PaginationTransformer::new(config.pagination_enabled)),
            ],
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Run every enabled, applicable transformer in order.
    ///
    /// The first failure aborts the whole pipeline.
    pub fn apply(&self, mut wrapper: SqlStatementWrapper) -> Result<SqlStatementWrapper, AppError> {
        for transformer in &self.transformers {
            if !transformer.enabled() || !transformer.transformable(&wrapper) {
                continue;
            }
            let statement = transformer.transform(&wrapper)?;
            debug!("Transformer '{}' rewrote statement", transformer.name());
            wrapper.replace(statement);
        }
        Ok(wrapper)
    }

    /// Parse, transform and render in one step
    pub fn rewrite(
        &self,
        sql: &str,
        dialect: DialectInfo,
        request: SqlRequest,
    ) -> Result<String, AppError> {
        let wrapper = SqlStatementWrapper::parse(sql, dialect, request)?;
        Ok(self.apply(wrapper)?.sql())
    }
}

impl Default for TransformerPipeline {
    fn default() -> Self {
        Self::standard(&DialectConfig::default())
    }
}

#[derive(Default)]
pub struct TransformerPipelineBuilder {
    transformers: Vec<Arc<dyn ClauseTransformer>>,
}

impl TransformerPipelineBuilder {
    pub fn register(&mut self, transformer: Arc<dyn ClauseTransformer>) -> Result<&mut Self, AppError> {
        if self.transformers.iter().any(|t| t.name() == transformer.name()) {
            return Err(AppError::Configuration(format!(
                "Transformer '{}' is already registered",
                transformer.name()
            )));
        }
        self.transformers.push(transformer);
        Ok(self)
    }

    pub fn build(&mut self) -> TransformerPipeline {
        TransformerPipeline {
            transformers: std::mem::take(&mut self.transformers),
        }
    }
}
