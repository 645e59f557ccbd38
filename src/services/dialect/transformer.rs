use sqlparser::ast::Statement;

use super::SqlStatementWrapper;
use crate::api::middleware::AppError;

/// One clause rewrite step of the pipeline.
///
/// `transform` runs only when `enabled` and `transformable` both hold. A transformer
/// that claims a statement but cannot rewrite it safely returns `AppError::Transform`.
/// `transformable` must report false for statements it already rewrote.
pub trait ClauseTransformer: Send + Sync {
    fn name(&self) -> &str;

    /// Configuration-level switch for the whole transformer
    fn enabled(&self) -> bool;

    /// Per-statement applicability
    fn transformable(&self, wrapper: &SqlStatementWrapper) -> bool;

    fn transform(&self, wrapper: &SqlStatementWrapper) -> Result<Statement, AppError>;
}
