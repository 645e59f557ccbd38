use sqlparser::ast::{
    Expr, Ident, OrderBy, OrderByExpr, OrderByKind, OrderByOptions, Query, Statement,
};
use tracing::debug;

use super::{ClauseTransformer, OrderByItem, SqlStatementWrapper};
use crate::api::middleware::AppError;
use crate::validation::SqlValidator;

pub const ORDER_BY: &str = "order-by";

/// Appends requested sort items that the query does not already order by.
///
/// A column already present in the ORDER BY keeps its original direction.
pub struct OrderByTransformer {
    enabled: bool,
}

impl OrderByTransformer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn missing_items<'a>(query: &Query, requested: &'a [OrderByItem]) -> Vec<&'a OrderByItem> {
        let existing: Vec<String> = match query.order_by.as_ref().map(|o| &o.kind) {
            Some(OrderByKind::Expressions(exprs)) => exprs
                .iter()
                .map(|e| e.expr.to_string().to_lowercase())
                .collect(),
            _ => Vec::new(),
        };

        requested
            .iter()
            .filter(|item| !existing.contains(&item.column.to_lowercase()))
            .collect()
    }

    fn column_expr(column: &str) -> Expr {
        let mut parts: Vec<Ident> = column.split('.').map(Ident::new).collect();
        if parts.len() == 1 {
            Expr::Identifier(parts.remove(0))
        } else {
            Expr::CompoundIdentifier(parts)
        }
    }
}

impl Default for OrderByTransformer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ClauseTransformer for OrderByTransformer {
    fn name(&self) -> &str {
        ORDER_BY
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn transformable(&self, wrapper: &SqlStatementWrapper) -> bool {
        match wrapper.statement() {
            Statement::Query(query) => {
                !Self::missing_items(query, &wrapper.request().order_by).is_empty()
            }
            _ => false,
        }
    }

    fn transform(&self, wrapper: &SqlStatementWrapper) -> Result<Statement, AppError> {
        let Statement::Query(query) = wrapper.statement() else {
            return Err(AppError::Transform(
                "ORDER BY can only be applied to a query".to_string(),
            ));
        };

        let mut query = query.clone();
        let missing = Self::missing_items(&query, &wrapper.request().order_by);
        let mut appended = Vec::with_capacity(missing.len());
        for item in missing {
            SqlValidator::validate_sort_column(&item.column)
                .map_err(|e| AppError::Transform(e.to_string()))?;
            appended.push(OrderByExpr {
                expr: Self::column_expr(&item.column),
                options: OrderByOptions {
                    asc: Some(item.ascending),
                    nulls_first: None,
                },
                with_fill: None,
            });
        }

        debug!("Appending {} ORDER BY item(s)", appended.len());

        match query.order_by.as_mut() {
            None => {
                query.order_by = Some(OrderBy {
                    kind: OrderByKind::Expressions(appended),
                    interpolate: None,
                });
            }
            Some(OrderBy {
                kind: OrderByKind::Expressions(exprs),
                ..
            }) => exprs.extend(appended),
            Some(OrderBy {
                kind: OrderByKind::All(_),
                ..
            }) => {
                return Err(AppError::Transform(
                    "cannot append sort items to ORDER BY ALL".to_string(),
                ));
            }
        }

        Ok(Statement::Query(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::datasource::{DatabaseType, DialectInfo};
    use crate::services::dialect::SqlRequest;

    fn wrap(sql: &str, request: SqlRequest) -> SqlStatementWrapper {
        SqlStatementWrapper::parse(sql, DialectInfo::new(DatabaseType::PostgreSQL, Some(15)), request)
            .unwrap()
    }

    #[test]
    fn test_adds_order_by_when_absent() {
        let wrapper = wrap(
            "SELECT * FROM users",
            SqlRequest::new().order_by(OrderByItem::desc("created_at")),
        );
        let transformer = OrderByTransformer::default();
        assert!(transformer.transformable(&wrapper));
        let stmt = transformer.transform(&wrapper).unwrap();
        assert_eq!(stmt.to_string(), "SELECT * FROM users ORDER BY created_at DESC");
    }

    #[test]
    fn test_appends_only_missing_columns() {
        let wrapper = wrap(
            "SELECT * FROM users ORDER BY ID DESC",
            SqlRequest::new()
                .order_by(OrderByItem::asc("id"))
                .order_by(OrderByItem::asc("u.name")),
        );
        let stmt = OrderByTransformer::default().transform(&wrapper).unwrap();
        assert_eq!(
            stmt.to_string(),
            "SELECT * FROM users ORDER BY ID DESC, u.name ASC"
        );
    }

    #[test]
    fn test_not_transformable_when_satisfied() {
        let wrapper = wrap(
            "SELECT * FROM users ORDER BY id",
            SqlRequest::new().order_by(OrderByItem::asc("id")),
        );
        assert!(!OrderByTransformer::default().transformable(&wrapper));

        let no_request = wrap("SELECT * FROM users", SqlRequest::new());
        assert!(!OrderByTransformer::default().transformable(&no_request));
    }

    #[test]
    fn test_rejects_unsafe_column() {
        let wrapper = wrap(
            "SELECT * FROM users",
            SqlRequest::new().order_by(OrderByItem::asc("id; DROP TABLE users")),
        );
        let result = OrderByTransformer::default().transform(&wrapper);
        assert!(matches!(result, Err(AppError::Transform(_))));
    }

    #[test]
    fn test_ignores_non_query_statements() {
        let wrapper = wrap(
            "DELETE FROM users WHERE id = 1",
            SqlRequest::new().order_by(OrderByItem::asc("id")),
        );
        assert!(!OrderByTransformer::default().transformable(&wrapper));
    }
}
