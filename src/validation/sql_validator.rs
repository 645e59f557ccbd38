use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::Dialect;
use sqlparser::parser::Parser;
use regex::Regex;
use std::sync::LazyLock;

use crate::api::middleware::AppError;

/// Upper bound for a single page, guards against unbounded result sets
pub const MAX_PAGE_SIZE: u64 = 10_000;

/// Plain or qualified column reference: `id`, `o.created_at`, `schema.t.col`
static SORT_COLUMN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*){0,2}$")
        .expect("sort column regex is valid")
});

/// SQL validation service for statements entering the transformation pipeline
pub struct SqlValidator;

impl SqlValidator {
    /// Parse exactly one statement with the given dialect
    pub fn parse_single(sql: &str, dialect: &dyn Dialect) -> Result<Statement, AppError> {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return Err(AppError::InvalidSql("Empty SQL statement".to_string()));
        }

        let mut parser = Parser::new(dialect)
            .try_with_sql(trimmed)
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

        let mut ast = parser
            .parse_statements()
            .map_err(|e| AppError::InvalidSql(format!("SQL parsing error: {}", e)))?;

        match ast.len() {
            0 => Err(AppError::InvalidSql("Empty SQL statement".to_string())),
            1 => Ok(ast.remove(0)),
            n => Err(AppError::InvalidSql(format!(
                "Expected a single statement, found {}",
                n
            ))),
        }
    }

    /// Reject sort columns that are not plain identifiers
    pub fn validate_sort_column(column: &str) -> Result<(), AppError> {
        if SORT_COLUMN_REGEX.is_match(column) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Invalid sort column: {:?}",
                column
            )))
        }
    }

    pub fn validate_page(page_no: u64, page_size: u64) -> Result<(), AppError> {
        if page_no == 0 {
            return Err(AppError::Validation("page_no starts at 1".to_string()));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Whether the statement already limits its rows.
    ///
    /// Besides LIMIT, OFFSET and FETCH this covers SQL Server `TOP` and a top-level
    /// WHERE filtering on a ROWNUM position (Oracle `ROWNUM` or the `rownum_` column
    /// produced by subquery pagination).
    pub fn has_pagination(stmt: &Statement) -> bool {
        let Statement::Query(query) = stmt else {
            return false;
        };
        if query.limit_clause.is_some() || query.fetch.is_some() {
            return true;
        }
        match query.body.as_ref() {
            SetExpr::Select(select) => {
                select.top.is_some()
                    || select
                        .selection
                        .as_ref()
                        .is_some_and(|filter| filter.to_string().to_uppercase().contains("ROWNUM"))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::{GenericDialect, MsSqlDialect, PostgreSqlDialect};

    #[test]
    fn test_parse_single() {
        let stmt = SqlValidator::parse_single("SELECT * FROM users", &PostgreSqlDialect {}).unwrap();
        assert!(matches!(stmt, Statement::Query(_)));

        assert!(SqlValidator::parse_single("   ", &GenericDialect {}).is_err());
        assert!(SqlValidator::parse_single("SELEC oops", &GenericDialect {}).is_err());
    }

    #[test]
    fn test_parse_rejects_multiple_statements() {
        let result = SqlValidator::parse_single("SELECT 1; SELECT 2", &GenericDialect {});
        assert!(matches!(result, Err(AppError::InvalidSql(_))));
    }

    #[test]
    fn test_validate_sort_column() {
        assert!(SqlValidator::validate_sort_column("id").is_ok());
        assert!(SqlValidator::validate_sort_column("o.created_at").is_ok());
        assert!(SqlValidator::validate_sort_column("").is_err());
        assert!(SqlValidator::validate_sort_column("id; DROP TABLE t").is_err());
        assert!(SqlValidator::validate_sort_column("1abc").is_err());
    }

    #[test]
    fn test_validate_page() {
        assert!(SqlValidator::validate_page(1, 20).is_ok());
        assert!(SqlValidator::validate_page(0, 20).is_err());
        assert!(SqlValidator::validate_page(1, 0).is_err());
        assert!(SqlValidator::validate_page(1, MAX_PAGE_SIZE + 1).is_err());
    }

    #[test]
    fn test_has_pagination() {
        let dialect = PostgreSqlDialect {};
        let plain = SqlValidator::parse_single("SELECT * FROM users", &dialect).unwrap();
        let limited = SqlValidator::parse_single("SELECT * FROM users LIMIT 10", &dialect).unwrap();
        let offset = SqlValidator::parse_single("SELECT * FROM users OFFSET 10", &dialect).unwrap();
        assert!(!SqlValidator::has_pagination(&plain));
        assert!(SqlValidator::has_pagination(&limited));
        assert!(SqlValidator::has_pagination(&offset));
    }

    #[test]
    fn test_has_pagination_top_and_rownum() {
        let top = SqlValidator::parse_single("SELECT TOP 5 * FROM users", &MsSqlDialect {}).unwrap();
        assert!(SqlValidator::has_pagination(&top));

        let rownum = SqlValidator::parse_single(
            "SELECT * FROM (SELECT * FROM users) WHERE ROWNUM <= 10",
            &GenericDialect {},
        )
        .unwrap();
        assert!(SqlValidator::has_pagination(&rownum));

        let filtered = SqlValidator::parse_single("SELECT * FROM users WHERE id > 3", &GenericDialect {}).unwrap();
        assert!(!SqlValidator::has_pagination(&filtered));
    }
}
