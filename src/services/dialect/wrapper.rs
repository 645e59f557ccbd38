use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;

use crate::api::middleware::AppError;
use crate::models::{PageSpec, SortSpec};
use crate::services::datasource::DialectInfo;
use crate::validation::SqlValidator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub column: String,
    pub ascending: bool,
}

impl OrderByItem {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

impl From<SortSpec> for OrderByItem {
    fn from(sort: SortSpec) -> Self {
        Self {
            column: sort.column,
            ascending: sort.ascending,
        }
    }
}

/// Row window to select: skip `offset` rows, return at most `limit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

impl PageRequest {
    pub fn new(offset: u64, limit: u64) -> Result<Self, AppError> {
        if limit == 0 {
            return Err(AppError::Validation("page limit must be positive".to_string()));
        }
        Ok(Self { offset, limit })
    }

    /// 1-based page number
    pub fn of_page(page_no: u64, page_size: u64) -> Result<Self, AppError> {
        SqlValidator::validate_page(page_no, page_size)?;
        let offset = (page_no - 1).checked_mul(page_size).ok_or_else(|| {
            AppError::Validation(format!(
                "page {} of size {} is out of range",
                page_no, page_size
            ))
        })?;
        Ok(Self {
            offset,
            limit: page_size,
        })
    }
}

impl TryFrom<PageSpec> for PageRequest {
    type Error = AppError;

    fn try_from(page: PageSpec) -> Result<Self, Self::Error> {
        Self::of_page(page.page_no, page.page_size)
    }
}

/// Per-call rewrite instructions carried alongside the statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlRequest {
    pub order_by: Vec<OrderByItem>,
    pub page: Option<PageRequest>,
}

impl SqlRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, item: OrderByItem) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = Some(page);
        self
    }
}

/// A parsed statement plus the dialect it is headed for
#[derive(Debug, Clone)]
pub struct SqlStatementWrapper {
    statement: Statement,
    dialect: DialectInfo,
    request: SqlRequest,
    changed: bool,
}

impl SqlStatementWrapper {
    pub fn new(statement: Statement, dialect: DialectInfo, request: SqlRequest) -> Self {
        Self {
            statement,
            dialect,
            request,
            changed: false,
        }
    }

    /// Parse a single statement with the dialect's parser
    pub fn parse(sql: &str, dialect: DialectInfo, request: SqlRequest) -> Result<Self, AppError> {
        let parser_dialect = dialect.parser_dialect();
        let statement = SqlValidator::parse_single(sql, parser_dialect.as_ref())?;
        Ok(Self::new(statement, dialect, request))
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn dialect(&self) -> DialectInfo {
        self.dialect
    }

    pub fn request(&self) -> &SqlRequest {
        &self.request
    }

    /// Whether any transformer rewrote the statement
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn sql(&self) -> String {
        self.statement.to_string()
    }

    pub fn into_statement(self) -> Statement {
        self.statement
    }

    pub(super) fn replace(&mut self, statement: Statement) {
        if statement != self.statement {
            self.changed = true;
        }
        self.statement = statement;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::datasource::DatabaseType;

    #[test]
    fn test_page_of() {
        let page = PageRequest::of_page(3, 20).unwrap();
        assert_eq!(page, PageRequest { offset: 40, limit: 20 });
        assert!(PageRequest::of_page(0, 20).is_err());
        assert!(PageRequest::new(0, 0).is_err());
    }

    #[test]
    fn test_page_of_out_of_range() {
        let result = PageRequest::of_page(u64::MAX, 2);
        assert!(matches!(result, Err(AppError::Validation(_))));

        let last = PageRequest::of_page(u64::MAX / 10_000, 10_000).unwrap();
        assert_eq!(last.limit, 10_000);
    }

    #[test]
    fn test_parse_and_render() {
        let wrapper = SqlStatementWrapper::parse(
            "select * from t order by id",
            DialectInfo::new(DatabaseType::PostgreSQL, None),
            SqlRequest::new(),
        )
        .unwrap();
        assert_eq!(wrapper.sql(), "SELECT * FROM t ORDER BY id");
        assert!(!wrapper.is_changed());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result = SqlStatementWrapper::parse(
            "SELEC * FRM t",
            DialectInfo::new(DatabaseType::MySQL, None),
            SqlRequest::new(),
        );
        assert!(matches!(result, Err(AppError::InvalidSql(_))));
    }
}
