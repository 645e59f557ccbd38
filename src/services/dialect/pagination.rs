use sqlparser::ast::{
    Expr, Fetch, Ident, LimitClause, Offset, OffsetRows, OrderBy, OrderByKind, Query, SelectItem,
    SetExpr, Statement, Value,
};
use sqlparser::parser::Parser;
use tracing::debug;

use super::{ClauseTransformer, PageRequest, SqlStatementWrapper};
use crate::api::middleware::AppError;
use crate::services::datasource::{DialectInfo, PaginationStyle};
use crate::validation::SqlValidator;

pub const PAGINATION: &str = "pagination";

/// Column carrying the row position in subquery-based pagination
pub const ROW_POSITION_ALIAS: &str = "rownum_";

/// Injects a row window in the target dialect's syntax.
///
/// Statements that already carry LIMIT, OFFSET, FETCH, TOP or a ROWNUM filter are left
/// alone, which also makes a second pass over rewritten SQL a no-op.
pub struct PaginationTransformer {
    enabled: bool,
}

impl PaginationTransformer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for PaginationTransformer {
    fn default() -> Self {
        Self::new(true)
    }
}

fn number(n: u64) -> Expr {
    Expr::value(Value::Number(n.to_string(), false))
}

fn window_end(page: PageRequest) -> Result<u64, AppError> {
    page.offset.checked_add(page.limit).ok_or_else(|| {
        AppError::Transform(format!(
            "row window offset {} limit {} overflows",
            page.offset, page.limit
        ))
    })
}

fn reparse(sql: &str, dialect: DialectInfo) -> Result<Statement, AppError> {
    let parser_dialect = dialect.parser_dialect();
    SqlValidator::parse_single(sql, parser_dialect.as_ref())
        .map_err(|e| AppError::Transform(format!("paginated SQL for {} is invalid: {}", dialect, e)))
}

/// `SELECT * FROM (<query + ROW_NUMBER() column>) AS paged_ WHERE rownum_ > m AND rownum_ <= m + n`
fn row_number_window(query: &Query, page: PageRequest, dialect: DialectInfo) -> Result<Statement, AppError> {
    let order_by = match &query.order_by {
        Some(OrderBy {
            kind: OrderByKind::Expressions(exprs),
            ..
        }) if !exprs.is_empty() => exprs,
        _ => {
            return Err(AppError::Transform(format!(
                "{} requires ORDER BY for ROW_NUMBER pagination",
                dialect
            )))
        }
    };
    if query.with.is_some() {
        return Err(AppError::Transform(format!(
            "{} cannot paginate a query with a WITH clause",
            dialect
        )));
    }
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(AppError::Transform(format!(
            "{} can only paginate a plain SELECT",
            dialect
        )));
    };
    if select.distinct.is_some() {
        return Err(AppError::Transform(format!(
            "{} cannot paginate SELECT DISTINCT with ROW_NUMBER",
            dialect
        )));
    }

    let window: Vec<String> = order_by.iter().map(ToString::to_string).collect();
    let parser_dialect = dialect.parser_dialect();
    let row_number = Parser::new(parser_dialect.as_ref())
        .try_with_sql(&format!("ROW_NUMBER() OVER (ORDER BY {})", window.join(", ")))
        .and_then(|mut parser| parser.parse_expr())
        .map_err(|e| AppError::Transform(format!("cannot build ROW_NUMBER window: {}", e)))?;

    let mut select = select.clone();
    select.projection.push(SelectItem::ExprWithAlias {
        expr: row_number,
        alias: Ident::new(ROW_POSITION_ALIAS),
    });
    let mut inner = query.clone();
    inner.order_by = None;
    inner.body = Box::new(SetExpr::Select(select));

    let sql = format!(
        "SELECT * FROM ({inner}) AS paged_ WHERE {alias} > {offset} AND {alias} <= {end} ORDER BY {alias}",
        inner = inner,
        alias = ROW_POSITION_ALIAS,
        offset = page.offset,
        end = window_end(page)?,
    );
    reparse(&sql, dialect)
}

/// Nested ROWNUM filters; the inner query keeps its own ORDER BY
fn rownum_filter(query: &Query, page: PageRequest, dialect: DialectInfo) -> Result<Statement, AppError> {
    let end = window_end(page)?;
    let sql = if page.offset == 0 {
        format!("SELECT * FROM ({}) WHERE ROWNUM <= {}", query, end)
    } else {
        format!(
            "SELECT * FROM (SELECT row_.*, ROWNUM AS {alias} FROM ({query}) row_ WHERE ROWNUM <= {end}) WHERE {alias} > {offset}",
            alias = ROW_POSITION_ALIAS,
            query = query,
            end = end,
            offset = page.offset,
        )
    };
    reparse(&sql, dialect)
}

impl ClauseTransformer for PaginationTransformer {
    fn name(&self) -> &str {
        PAGINATION
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn transformable(&self, wrapper: &SqlStatementWrapper) -> bool {
        wrapper.request().page.is_some()
            && matches!(wrapper.statement(), Statement::Query(_))
            && !SqlValidator::has_pagination(wrapper.statement())
    }

    fn transform(&self, wrapper: &SqlStatementWrapper) -> Result<Statement, AppError> {
        let Statement::Query(query) = wrapper.statement() else {
            return Err(AppError::Transform(
                "pagination can only be applied to a query".to_string(),
            ));
        };
        let page = wrapper
            .request()
            .page
            .ok_or_else(|| AppError::Transform("no page requested".to_string()))?;

        let dialect = wrapper.dialect();
        let mut query = query.clone();
        match dialect.pagination_style() {
            PaginationStyle::LimitOffset => {
                query.limit_clause = Some(LimitClause::LimitOffset {
                    limit: Some(number(page.limit)),
                    offset: (page.offset > 0).then(|| Offset {
                        value: number(page.offset),
                        rows: OffsetRows::None,
                    }),
                    limit_by: vec![],
                });
            }
            PaginationStyle::OffsetFetch { requires_order_by } => {
                if requires_order_by && query.order_by.is_none() {
                    return Err(AppError::Transform(format!(
                        "{} requires ORDER BY for OFFSET/FETCH pagination",
                        dialect
                    )));
                }
                query.limit_clause = Some(LimitClause::LimitOffset {
                    limit: None,
                    offset: Some(Offset {
                        value: number(page.offset),
                        rows: OffsetRows::Rows,
                    }),
                    limit_by: vec![],
                });
                query.fetch = Some(Fetch {
                    with_ties: false,
                    percent: false,
                    quantity: Some(number(page.limit)),
                });
            }
            PaginationStyle::RowNumberWindow => {
                debug!("Paginated for {} with ROW_NUMBER window", dialect);
                return row_number_window(&query, page, dialect);
            }
            PaginationStyle::RowNumFilter => {
                debug!("Paginated for {} with ROWNUM filter", dialect);
                return rownum_filter(&query, page, dialect);
            }
        }

        debug!(
            "Paginated for {}: offset {} limit {}",
            dialect, page.offset, page.limit
        );
        Ok(Statement::Query(query))
    }
}
