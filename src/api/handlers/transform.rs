use axum::{extract::State, Json};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{TransformRequest, TransformResponse};
use crate::services::dialect::{PageRequest, SqlRequest};

/// Rewrite SQL for the dialect of an explicit or routed datasource
pub async fn transform_sql(
    State(state): State<AppState>,
    Json(payload): Json<TransformRequest>,
) -> Result<Json<TransformResponse>, AppError> {
    let sql = payload.sql.trim();
    if sql.is_empty() {
        return Err(AppError::Validation("SQL cannot be empty".to_string()));
    }

    let engine = &state.engine;
    let datasource = match (&payload.datasource, &payload.invocation) {
        (Some(id), _) => engine.datasource(id)?,
        (None, Some(invocation)) => engine.resolve(invocation)?,
        (None, None) => {
            return Err(AppError::Validation(
                "either datasource or invocation is required".to_string(),
            ))
        }
    };

    let request = SqlRequest {
        order_by: payload.order_by.into_iter().map(Into::into).collect(),
        page: payload.page.map(PageRequest::try_from).transpose()?,
    };

    let prepared = engine.prepare_on(datasource, sql, request)?;
    tracing::debug!("Transformed SQL for {} ({})", prepared.key, prepared.dialect);

    Ok(Json(TransformResponse {
        datasource: prepared.key.id().to_string(),
        dialect: prepared.dialect.to_string(),
        original_sql: sql.to_string(),
        sql: prepared.sql,
        changed: prepared.changed,
    }))
}
