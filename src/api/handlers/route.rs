use axum::{extract::State, Json};

use crate::api::handlers::AppState;
use crate::api::middleware::AppError;
use crate::models::{RouteRequest, RouteResponse};

/// Resolve the datasource an invocation would run on
pub async fn route_invocation(
    State(state): State<AppState>,
    Json(payload): Json<RouteRequest>,
) -> Result<Json<RouteResponse>, AppError> {
    if payload.operation.trim().is_empty() {
        return Err(AppError::Validation("operation cannot be empty".to_string()));
    }

    let invocation = payload.into_invocation();
    let datasource = state.engine.resolve(&invocation)?;
    let key = datasource.key();
    tracing::info!("Routed {} to {}", invocation.operation, key);

    Ok(Json(RouteResponse {
        key: key.id().to_string(),
        group: key.group().to_string(),
        role: key.role(),
        write: state.engine.selector().is_write(&invocation),
    }))
}
