use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::DataSourceSummary;
use crate::services::DynamicDataSource;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DynamicDataSource>,
}

/// List registered datasources with the groups and routers they are served by
pub async fn list_datasources(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let engine = &state.engine;
    let table = engine.selector().table();

    Ok(Json(serde_json::json!({
        "datasources": engine.datasources(),
        "groups": engine.registry().groups(),
        "routers": table.router_names(),
        "default_router": table.default_router(),
        "default_group": table.default_group(),
        "transformers": engine.pipeline().names(),
    })))
}

/// Get one datasource by key id
pub async fn get_datasource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataSourceSummary>, AppError> {
    let datasource = state.engine.datasource(&id)?;
    Ok(Json(datasource.summary()))
}
