use crate::api::rest::{ApiResult, AppState};
use crate::db::models::MapPoint;
use crate::db::repositories::PotholesRepository;
use crate::db::DatabaseService;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use std::sync::Arc;

/// All stored potholes as map markers
pub async fn list_potholes(State(state): State<AppState>) -> ApiResult<Json<Vec<MapPoint>>> {
    let repo = PotholesRepository::new(Arc::clone(&state.db_pool));
    let points = repo.list_for_map().await?;
    Ok(Json(points))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub potholes: Option<i64>,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = DatabaseService::health_check(&state.db_pool).await;
    let potholes = if database {
        PotholesRepository::new(Arc::clone(&state.db_pool))
            .count()
            .await
            .ok()
    } else {
        None
    };

    if database {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database,
                potholes,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded",
                database,
                potholes,
            }),
        )
    }
}
