use axum::{extract::State, response::IntoResponse, Json};

use crate::error::AppError;
use crate::AppState;

pub async fn overview(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.stats.overview().await?))
}

pub async fn monthly(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.stats.monthly().await?))
}

pub async fn by_partner(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.stats.by_partner().await?))
}
