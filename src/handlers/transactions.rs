use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::error::AppError;
use crate::validation;
use crate::AppState;

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_external_id(&external_id)?;

    let transaction = queries::find_transaction_by_external_id(&state.db, &external_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {} not found", external_id)))?;

    Ok(Json(transaction))
}

pub async fn list_partner_transactions(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let limit = pagination.limit.unwrap_or(20);
    let offset = pagination.offset.unwrap_or(0);

    let transactions =
        queries::list_transactions_by_partner(&state.db, partner_id, limit, offset).await?;

    Ok(Json(transactions))
}

/// The reimbursement pool: settled disbursements of the partner that no
/// reimbursement claims yet.
pub async fn list_eligible_transactions(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transactions = state.reimbursements.list_eligible(partner_id).await?;
    Ok(Json(transactions))
}
