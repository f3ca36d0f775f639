use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::validation;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReimbursementRequest {
    pub transaction_id: Uuid,
    pub service_fee: i64,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct PayReimbursementRequest {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct PartnerFilter {
    pub partner_id: Uuid,
}

/// Claims a settled disbursement transaction as a reimbursement obligation.
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateReimbursementRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reimbursement = state
        .reimbursements
        .create_for_transaction(payload.transaction_id, payload.service_fee, payload.due_date)
        .await?;

    Ok((StatusCode::CREATED, Json(reimbursement)))
}

/// Opens a gateway payment for a pending reimbursement. The status stays
/// pending until the payment's own callback settles it.
pub async fn pay(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PayReimbursementRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_positive_amount(payload.amount)?;
    validation::validate_currency(&payload.currency)?;

    let reimbursement = state
        .reimbursements
        .initiate_payment(id, payload.amount, &payload.currency)
        .await?;

    Ok(Json(reimbursement))
}

/// Lists a partner's reimbursements with derived status and recomputed
/// totals.
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<PartnerFilter>,
) -> Result<impl IntoResponse, AppError> {
    let views = state
        .reimbursements
        .list_for_partner(filter.partner_id, Utc::now())
        .await?;

    Ok(Json(views))
}
