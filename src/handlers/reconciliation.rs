use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::reconciliation::BatchLimits;
use crate::validation;
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct BatchResyncRequest {
    pub advance_request_id: Option<Uuid>,
    pub max_items: Option<usize>,
}

/// Operator-triggered resync of a single transaction.
pub async fn resync_one(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_external_id(&external_id)?;

    let outcome = state.reconciliation.resync_one(&external_id).await?;
    Ok(Json(outcome))
}

/// Batch resync: the transaction of one advance request, or all pending
/// transactions. Per-item failures land in the report, never in the status
/// code.
pub async fn resync_batch(
    State(state): State<AppState>,
    payload: Option<Json<BatchResyncRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();

    let mut limits = BatchLimits::default();
    if let Some(max_items) = request.max_items {
        if max_items == 0 {
            return Err(AppError::Validation(
                "max_items must be greater than zero".to_string(),
            ));
        }
        limits.max_items = max_items;
    }

    let report = state
        .reconciliation
        .resync_many(request.advance_request_id, limits)
        .await?;

    Ok(Json(report))
}

/// Imports the gateway's full transaction list into the ledger.
pub async fn import(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state.reconciliation.import_from_gateway().await?;
    Ok(Json(report))
}
