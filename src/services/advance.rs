//! Salary advance request state machine.
//!
//! A request leaves `pending` exactly once: either to `approved` when its
//! linked disbursement transaction settles, or to `rejected` by an operator.
//! Approval is applied here only after the transaction store reported a
//! fresh transition to `succeeded` (its `changed` flag), and the UPDATE is
//! itself guarded on `status = 'pending'`, so the first terminal transition
//! wins and every later attempt is a logged no-op.

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::error::AppError;

/// Outcome of a cascade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeResult {
    /// This call performed the transition.
    Applied,
    /// A concurrent writer (or an earlier delivery of the same event)
    /// already moved the request to a terminal state. Not an error.
    AlreadySettled,
}

/// Approves a pending advance request after its transaction settled,
/// stamping the validation time and copying the transaction's external id
/// as the receipt reference.
pub async fn approve_on_settlement(
    pool: &PgPool,
    advance_request_id: Uuid,
    receipt_number: &str,
) -> Result<CascadeResult, AppError> {
    let applied = queries::approve_advance_request(pool, advance_request_id, receipt_number)
        .await
        .map_err(AppError::Database)?;

    if applied {
        tracing::info!(
            advance_request_id = %advance_request_id,
            receipt = %receipt_number,
            "advance request approved on settlement"
        );
        Ok(CascadeResult::Applied)
    } else {
        tracing::info!(
            advance_request_id = %advance_request_id,
            "advance request already terminal, settlement cascade skipped"
        );
        Ok(CascadeResult::AlreadySettled)
    }
}

/// Operator-driven rejection. Kept next to approval because the two share
/// the pending guard and must stay mutually exclusive.
pub async fn reject(
    pool: &PgPool,
    advance_request_id: Uuid,
    reason: &str,
) -> Result<CascadeResult, AppError> {
    let applied = queries::reject_advance_request(pool, advance_request_id, reason)
        .await
        .map_err(AppError::Database)?;

    if applied {
        Ok(CascadeResult::Applied)
    } else {
        Ok(CascadeResult::AlreadySettled)
    }
}
