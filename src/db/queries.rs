use sqlx::{PgPool, Result};
use uuid::Uuid;

use crate::db::models::{
    AdvanceRequest, Employee, NewReimbursement, NewTransaction, Reimbursement, Transaction,
    UpsertOutcome,
};
use crate::domain::{AdvanceStatus, TransactionStatus};
use chrono::{DateTime, Utc};

// --- Transaction Queries ---

/// Inserts a transaction by external id, or applies a status-guarded update
/// when the row already exists.
///
/// The guard is a single conditional UPDATE: status fields are only written
/// when the new status differs from the stored one and the stored one is not
/// `succeeded`. Two concurrent calls for the same external id therefore
/// produce at most one `changed = true`, whichever write wins the race.
pub async fn upsert_transaction_by_external_id(
    pool: &PgPool,
    new: &NewTransaction,
) -> Result<UpsertOutcome> {
    let inserted = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, external_id, amount, method, status, settled_at,
            callback_message, advance_request_id, partner_id, employee_id,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5,
                  CASE WHEN $5 = 'succeeded'::transaction_status THEN COALESCE($6, NOW()) END,
                  $7, $8, $9, $10, NOW(), NOW())
        ON CONFLICT (external_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new.external_id)
    .bind(new.amount)
    .bind(new.method)
    .bind(new.status)
    .bind(new.settled_at)
    .bind(&new.callback_message)
    .bind(new.advance_request_id)
    .bind(new.partner_id)
    .bind(new.employee_id)
    .fetch_optional(pool)
    .await?;

    if let Some(transaction) = inserted {
        return Ok(UpsertOutcome {
            changed: true,
            inserted: true,
            transaction,
        });
    }

    let updated = sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = $2,
            settled_at = CASE WHEN $2 = 'succeeded'::transaction_status
                              THEN COALESCE($3, NOW()) END,
            callback_message = COALESCE($4, callback_message),
            updated_at = NOW()
        WHERE external_id = $1
          AND status <> 'succeeded'::transaction_status
          AND status <> $2
        RETURNING *
        "#,
    )
    .bind(&new.external_id)
    .bind(new.status)
    .bind(new.settled_at)
    .bind(&new.callback_message)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(transaction) => Ok(UpsertOutcome {
            changed: true,
            inserted: false,
            transaction,
        }),
        None => {
            // Guard refused the write: the stored status already matches or
            // is terminal. Report the row as-is.
            let transaction = sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transactions WHERE external_id = $1",
            )
            .bind(&new.external_id)
            .fetch_one(pool)
            .await?;

            Ok(UpsertOutcome {
                changed: false,
                inserted: false,
                transaction,
            })
        }
    }
}

pub async fn find_transaction_by_external_id(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_transaction_by_advance_request(
    pool: &PgPool,
    advance_request_id: Uuid,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE advance_request_id = $1",
    )
    .bind(advance_request_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_transactions_by_partner(
    pool: &PgPool,
    partner_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE partner_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(partner_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn list_pending_transactions(pool: &PgPool, limit: i64) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE status = 'pending'::transaction_status
        ORDER BY created_at ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

// --- Advance Request Queries ---

pub async fn get_advance_request(pool: &PgPool, id: Uuid) -> Result<Option<AdvanceRequest>> {
    sqlx::query_as::<_, AdvanceRequest>("SELECT * FROM advance_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// First-terminal-wins approval: only a still-pending request is touched.
/// Returns false when a concurrent writer already moved the request to a
/// terminal state.
pub async fn approve_advance_request(
    pool: &PgPool,
    id: Uuid,
    receipt_number: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE advance_requests
        SET status = 'approved'::advance_status,
            validated_at = NOW(),
            receipt_number = $2,
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'::advance_status
        "#,
    )
    .bind(id)
    .bind(receipt_number)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Rejection is operator-driven and never passes through reconciliation,
/// but it shares the pending guard so the two terminal transitions stay
/// mutually exclusive.
pub async fn reject_advance_request(pool: &PgPool, id: Uuid, reason: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE advance_requests
        SET status = 'rejected'::advance_status,
            rejection_reason = $2,
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'::advance_status
        "#,
    )
    .bind(id)
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

// --- Reimbursement Queries ---

pub async fn insert_reimbursement(
    pool: &PgPool,
    new: &NewReimbursement,
) -> Result<Reimbursement> {
    sqlx::query_as::<_, Reimbursement>(
        r#"
        INSERT INTO reimbursements (
            id, transaction_id, partner_id, employee_id, transaction_amount,
            service_fee, due_date, status, method, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending'::reimbursement_status, $8, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.transaction_id)
    .bind(new.partner_id)
    .bind(new.employee_id)
    .bind(new.transaction_amount)
    .bind(new.service_fee)
    .bind(new.due_date)
    .bind(new.method)
    .fetch_one(pool)
    .await
}

pub async fn get_reimbursement(pool: &PgPool, id: Uuid) -> Result<Option<Reimbursement>> {
    sqlx::query_as::<_, Reimbursement>("SELECT * FROM reimbursements WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_reimbursements_by_partner(
    pool: &PgPool,
    partner_id: Uuid,
) -> Result<Vec<Reimbursement>> {
    sqlx::query_as::<_, Reimbursement>(
        "SELECT * FROM reimbursements WHERE partner_id = $1 ORDER BY due_date ASC",
    )
    .bind(partner_id)
    .fetch_all(pool)
    .await
}

/// Records the gateway payment opened for a reimbursement. Guarded on
/// `pending` so a paid or cancelled obligation can never gain a new payment.
pub async fn set_reimbursement_payment(
    pool: &PgPool,
    id: Uuid,
    payment_external_id: &str,
    payment_reference: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE reimbursements
        SET payment_external_id = $2,
            payment_reference = $3,
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'::reimbursement_status
        "#,
    )
    .bind(id)
    .bind(payment_external_id)
    .bind(payment_reference)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Marks the reimbursement whose own payment id settled as paid.
/// Guarded on `pending`: repeated callbacks are no-ops.
pub async fn mark_reimbursement_paid_by_payment_id(
    pool: &PgPool,
    payment_external_id: &str,
) -> Result<Option<Reimbursement>> {
    sqlx::query_as::<_, Reimbursement>(
        r#"
        UPDATE reimbursements
        SET status = 'paid'::reimbursement_status,
            settlement_external_id = $1,
            updated_at = NOW()
        WHERE payment_external_id = $1
          AND status = 'pending'::reimbursement_status
        RETURNING *
        "#,
    )
    .bind(payment_external_id)
    .fetch_optional(pool)
    .await
}

/// Settled disbursement transactions of a partner that no reimbursement
/// references yet. Recomputed on every call; never cached, so a transaction
/// claimed in between disappears from the pool immediately.
///
/// Repayments are money in, not disbursements: a transaction that is a
/// reimbursement's own gateway payment is excluded by its payment id.
pub async fn list_eligible_transactions(
    pool: &PgPool,
    partner_id: Uuid,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT t.* FROM transactions t
        WHERE t.partner_id = $1
          AND t.status = 'succeeded'::transaction_status
          AND NOT EXISTS (
              SELECT 1 FROM reimbursements r WHERE r.transaction_id = t.id
          )
          AND NOT EXISTS (
              SELECT 1 FROM reimbursements r WHERE r.payment_external_id = t.external_id
          )
        ORDER BY t.settled_at DESC
        "#,
    )
    .bind(partner_id)
    .fetch_all(pool)
    .await
}

// --- Reference Entity Queries ---

pub async fn get_employee(pool: &PgPool, id: Uuid) -> Result<Option<Employee>> {
    sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

// --- Statistics Queries ---

pub async fn transaction_totals_by_status(
    pool: &PgPool,
) -> Result<Vec<(TransactionStatus, i64, i64)>> {
    sqlx::query_as::<_, (TransactionStatus, i64, i64)>(
        r#"
        SELECT status, COUNT(*), COALESCE(SUM(amount), 0)::BIGINT
        FROM transactions
        GROUP BY status
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Reimbursement counts by effective status: a pending row past its due
/// date is reported late without being rewritten.
pub async fn reimbursement_counts_by_effective_status(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<(String, i64)>> {
    sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT CASE
                 WHEN status = 'pending'::reimbursement_status AND due_date < $1
                   THEN 'late'
                 ELSE status::TEXT
               END AS effective_status,
               COUNT(*)
        FROM reimbursements
        GROUP BY 1
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await
}

pub async fn advance_request_counts(pool: &PgPool) -> Result<Vec<(AdvanceStatus, i64)>> {
    sqlx::query_as::<_, (AdvanceStatus, i64)>(
        "SELECT status, COUNT(*) FROM advance_requests GROUP BY status",
    )
    .fetch_all(pool)
    .await
}

pub async fn average_review_rating(pool: &PgPool) -> Result<Option<f64>> {
    sqlx::query_scalar::<_, Option<f64>>("SELECT AVG(rating)::FLOAT8 FROM reviews")
        .fetch_one(pool)
        .await
}

/// Settled disbursements bucketed by calendar month: (month, count, sum).
pub async fn monthly_disbursements(pool: &PgPool) -> Result<Vec<(String, i64, i64)>> {
    sqlx::query_as::<_, (String, i64, i64)>(
        r#"
        SELECT TO_CHAR(DATE_TRUNC('month', settled_at), 'YYYY-MM'),
               COUNT(*),
               COALESCE(SUM(amount), 0)::BIGINT
        FROM transactions
        WHERE status = 'succeeded'::transaction_status
        GROUP BY 1
        ORDER BY 1
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Paid reimbursements bucketed by calendar month: (month, recovered sum
/// including fees).
pub async fn monthly_reimbursed(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT TO_CHAR(DATE_TRUNC('month', updated_at), 'YYYY-MM'),
               COALESCE(SUM(transaction_amount + service_fee), 0)::BIGINT
        FROM reimbursements
        WHERE status = 'paid'::reimbursement_status
        GROUP BY 1
        ORDER BY 1
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Per-partner ledger figures: (partner id, name, transaction count,
/// disbursed sum). The sum counts only real disbursements: the partner's
/// own repayment transactions are excluded by their payment id.
pub async fn partner_transaction_totals(
    pool: &PgPool,
) -> Result<Vec<(Uuid, String, i64, i64)>> {
    sqlx::query_as::<_, (Uuid, String, i64, i64)>(
        r#"
        SELECT p.id, p.name, COUNT(t.id),
               COALESCE(SUM(t.amount) FILTER (
                   WHERE t.status = 'succeeded'::transaction_status
                     AND rp.id IS NULL
               ), 0)::BIGINT
        FROM partners p
        LEFT JOIN transactions t ON t.partner_id = p.id
        LEFT JOIN reimbursements rp ON rp.payment_external_id = t.external_id
        GROUP BY p.id, p.name
        ORDER BY p.name
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Per-partner reimbursement figures: (partner id, total count, paid count).
pub async fn partner_reimbursement_totals(pool: &PgPool) -> Result<Vec<(Uuid, i64, i64)>> {
    sqlx::query_as::<_, (Uuid, i64, i64)>(
        r#"
        SELECT partner_id, COUNT(*),
               COUNT(*) FILTER (WHERE status = 'paid'::reimbursement_status)
        FROM reimbursements
        GROUP BY partner_id
        "#,
    )
    .fetch_all(pool)
    .await
}
